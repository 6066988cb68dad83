//! # Shortlink
//!
//! A URL shortening service built around a read-heavy resolution path that
//! has to survive cache penetration, cache breakdown and cache avalanche,
//! plus a collision-free short-identifier allocation protocol and an
//! at-least-once visit-statistics pipeline.
//!
//! ## Architecture
//!
//! - `domain`: the `Link`, `ValidDate`, `CacheValue`, `VisitEvent` and
//!   `Stats` value objects and their invariants.
//! - `filter`: probabilistic membership set for "shortUri was allocated".
//! - `lock`: named, fenced, expiring distributed mutex.
//! - `safecache`: the anti-penetration/breakdown wrapper over KV + filter +
//!   lock.
//! - `allocator`: collision-free short-identifier generation.
//! - `linkstore`: durable link persistence, single-table and sharded.
//! - `resolver`: the hot read path.
//! - `creator`: the write path.
//! - `stats_sink`: the visit-event consumer.
//! - `eventbus`: publish/subscribe abstraction over the message broker.
//! - `api`: the HTTP surface.

#![warn(clippy::all)]

pub mod allocator;
pub mod api;
pub mod config;
pub mod creator;
pub mod domain;
pub mod error;
pub mod eventbus;
pub mod filter;
pub mod geo;
pub mod linkstore;
pub mod lock;
pub mod metrics;
pub mod resolver;
pub mod safecache;
pub mod stats_sink;

/// Crate version, re-exported for diagnostics endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
