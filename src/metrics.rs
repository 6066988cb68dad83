//! Prometheus metrics for the resolve/create/stats paths.
//!
//! Grounded on the real `prometheus` crate's `Registry`-plus-metric-struct
//! pattern (`other_examples/.../execution_cache.rs`'s
//! `ExecutionCacheMetrics::new(&Registry)`), rather than the teacher's own
//! hand-rolled `enterprise::tracing::metrics` registry — the pack already
//! depends on the real crate, so that's what this module wires up.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_counter_vec_with_registry, Histogram, IntCounter, IntCounterVec, Registry,
};

/// Metrics for the resolve (redirect), create, and stats-sink paths.
pub struct Metrics {
    pub resolve_hits: IntCounter,
    pub resolve_misses: IntCounter,
    pub resolve_loader_invocations: IntCounter,
    pub resolve_errors: IntCounterVec,
    pub lock_acquire_failures: IntCounterVec,
    pub resolve_duration: Histogram,
    pub links_created: IntCounter,
    pub create_allocation_attempts: Histogram,
    pub visits_recorded: IntCounter,
    pub visits_failed: IntCounter,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            resolve_hits: register_int_counter_with_registry!(
                "shortlink_resolve_cache_hits_total",
                "Redirects served directly from cache",
                registry
            )?,
            resolve_misses: register_int_counter_with_registry!(
                "shortlink_resolve_cache_misses_total",
                "Redirects that fell through to the loader",
                registry
            )?,
            resolve_loader_invocations: register_int_counter_with_registry!(
                "shortlink_resolve_loader_invocations_total",
                "Times the link-store loader actually ran",
                registry
            )?,
            resolve_errors: register_int_counter_vec_with_registry!(
                "shortlink_resolve_errors_total",
                "Resolve failures by error kind",
                &["kind"],
                registry
            )?,
            lock_acquire_failures: register_int_counter_vec_with_registry!(
                "shortlink_lock_acquire_failures_total",
                "Failed distributed-lock acquisitions by caller",
                &["caller"],
                registry
            )?,
            resolve_duration: register_histogram_with_registry!(
                "shortlink_resolve_duration_seconds",
                "End-to-end resolve latency",
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
                registry
            )?,
            links_created: register_int_counter_with_registry!(
                "shortlink_links_created_total",
                "Links successfully persisted",
                registry
            )?,
            create_allocation_attempts: register_histogram_with_registry!(
                "shortlink_create_allocation_attempts",
                "Short-identifier allocation attempts per create call",
                vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0],
                registry
            )?,
            visits_recorded: register_int_counter_with_registry!(
                "shortlink_visits_recorded_total",
                "Visit events materialised into counters",
                registry
            )?,
            visits_failed: register_int_counter_with_registry!(
                "shortlink_visits_failed_total",
                "Visit events that failed to materialise and were left unacked",
                registry
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_name_collisions() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        metrics.resolve_hits.inc();
        assert_eq!(metrics.resolve_hits.get(), 1);
        assert!(!registry.gather().is_empty());
    }
}
