//! Value objects and aggregates: `Link`, `ValidDate`, `CacheValue`,
//! `VisitEvent`, `Stats`.

mod link;
mod stats;
mod visit;

pub use link::{CacheValue, CreateType, Link, LinkGoto, Status, ValidDate, ValidType};
pub use stats::Stats;
pub use visit::VisitEvent;
