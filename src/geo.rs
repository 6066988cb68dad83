//! Location-by-IP lookup boundary.
//!
//! Grounded on the Go original's `toolkit.GetLocationByIP` call inside
//! `link_stats_repository.go::SaveLinkStats`: an external collaborator the
//! stats sink consults to fill `link_locale_stat`. No implementation is
//! provided here — the original wraps a third-party IP geolocation API,
//! which is out of scope for this crate — only the trait boundary a real
//! provider (or a test fake) plugs into.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo lookup transport error: {0}")]
    Transport(String),
    #[error("no location found for address")]
    NotFound,
}

/// A resolved administrative location, matching `link_locale_stat`'s
/// province/city/country columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub province: String,
    pub city: String,
    pub country: String,
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, remote_addr: &str) -> Result<Location, GeoError>;
}

/// Stands in for a missing/unreachable locator: every address resolves to
/// the "unknown" bucket the stats sink falls back to today.
pub struct UnknownGeoLocator;

#[async_trait]
impl GeoLocator for UnknownGeoLocator {
    async fn locate(&self, _remote_addr: &str) -> Result<Location, GeoError> {
        Ok(Location {
            province: "unknown".to_string(),
            city: "unknown".to_string(),
            country: "unknown".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_locator_always_resolves() {
        let locator = UnknownGeoLocator;
        let loc = locator.locate("1.2.3.4").await.unwrap();
        assert_eq!(loc.country, "unknown");
    }
}
