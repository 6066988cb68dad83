//! The visit event published on every redirect and consumed by the stats
//! pipeline.
//!
//! Grounded on `original_source/internal/link/domain/event/user_visit_info.go`
//! and the event shape implied by
//! `internal/link_stats/app/listener/user_visit.go`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observed redirect, carrying everything the stats sink needs to
/// attribute a click without re-querying the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEvent {
    pub message_id: Uuid,
    pub short_uri: String,
    pub gid: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub os: String,
    pub browser: String,
    pub device: String,
    pub network: String,
    /// Token identifying a visitor across requests (cookie or derived from
    /// remote_addr + user_agent); drives the UV idempotency check.
    pub uv_token: String,
    pub current_date: DateTime<Utc>,
}

impl VisitEvent {
    pub fn new(
        short_uri: impl Into<String>,
        gid: impl Into<String>,
        remote_addr: impl Into<String>,
        user_agent: impl Into<String>,
        os: impl Into<String>,
        browser: impl Into<String>,
        device: impl Into<String>,
        network: impl Into<String>,
        uv_token: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            short_uri: short_uri.into(),
            gid: gid.into(),
            remote_addr: remote_addr.into(),
            user_agent: user_agent.into(),
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
            network: network.into(),
            uv_token: uv_token.into(),
            current_date: Utc::now(),
        }
    }

    /// `yyyy-MM-dd` bucket this visit belongs to, for the `today*` counters.
    pub fn day_bucket(&self) -> String {
        self.current_date.format("%Y-%m-%d").to_string()
    }
}
