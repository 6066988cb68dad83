//! The `Link` aggregate root and its value objects.
//!
//! Grounded on `original_source/internal/link/domain/link/{link,enums,valid_date,factory}.go`:
//! `Link` is immutable from the outside (mutation goes through `Update`),
//! `ValidDate` owns the permanent/temporary distinction, `CacheValue` is the
//! denormalised projection SafeCache stores under `goto:<shortUri>`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ServiceStateError;

/// Link lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Expired,
    Disabled,
    Forbidden,
    Reserved,
    Deleted,
}

/// Who created the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreateType {
    Api,
    Console,
}

/// Whether a link's validity window is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ValidType {
    Permanent,
    Temporary,
}

/// The link's validity window.
///
/// Invariant: `Temporary` implies `end_date > start_date`; `Permanent`
/// ignores `end_date` (expiration is unbounded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidDate {
    pub valid_type: ValidType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ValidDate {
    pub fn new(
        valid_type: ValidType,
        start_date: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self, ServiceStateError> {
        if valid_type == ValidType::Temporary {
            let end = end_date.ok_or(ServiceStateError::InvalidStatus)?;
            if end <= start_date {
                return Err(ServiceStateError::InvalidStatus);
            }
        }
        Ok(Self {
            valid_type,
            start_date,
            end_date,
        })
    }

    pub fn never_expire(&self) -> bool {
        self.valid_type == ValidType::Permanent
    }

    pub fn is_active_now(&self) -> bool {
        if self.never_expire() {
            return true;
        }
        let now = Utc::now();
        now >= self.start_date && self.end_date.is_some_and(|end| now < end)
    }

    /// Residual TTL for the cache entry: unbounded (`None`) for permanent
    /// links, else `end_date - now`.
    pub fn residual_ttl(&self) -> Option<Duration> {
        if self.never_expire() {
            return None;
        }
        let end = self.end_date?;
        let remaining = end.signed_duration_since(Utc::now());
        Some(remaining.to_std().unwrap_or(Duration::from_secs(0)))
    }
}

/// The Link aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub gid: String,
    pub short_uri: String,
    pub original_url: String,
    pub status: Status,
    pub create_type: CreateType,
    pub valid_date: ValidDate,
    pub favicon: Option<String>,
    pub desc: Option<String>,
    pub tenant_id: Option<String>,
    pub recycle_time: Option<DateTime<Utc>>,
}

impl Link {
    /// Full redirect URL, derived from config — not persisted.
    pub fn full_short_url(&self, domain: &str, use_ssl: bool) -> String {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{scheme}://{domain}/{}", self.short_uri)
    }

    /// `status == Active` iff the link never expires, or `now` falls in
    /// `[start_date, end_date)`.
    pub fn is_active(&self) -> bool {
        self.status == Status::Active && self.valid_date.is_active_now()
    }

    pub fn apply_update(
        &mut self,
        gid: Option<String>,
        original_url: Option<String>,
        status: Option<Status>,
        valid_type: Option<ValidType>,
        valid_end_date: Option<DateTime<Utc>>,
        desc: Option<String>,
    ) -> Result<(), ServiceStateError> {
        if let Some(gid) = gid {
            self.gid = gid;
        }
        if let Some(url) = original_url {
            self.original_url = url;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(valid_type) = valid_type {
            self.valid_date.valid_type = valid_type;
        }
        if let Some(end) = valid_end_date {
            if end <= Utc::now() {
                return Err(ServiceStateError::InvalidStatus);
            }
            self.valid_date.end_date = Some(end);
        }
        if let Some(desc) = desc {
            self.desc = Some(desc);
        }
        Ok(())
    }

    pub fn save_to_recycle_bin(&mut self) {
        self.recycle_time = Some(Utc::now());
    }

    pub fn recover_from_recycle_bin(&mut self) {
        self.recycle_time = None;
    }

    /// Derive `endDate = startDate + defaultExpiration` for a `Temporary`
    /// link with no explicit end date, per Creator step 4.
    pub fn default_end_date(start: DateTime<Utc>, default_expiration_days: i64) -> DateTime<Utc> {
        start + ChronoDuration::days(default_expiration_days)
    }
}

/// Denormalised projection of a `Link`, stored under `goto:<shortUri>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheValue {
    pub original_url: String,
    pub never_expire: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Status,
}

impl CacheValue {
    pub fn from_link(link: &Link) -> Self {
        Self {
            original_url: link.original_url.clone(),
            never_expire: link.valid_date.never_expire(),
            start_time: link.valid_date.start_date,
            end_time: link.valid_date.end_date,
            status: link.status,
        }
    }

    /// Empty-value predicate (spec §4.3): a `CacheValue` counts as empty if
    /// its defining field, `original_url`, is empty.
    pub fn is_empty(&self) -> bool {
        self.original_url.is_empty()
    }

    /// Map `status` to the resolver's result per spec §4.6 step 3.
    pub fn resolve(&self) -> Result<&str, ServiceStateError> {
        match self.status {
            Status::Active => {
                if self.never_expire {
                    Ok(&self.original_url)
                } else {
                    let now = Utc::now();
                    match self.end_time {
                        Some(end) if now < end => Ok(&self.original_url),
                        _ => Err(ServiceStateError::LinkExpired),
                    }
                }
            }
            Status::Expired => Err(ServiceStateError::LinkExpired),
            Status::Forbidden => Err(ServiceStateError::LinkForbidden),
            Status::Reserved => Err(ServiceStateError::LinkReserved),
            Status::Disabled => Err(ServiceStateError::LinkDisabled),
            Status::Deleted => Err(ServiceStateError::LinkDisabled),
        }
    }

    /// Residual TTL to `SET ... EX` the cache entry with.
    pub fn expiration(&self) -> Option<Duration> {
        if self.never_expire {
            return None;
        }
        let end = self.end_time?;
        let remaining = end.signed_duration_since(Utc::now());
        Some(remaining.to_std().unwrap_or(Duration::from_secs(0)))
    }
}

/// `shortUri -> gid` shard locator, used only by the sharded `LinkStore`
/// variant so a resolver holding just `shortUri` can find the shard that
/// owns the authoritative `Link` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkGoto {
    pub short_uri: String,
    pub gid: String,
}
