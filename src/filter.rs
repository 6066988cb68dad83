//! Probabilistic membership filter over allocated `shortUri`s.
//!
//! Grounded on `original_source/internal/base/cache/bloom_filter.go`
//! (idempotent `BF.RESERVE`, error rate `1e-4`, capacity `10^6`) and
//! `redis_cache.go::CheckBloomFilter`/`ExistsInBloomFilter`. Backed by
//! RedisBloom the way the teacher backs its multi-tier cache with `redis`'s
//! `ConnectionManager` in `src/database/cache.rs`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use thiserror::Error;

pub const DEFAULT_FILTER_NAME: &str = "shortUriCreateBloomFilter";
const ERROR_RATE: f64 = 0.0001;
const CAPACITY: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("redis transport error: {0}")]
    Transport(#[from] redis::RedisError),
}

/// Three-valued outcome of a filter membership check, mirroring the Lua
/// script in spec §4.3 step 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipCheck {
    /// The filter itself does not exist; the caller should skip it and fall
    /// through to the loader unconditionally.
    FilterAbsent,
    /// A matching negative marker is set, or the key is not in the filter:
    /// definitively absent.
    DefinitelyAbsent,
    /// The key may be present; proceed to load.
    PossiblyPresent,
}

#[async_trait]
pub trait Filter: Send + Sync {
    /// Idempotently ensure the filter exists with the service's fixed error
    /// rate and capacity.
    async fn ensure_reserved(&self, name: &str) -> Result<(), FilterError>;

    /// Add `item` to the filter. Only ever called co-atomically with a
    /// cache write via [`crate::safecache::SafeCache::safe_put`]; never
    /// called standalone in the hot path.
    async fn add(&self, name: &str, item: &str) -> Result<bool, FilterError>;

    /// The three-valued check from spec §4.3 step 2, given an optional
    /// negative-marker key that, if set, overrides the filter to "absent".
    async fn check(
        &self,
        name: &str,
        item: &str,
        negative_key: Option<&str>,
    ) -> Result<MembershipCheck, FilterError>;
}

/// RedisBloom-backed filter.
#[derive(Clone)]
pub struct RedisFilter {
    conn: ConnectionManager,
}

impl RedisFilter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

const CHECK_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return -1
    end
    if ARGV[1] ~= "" and redis.call("GET", ARGV[1]) then
        return 0
    end
    if redis.call("BF.EXISTS", KEYS[1], ARGV[2]) == 1 then
        return 1
    end
    return 0
"#;

#[async_trait]
impl Filter for RedisFilter {
    async fn ensure_reserved(&self, name: &str) -> Result<(), FilterError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(name).await?;
        if exists {
            return Ok(());
        }
        redis::cmd("BF.RESERVE")
            .arg(name)
            .arg(ERROR_RATE)
            .arg(CAPACITY)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn add(&self, name: &str, item: &str) -> Result<bool, FilterError> {
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("BF.ADD")
            .arg(name)
            .arg(item)
            .query_async(&mut conn)
            .await?;
        Ok(added == 1)
    }

    async fn check(
        &self,
        name: &str,
        item: &str,
        negative_key: Option<&str>,
    ) -> Result<MembershipCheck, FilterError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(CHECK_SCRIPT)
            .key(name)
            .arg(negative_key.unwrap_or(""))
            .arg(item)
            .invoke_async(&mut conn)
            .await?;
        Ok(match result {
            -1 => MembershipCheck::FilterAbsent,
            1 => MembershipCheck::PossiblyPresent,
            _ => MembershipCheck::DefinitelyAbsent,
        })
    }
}

/// In-memory fakes shared across this crate's test modules, mirroring the
/// teacher's in-memory `DistributedMutex` test doubles in
/// `enterprise/cache/lock.rs`.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use dashmap::DashSet;
    use std::sync::Mutex;

    pub struct FakeFilter {
        reserved: Mutex<bool>,
        items: DashSet<String>,
        negatives: DashSet<String>,
    }

    impl FakeFilter {
        pub fn new() -> Self {
            Self {
                reserved: Mutex::new(false),
                items: DashSet::new(),
                negatives: DashSet::new(),
            }
        }

        pub fn mark_negative(&self, key: &str) {
            self.negatives.insert(key.to_string());
        }
    }

    #[async_trait]
    impl Filter for FakeFilter {
        async fn ensure_reserved(&self, _name: &str) -> Result<(), FilterError> {
            *self.reserved.lock().unwrap() = true;
            Ok(())
        }

        async fn add(&self, _name: &str, item: &str) -> Result<bool, FilterError> {
            Ok(self.items.insert(item.to_string()))
        }

        async fn check(
            &self,
            _name: &str,
            item: &str,
            negative_key: Option<&str>,
        ) -> Result<MembershipCheck, FilterError> {
            if !*self.reserved.lock().unwrap() {
                return Ok(MembershipCheck::FilterAbsent);
            }
            if let Some(neg) = negative_key {
                if self.negatives.contains(neg) {
                    return Ok(MembershipCheck::DefinitelyAbsent);
                }
            }
            if self.items.contains(item) {
                Ok(MembershipCheck::PossiblyPresent)
            } else {
                Ok(MembershipCheck::DefinitelyAbsent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeFilter;
    use super::*;

    #[tokio::test]
    async fn check_reports_filter_absent_before_reservation() {
        let filter = FakeFilter::new();
        let result = filter.check("f", "k", None).await.unwrap();
        assert_eq!(result, MembershipCheck::FilterAbsent);
    }

    #[tokio::test]
    async fn check_reports_possibly_present_after_add() {
        let filter = FakeFilter::new();
        filter.ensure_reserved("f").await.unwrap();
        filter.add("f", "abc123").await.unwrap();
        let result = filter.check("f", "abc123", None).await.unwrap();
        assert_eq!(result, MembershipCheck::PossiblyPresent);
    }

    #[tokio::test]
    async fn negative_marker_overrides_membership() {
        let filter = FakeFilter::new();
        filter.ensure_reserved("f").await.unwrap();
        filter.add("f", "abc123").await.unwrap();
        filter.mark_negative("neg:abc123");
        let result = filter
            .check("f", "abc123", Some("neg:abc123"))
            .await
            .unwrap();
        assert_eq!(result, MembershipCheck::DefinitelyAbsent);
    }
}
