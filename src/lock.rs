//! Named, fenced, expiring distributed mutex.
//!
//! Grounded on the teacher's `src/scheduling/scheduler.rs::DistributedLock`
//! (`SET NX EX` acquire, Lua compare-and-delete release, compare-and-extend
//! refresh), generalized from a single-shot job lock to a named mutex any
//! caller can acquire by key. The fencing-token concept is named after the
//! teacher's `enterprise/cache/lock.rs::FencingToken`, though here the token
//! is the acquire-time UUID the release/refresh scripts compare against,
//! matching `original_source/internal/base/lock`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("redis transport error: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("lock not acquired for key {0}")]
    NotAcquired(String),
}

/// Proof of ownership returned by a successful `acquire`. Only the holder of
/// the matching token may release or refresh the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencingToken(String);

impl FencingToken {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait Locker: Send + Sync {
    /// Non-blocking: attempts to claim `key` and returns immediately with a
    /// token on success.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<FencingToken>, LockError>;

    /// Only succeeds if `token` matches the stored fencing token.
    async fn release(&self, key: &str, token: &FencingToken) -> Result<(), LockError>;

    /// Compare-and-extend: resets the TTL only if `token` still owns the lock.
    async fn refresh(
        &self,
        key: &str,
        token: &FencingToken,
        ttl: Duration,
    ) -> Result<bool, LockError>;
}

const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

const REFRESH_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("expire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// Redis-backed `Locker`.
#[derive(Clone)]
pub struct RedisLocker {
    conn: ConnectionManager,
    app_name: String,
}

impl RedisLocker {
    pub fn new(conn: ConnectionManager, app_name: impl Into<String>) -> Self {
        Self {
            conn,
            app_name: app_name.into(),
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("lock:{}:{}", self.app_name, key)
    }
}

#[async_trait]
impl Locker for RedisLocker {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<FencingToken>, LockError> {
        let token = FencingToken::new();
        let lock_key = self.lock_key(key);
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(result.map(|_| token))
    }

    async fn release(&self, key: &str, token: &FencingToken) -> Result<(), LockError> {
        let lock_key = self.lock_key(key);
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(lock_key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn refresh(
        &self,
        key: &str,
        token: &FencingToken,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let lock_key = self.lock_key(key);
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(REFRESH_SCRIPT)
            .key(lock_key)
            .arg(token.as_str())
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeLocker;
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let locker = FakeLocker::new();
        let first = locker.acquire("k", Duration::from_secs(3)).await.unwrap();
        assert!(first.is_some());
        let second = locker.acquire("k", Duration::from_secs(3)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn release_with_wrong_token_is_a_noop() {
        let locker = FakeLocker::new();
        let token = locker
            .acquire("k", Duration::from_secs(3))
            .await
            .unwrap()
            .unwrap();
        let other = FencingToken::new();
        locker.release("k", &other).await.unwrap();
        // still held: the next acquire should fail
        let second = locker.acquire("k", Duration::from_secs(3)).await.unwrap();
        assert!(second.is_none());
        locker.release("k", &token).await.unwrap();
        let third = locker.acquire("k", Duration::from_secs(3)).await.unwrap();
        assert!(third.is_some());
    }
}
