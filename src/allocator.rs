//! Collision-free short-identifier allocation.
//!
//! Grounded on `original_source/internal/link/domain/link/factory.go`'s
//! `genUniqueShortUri`: salt the original URL with a fresh UUID each
//! attempt, hash, Base62-encode, and retry against a fast existence check
//! up to a bounded number of attempts. The DB unique constraint at
//! `LinkStore::create` is the authoritative arbiter; this step only needs
//! to make collisions rare, not impossible.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("exhausted {0} attempts generating a unique short uri")]
    TooManyAttempts(u32),
}

/// Fast, possibly-false-negative existence check backed by the filter (see
/// spec §4.4: a filter miss is definitive, a filter hit just means "go
/// check the database on insert").
#[async_trait]
pub trait ExistenceCheck: Send + Sync {
    async fn exists(&self, short_uri: &str) -> bool;
}

/// Generates a Base62 short identifier from `blake3(original_url ||
/// random_uuid)`, matching the teacher's hash-then-encode idiom in
/// `enterprise/cache` for derived cache keys, adapted to `blake3` + the
/// `base62` crate rather than the teacher's non-cryptographic hashers,
/// since collision resistance across concurrent creators matters here.
pub struct Allocator {
    max_attempts: u32,
}

impl Allocator {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub async fn allocate(
        &self,
        original_url: &str,
        exists: &dyn ExistenceCheck,
    ) -> Result<String, AllocatorError> {
        for _ in 0..self.max_attempts {
            let candidate = Self::candidate(original_url);
            if !exists.exists(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(AllocatorError::TooManyAttempts(self.max_attempts))
    }

    fn candidate(original_url: &str) -> String {
        let salted = format!("{original_url}{}", Uuid::new_v4());
        let digest = blake3::hash(salted.as_bytes());
        // Base62 over the first 8 bytes of the digest is plenty of entropy
        // for a 6-11 character short uri and keeps URLs short.
        let truncated = u64::from_be_bytes(digest.as_bytes()[..8].try_into().unwrap());
        base62::encode(truncated)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{AlwaysTakenCheck, FakeExistenceCheck};
    use super::*;

    #[tokio::test]
    async fn allocates_a_short_uri_when_nothing_is_taken() {
        let allocator = Allocator::new(10);
        let check = FakeExistenceCheck::new();
        let result = allocator
            .allocate("https://example.com/a", &check)
            .await
            .unwrap();
        assert!(!result.is_empty());
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_too_many_attempts() {
        let allocator = Allocator::new(3);
        let check = AlwaysTakenCheck;
        let err = allocator
            .allocate("https://example.com/a", &check)
            .await
            .unwrap_err();
        assert_eq!(err, AllocatorError::TooManyAttempts(3));
    }

    #[tokio::test]
    async fn two_allocations_of_the_same_url_differ() {
        let allocator = Allocator::new(10);
        let check = FakeExistenceCheck::new();
        let first = allocator
            .allocate("https://example.com/a", &check)
            .await
            .unwrap();
        let second = allocator
            .allocate("https://example.com/a", &check)
            .await
            .unwrap();
        assert_ne!(first, second);
    }
}
