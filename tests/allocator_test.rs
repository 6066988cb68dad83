// Integration test for short-identifier allocation against a pluggable
// existence check, exercised through the crate's public `allocator` API.

#[cfg(test)]
mod allocator_tests {
    use async_trait::async_trait;
    use shortlink::allocator::{Allocator, AllocatorError, ExistenceCheck};
    use std::sync::Mutex;

    struct TakenThenFree {
        remaining_collisions: Mutex<u32>,
    }

    #[async_trait]
    impl ExistenceCheck for TakenThenFree {
        async fn exists(&self, _short_uri: &str) -> bool {
            let mut remaining = self.remaining_collisions.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        }
    }

    struct AlwaysTaken;

    #[async_trait]
    impl ExistenceCheck for AlwaysTaken {
        async fn exists(&self, _short_uri: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn retries_past_transient_collisions() {
        let allocator = Allocator::new(5);
        let existence = TakenThenFree {
            remaining_collisions: Mutex::new(2),
        };
        let short_uri = allocator
            .allocate("https://example.com/a", &existence)
            .await
            .unwrap();
        assert!(!short_uri.is_empty());
    }

    #[tokio::test]
    async fn exhausts_attempts_when_every_candidate_collides() {
        let allocator = Allocator::new(3);
        let err = allocator
            .allocate("https://example.com/b", &AlwaysTaken)
            .await
            .unwrap_err();
        assert_eq!(err, AllocatorError::TooManyAttempts(3));
    }
}
