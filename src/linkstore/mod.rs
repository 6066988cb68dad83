//! Durable `Link` persistence.
//!
//! Grounded on the teacher's `enterprise/database/repository.rs::Repository<T>`
//! trait shape, specialised to the operations spec §4.5 names, and on
//! `original_source/internal/link/adapter/{link_repository,link_sharding_repository}.go`
//! for the single-table vs sharded split.

mod postgres;
mod sharded;

pub use postgres::PostgresLinkStore;
pub use sharded::ShardedLinkStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Link;

#[derive(Debug, Error)]
pub enum LinkStoreError {
    #[error("short uri already exists")]
    AlreadyExists,
    #[error("link not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not acquire gid-update lock for {0}")]
    LockFailed(String),
    #[error("cache error: {0}")]
    Cache(#[from] crate::safecache::SafeCacheError),
    #[error("link is not in the recycle bin")]
    NotInRecycleBin,
}

/// Cache key a `CacheValue` is stored under, shared by the resolver's
/// loader-fill path and the link stores' write-path cache maintenance.
pub(crate) fn goto_key(short_uri: &str) -> String {
    format!("goto:{short_uri}")
}

/// Negative-marker key installed by `SafeDelete`, shared the same way.
pub(crate) fn negative_key(short_uri: &str) -> String {
    format!("gotoIsNull:{short_uri}")
}

/// The persistence operations named in spec §4.5.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LinkStoreError>;
    async fn count_by_gid(&self, gid: &str) -> Result<i64, LinkStoreError>;
    async fn create(&self, link: &Link) -> Result<Link, LinkStoreError>;
    async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LinkStoreError>;
    async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LinkStoreError>;
    /// Page through links, optionally scoped to one `gid`. `current` is
    /// 1-based; returns the page of records plus the total matching count.
    async fn find_page(
        &self,
        gid: Option<&str>,
        current: i64,
        size: i64,
    ) -> Result<(Vec<Link>, i64), LinkStoreError>;
    async fn update(&self, link: &Link) -> Result<(), LinkStoreError>;
    async fn save_to_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError>;
    async fn remove_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError>;
    async fn recover_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError>;
}

/// sqlx's Postgres unique-violation SQLSTATE, used to translate a raw
/// `sqlx::Error::Database` into [`LinkStoreError::AlreadyExists`].
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}

/// Picks between the single-table and sharded `LinkStore` at startup based
/// on `Config::enable_sharding`, so the HTTP layer can hold one concrete
/// `LinkStore` type instead of being generic over it.
pub enum AnyLinkStore {
    Single(PostgresLinkStore),
    Sharded(ShardedLinkStore<crate::lock::RedisLocker>),
}

#[async_trait]
impl LinkStore for AnyLinkStore {
    async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.short_uri_exists(short_uri).await,
            AnyLinkStore::Sharded(s) => s.short_uri_exists(short_uri).await,
        }
    }

    async fn count_by_gid(&self, gid: &str) -> Result<i64, LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.count_by_gid(gid).await,
            AnyLinkStore::Sharded(s) => s.count_by_gid(gid).await,
        }
    }

    async fn create(&self, link: &Link) -> Result<Link, LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.create(link).await,
            AnyLinkStore::Sharded(s) => s.create(link).await,
        }
    }

    async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.create_batch(links).await,
            AnyLinkStore::Sharded(s) => s.create_batch(links).await,
        }
    }

    async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.find_by_short_uri(short_uri).await,
            AnyLinkStore::Sharded(s) => s.find_by_short_uri(short_uri).await,
        }
    }

    async fn find_page(
        &self,
        gid: Option<&str>,
        current: i64,
        size: i64,
    ) -> Result<(Vec<Link>, i64), LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.find_page(gid, current, size).await,
            AnyLinkStore::Sharded(s) => s.find_page(gid, current, size).await,
        }
    }

    async fn update(&self, link: &Link) -> Result<(), LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.update(link).await,
            AnyLinkStore::Sharded(s) => s.update(link).await,
        }
    }

    async fn save_to_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.save_to_recycle_bin(id).await,
            AnyLinkStore::Sharded(s) => s.save_to_recycle_bin(id).await,
        }
    }

    async fn remove_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.remove_from_recycle_bin(id).await,
            AnyLinkStore::Sharded(s) => s.remove_from_recycle_bin(id).await,
        }
    }

    async fn recover_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        match self {
            AnyLinkStore::Single(s) => s.recover_from_recycle_bin(id).await,
            AnyLinkStore::Sharded(s) => s.recover_from_recycle_bin(id).await,
        }
    }
}
