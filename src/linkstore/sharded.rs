//! Sharded `LinkStore`: `link` partitioned by `gid`, `link_goto` partitioned
//! by `short_uri` as a cross-shard lookup table.
//!
//! Grounded on
//! `original_source/internal/link/adapter/link_sharding_repository.go`:
//! a lookup in `link_goto` resolves `shortUri -> gid` before the `link`
//! table itself can be queried, since the two tables are sharded on
//! different keys and cannot be joined. Gid-change updates run under
//! `lockGidUpdate:<shortUri>` and are not atomic across shards (spec §4.5).

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use super::postgres::PostgresLinkStore;
use super::{is_unique_violation, LinkStore, LinkStoreError};
use crate::domain::{Link, LinkGoto};
use crate::lock::Locker;
use crate::safecache::RedisSafeCache;

const GID_UPDATE_LOCK_TTL: Duration = Duration::from_secs(10);

/// Sharded `LinkStore`. Delegates row-level CRUD to the same queries as
/// [`PostgresLinkStore`] (this service does not implement physical sharding
/// itself — that's the database layer's job — but it does maintain the
/// `link_goto` lookup table the physical sharding scheme needs) and adds
/// the cross-shard bookkeeping spec §4.5 describes.
pub struct ShardedLinkStore<L> {
    pool: PgPool,
    inner: PostgresLinkStore,
    locker: Arc<L>,
}

impl<L: Locker> ShardedLinkStore<L> {
    pub fn new(pool: PgPool, locker: Arc<L>, cache: Arc<RedisSafeCache>) -> Self {
        let inner = PostgresLinkStore::new(pool.clone(), cache);
        Self {
            pool,
            inner,
            locker,
        }
    }

    fn gid_update_lock_key(short_uri: &str) -> String {
        format!("lockGidUpdate:{short_uri}")
    }

    async fn lookup_gid(&self, short_uri: &str) -> Result<Option<String>, LinkStoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT gid FROM link_goto WHERE short_uri = $1")
                .bind(short_uri)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(gid,)| gid))
    }

    /// Moves a link's `link_goto` row to a new gid. Per spec §4.5, the
    /// delete+insert across the two shards is not wrapped in a single
    /// distributed transaction; the per-`short_uri` lock bounds the window
    /// during which a reader can observe neither row.
    pub async fn change_gid(
        &self,
        short_uri: &str,
        new_gid: &str,
    ) -> Result<(), LinkStoreError> {
        let lock_key = Self::gid_update_lock_key(short_uri);
        let token = self
            .locker
            .acquire(&lock_key, GID_UPDATE_LOCK_TTL)
            .await
            .map_err(|_| LinkStoreError::LockFailed(lock_key.clone()))?
            .ok_or_else(|| LinkStoreError::LockFailed(lock_key.clone()))?;

        let result = async {
            sqlx::query("DELETE FROM link_goto WHERE short_uri = $1")
                .bind(short_uri)
                .execute(&self.pool)
                .await?;
            sqlx::query("INSERT INTO link_goto (short_uri, gid) VALUES ($1, $2)")
                .bind(short_uri)
                .bind(new_gid)
                .execute(&self.pool)
                .await?;
            Ok::<_, LinkStoreError>(())
        }
        .await;

        let _ = self.locker.release(&lock_key, &token).await;
        result
    }

    pub async fn find_goto(&self, short_uri: &str) -> Result<Option<LinkGoto>, LinkStoreError> {
        Ok(self.lookup_gid(short_uri).await?.map(|gid| LinkGoto {
            short_uri: short_uri.to_string(),
            gid,
        }))
    }
}

#[async_trait]
impl<L: Locker> LinkStore for ShardedLinkStore<L> {
    async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LinkStoreError> {
        Ok(self.lookup_gid(short_uri).await?.is_some())
    }

    async fn count_by_gid(&self, gid: &str) -> Result<i64, LinkStoreError> {
        self.inner.count_by_gid(gid).await
    }

    async fn create(&self, link: &Link) -> Result<Link, LinkStoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO link
                (gid, short_uri, original_url, status, create_type, valid_type,
                 start_date, end_date, favicon, desc, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(&link.gid)
        .bind(&link.short_uri)
        .bind(&link.original_url)
        .bind(link.status)
        .bind(link.create_type)
        .bind(link.valid_date.valid_type)
        .bind(link.valid_date.start_date)
        .bind(link.valid_date.end_date)
        .bind(&link.favicon)
        .bind(&link.desc)
        .bind(&link.tenant_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LinkStoreError::AlreadyExists
            } else {
                LinkStoreError::Database(err)
            }
        })?;

        sqlx::query("INSERT INTO link_goto (short_uri, gid) VALUES ($1, $2)")
            .bind(&link.short_uri)
            .bind(&link.gid)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    LinkStoreError::AlreadyExists
                } else {
                    LinkStoreError::Database(err)
                }
            })?;

        tx.commit().await?;

        let mut persisted = link.clone();
        persisted.id = inserted.0;
        self.inner.warm_cache(&persisted).await?;
        Ok(persisted)
    }

    async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LinkStoreError> {
        let mut persisted = Vec::with_capacity(links.len());
        for link in links {
            persisted.push(self.create(link).await?);
        }
        Ok(persisted)
    }

    async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LinkStoreError> {
        if self.lookup_gid(short_uri).await?.is_none() {
            return Ok(None);
        }
        self.inner.find_by_short_uri(short_uri).await
    }

    async fn find_page(
        &self,
        gid: Option<&str>,
        current: i64,
        size: i64,
    ) -> Result<(Vec<Link>, i64), LinkStoreError> {
        self.inner.find_page(gid, current, size).await
    }

    async fn update(&self, link: &Link) -> Result<(), LinkStoreError> {
        self.inner.update(link).await
    }

    async fn save_to_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        self.inner.save_to_recycle_bin(id).await
    }

    async fn remove_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        self.inner.remove_from_recycle_bin(id).await
    }

    async fn recover_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        self.inner.recover_from_recycle_bin(id).await
    }
}
