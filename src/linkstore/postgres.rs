//! Single-table `LinkStore`, grounded on
//! `original_source/internal/link/adapter/link_repository.go`: one `link`
//! table, uniqueness enforced by a DB constraint on `short_uri`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use super::{goto_key, is_unique_violation, negative_key, LinkStore, LinkStoreError};
use crate::domain::{CacheValue, CreateType, Link, Status, ValidDate, ValidType};
use crate::filter::DEFAULT_FILTER_NAME;
use crate::safecache::RedisSafeCache;

struct LinkRow {
    id: i64,
    gid: String,
    short_uri: String,
    original_url: String,
    status: Status,
    create_type: CreateType,
    valid_type: ValidType,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    favicon: Option<String>,
    desc: Option<String>,
    tenant_id: Option<String>,
    recycle_time: Option<DateTime<Utc>>,
}

impl LinkRow {
    fn into_link(self) -> Result<Link, LinkStoreError> {
        let valid_date = ValidDate::new(self.valid_type, self.start_date, self.end_date)
            .map_err(|_| LinkStoreError::Database(sqlx::Error::RowNotFound))?;
        Ok(Link {
            id: self.id,
            gid: self.gid,
            short_uri: self.short_uri,
            original_url: self.original_url,
            status: self.status,
            create_type: self.create_type,
            valid_date,
            favicon: self.favicon,
            desc: self.desc,
            tenant_id: self.tenant_id,
            recycle_time: self.recycle_time,
        })
    }
}

/// Postgres-backed single-table `LinkStore`.
pub struct PostgresLinkStore {
    pool: PgPool,
    cache: Arc<RedisSafeCache>,
}

impl PostgresLinkStore {
    pub fn new(pool: PgPool, cache: Arc<RedisSafeCache>) -> Self {
        Self { pool, cache }
    }

    /// Warms the cache and the membership filter for a freshly-persisted
    /// link, matching `LinkRepository.CreateLink`'s post-insert `SafePut`.
    /// Without this a just-created shortUri is Bloom-filter-absent and the
    /// very next resolve is rejected before ever reaching the database.
    pub(crate) async fn warm_cache(&self, link: &Link) -> Result<(), LinkStoreError> {
        let cache_value = CacheValue::from_link(link);
        let ttl = cache_value.expiration();
        let body = serde_json::to_string(&cache_value).map_err(|err| {
            LinkStoreError::Cache(crate::safecache::SafeCacheError::Loader(err.to_string()))
        })?;
        self.cache
            .safe_put(
                &goto_key(&link.short_uri),
                &body,
                ttl,
                DEFAULT_FILTER_NAME,
                &link.short_uri,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LinkStore for PostgresLinkStore {
    async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LinkStoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM link WHERE short_uri = $1 AND recycle_time IS NULL")
                .bind(short_uri)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn count_by_gid(&self, gid: &str) -> Result<i64, LinkStoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM link WHERE gid = $1 AND recycle_time IS NULL")
                .bind(gid)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn create(&self, link: &Link) -> Result<Link, LinkStoreError> {
        let result = sqlx::query_as::<_, (i64,)>(
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
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                LinkStoreError::AlreadyExists
            } else {
                LinkStoreError::Database(err)
            }
        })?;

        let mut persisted = link.clone();
        persisted.id = result.0;
        self.warm_cache(&persisted).await?;
        Ok(persisted)
    }

    async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LinkStoreError> {
        let mut tx = self.pool.begin().await?;
        let mut persisted = Vec::with_capacity(links.len());
        for link in links {
            let result = sqlx::query_as::<_, (i64,)>(
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
            let mut clone = link.clone();
            clone.id = result.0;
            persisted.push(clone);
        }
        tx.commit().await?;

        // Cache warming happens per-link after the transaction commits,
        // matching `LinkRepository.CreateLinkBatch`'s SafePut loop.
        for link in &persisted {
            self.warm_cache(link).await?;
        }
        Ok(persisted)
    }

    async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LinkStoreError> {
        let row = sqlx::query_as::<_, RawLinkRow>(
            r#"
            SELECT id, gid, short_uri, original_url, status, create_type, valid_type,
                   start_date, end_date, favicon, "desc", tenant_id, recycle_time
            FROM link
            WHERE short_uri = $1 AND recycle_time IS NULL
            "#,
        )
        .bind(short_uri)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RawLinkRow::into_row)
            .transpose()?
            .map(LinkRow::into_link)
            .transpose()
    }

    async fn find_page(
        &self,
        gid: Option<&str>,
        current: i64,
        size: i64,
    ) -> Result<(Vec<Link>, i64), LinkStoreError> {
        let current = current.max(1);
        let size = if size <= 0 { 10 } else { size };
        let offset = (current - 1) * size;

        let total: i64 = match gid {
            Some(gid) => {
                sqlx::query_as::<_, (i64,)>(
                    "SELECT COUNT(*) FROM link WHERE gid = $1 AND recycle_time IS NULL",
                )
                .bind(gid)
                .fetch_one(&self.pool)
                .await?
                .0
            }
            None => {
                sqlx::query_as::<_, (i64,)>(
                    "SELECT COUNT(*) FROM link WHERE recycle_time IS NULL",
                )
                .fetch_one(&self.pool)
                .await?
                .0
            }
        };

        let rows = match gid {
            Some(gid) => {
                sqlx::query_as::<_, RawLinkRow>(
                    r#"
                    SELECT id, gid, short_uri, original_url, status, create_type, valid_type,
                           start_date, end_date, favicon, "desc", tenant_id, recycle_time
                    FROM link
                    WHERE gid = $1 AND recycle_time IS NULL
                    ORDER BY id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(gid)
                .bind(size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RawLinkRow>(
                    r#"
                    SELECT id, gid, short_uri, original_url, status, create_type, valid_type,
                           start_date, end_date, favicon, "desc", tenant_id, recycle_time
                    FROM link
                    WHERE recycle_time IS NULL
                    ORDER BY id DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let links = rows
            .into_iter()
            .map(|row| row.into_row().and_then(LinkRow::into_link))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((links, total))
    }

    async fn update(&self, link: &Link) -> Result<(), LinkStoreError> {
        sqlx::query(
            r#"
            UPDATE link SET
                gid = $1, original_url = $2, status = $3, valid_type = $4,
                start_date = $5, end_date = $6, favicon = $7, "desc" = $8
            WHERE id = $9
            "#,
        )
        .bind(&link.gid)
        .bind(&link.original_url)
        .bind(link.status)
        .bind(link.valid_date.valid_type)
        .bind(link.valid_date.start_date)
        .bind(link.valid_date.end_date)
        .bind(&link.favicon)
        .bind(&link.desc)
        .bind(link.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recycles the link and invalidates its cache entry, matching
    /// `SaveToRecycleBin` + `modifyCacheValueStatus(..., StatusDeleted)`: a
    /// stale `Active` `CacheValue` must stop resolving the moment a link is
    /// recycled, not merely once its TTL happens to lapse.
    async fn save_to_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE link SET recycle_time = now() WHERE id = $1 AND recycle_time IS NULL RETURNING short_uri",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (short_uri,) = row.ok_or(LinkStoreError::NotFound)?;
        self.cache
            .safe_delete(&goto_key(&short_uri), Some(&negative_key(&short_uri)))
            .await?;
        Ok(())
    }

    /// Permanently removes a recycled link and installs the negative marker,
    /// matching `RemoveFromRecycleBin`'s `RecycleTime.Valid` guard plus its
    /// `SafeDelete(goto:…, gotoIsNull:…)` call.
    async fn remove_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "DELETE FROM link WHERE id = $1 AND recycle_time IS NOT NULL RETURNING short_uri",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (short_uri,) = row.ok_or(LinkStoreError::NotInRecycleBin)?;
        self.cache
            .safe_delete(&goto_key(&short_uri), Some(&negative_key(&short_uri)))
            .await?;
        Ok(())
    }

    /// Restores a recycled link and clears its negative marker, matching
    /// `RecoverFromRecycleBin`'s `RecycleTime.Valid` guard plus its
    /// `modifyCacheValueStatus` call. The cache entry itself is left for the
    /// next `safe_get` to repopulate via the loader rather than rewritten in
    /// place here — clearing the marker is the part that must happen
    /// synchronously, since otherwise the filter's negative check would keep
    /// suppressing the loader forever.
    async fn recover_from_recycle_bin(&self, id: i64) -> Result<(), LinkStoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE link SET recycle_time = NULL WHERE id = $1 AND recycle_time IS NOT NULL RETURNING short_uri",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (short_uri,) = row.ok_or(LinkStoreError::NotInRecycleBin)?;
        self.cache.clear_negative(&negative_key(&short_uri)).await?;
        Ok(())
    }
}

/// Intermediate row shape `query_as!` can derive `FromRow` for; kept
/// separate from [`LinkRow`] because the macro needs a `#[derive]`d type
/// while `LinkRow::into_link` needs fallible `ValidDate` construction.
#[derive(sqlx::FromRow)]
struct RawLinkRow {
    id: i64,
    gid: String,
    short_uri: String,
    original_url: String,
    status: Status,
    create_type: CreateType,
    valid_type: ValidType,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    favicon: Option<String>,
    desc: Option<String>,
    tenant_id: Option<String>,
    recycle_time: Option<DateTime<Utc>>,
}

impl RawLinkRow {
    fn into_row(self) -> Result<LinkRow, LinkStoreError> {
        Ok(LinkRow {
            id: self.id,
            gid: self.gid,
            short_uri: self.short_uri,
            original_url: self.original_url,
            status: self.status,
            create_type: self.create_type,
            valid_type: self.valid_type,
            start_date: self.start_date,
            end_date: self.end_date,
            favicon: self.favicon,
            desc: self.desc,
            tenant_id: self.tenant_id,
            recycle_time: self.recycle_time,
        })
    }
}
