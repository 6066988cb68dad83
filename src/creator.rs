//! The short-link write path.
//!
//! Grounded on `original_source/internal/link/app/command/create_link.go`:
//! optional `linkCreateLock:<originalUrl>` guard, group-count check,
//! allocation through the filter-backed existence predicate, default
//! application, persistence, and deferred lock release on every exit path.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::allocator::{Allocator, AllocatorError, ExistenceCheck};
use crate::domain::{CreateType, Link, ValidDate, ValidType};
use crate::error::{AppError, ServiceStateError};
use crate::filter::Filter;
use crate::linkstore::{LinkStore, LinkStoreError};
use crate::lock::Locker;

const CREATE_LOCK_TTL: Duration = Duration::from_secs(3);
const DEFAULT_EXPIRATION_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum CreatorError {
    #[error(transparent)]
    ServiceState(#[from] ServiceStateError),
    #[error("link store error: {0}")]
    LinkStore(#[from] LinkStoreError),
    #[error("lock error: {0}")]
    Lock(#[from] crate::lock::LockError),
    #[error("filter error: {0}")]
    Filter(#[from] crate::filter::FilterError),
}

impl From<CreatorError> for AppError {
    fn from(err: CreatorError) -> Self {
        match err {
            CreatorError::ServiceState(inner) => AppError::ServiceState(inner),
            CreatorError::LinkStore(LinkStoreError::AlreadyExists) => {
                AppError::ServiceState(ServiceStateError::AlreadyExists)
            }
            CreatorError::LinkStore(err) => AppError::External(err.to_string()),
            CreatorError::Lock(err) => AppError::External(err.to_string()),
            CreatorError::Filter(err) => AppError::External(err.to_string()),
        }
    }
}

/// Inputs a caller supplies to create a link; defaults are applied by the
/// Creator per spec §4.7 step 4.
pub struct CreateLinkRequest {
    pub gid: String,
    pub original_url: String,
    pub create_type: Option<CreateType>,
    pub valid_type: Option<ValidType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub desc: Option<String>,
    pub favicon: Option<String>,
    pub with_lock: bool,
}

struct FilterExistence<'a, F> {
    filter: &'a F,
    filter_name: &'a str,
}

#[async_trait::async_trait]
impl<F: Filter> ExistenceCheck for FilterExistence<'_, F> {
    async fn exists(&self, short_uri: &str) -> bool {
        use crate::filter::MembershipCheck;
        matches!(
            self.filter
                .check(self.filter_name, short_uri, None)
                .await,
            Ok(MembershipCheck::PossiblyPresent)
        )
    }
}

pub struct Creator<S, F, L> {
    link_store: Arc<S>,
    filter: Arc<F>,
    locker: Arc<L>,
    max_attempts: u32,
    max_links_per_group: i64,
    domain: String,
    use_ssl: bool,
    default_favicon: String,
}

impl<S, F, L> Creator<S, F, L>
where
    S: LinkStore,
    F: Filter,
    L: Locker,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        link_store: Arc<S>,
        filter: Arc<F>,
        locker: Arc<L>,
        max_attempts: u32,
        max_links_per_group: i64,
        domain: String,
        use_ssl: bool,
        default_favicon: String,
    ) -> Self {
        Self {
            link_store,
            filter,
            locker,
            max_attempts,
            max_links_per_group,
            domain,
            use_ssl,
            default_favicon,
        }
    }

    pub async fn create(&self, request: CreateLinkRequest) -> Result<Link, CreatorError> {
        let lock_key = format!("linkCreateLock:{}", request.original_url);
        let token = if request.with_lock {
            self.locker.acquire(&lock_key, CREATE_LOCK_TTL).await?
        } else {
            None
        };

        let result = self.create_inner(request).await;

        if let Some(token) = token {
            self.locker.release(&lock_key, &token).await?;
        }

        result
    }

    async fn create_inner(&self, request: CreateLinkRequest) -> Result<Link, CreatorError> {
        let existing = self.link_store.count_by_gid(&request.gid).await?;
        if existing >= self.max_links_per_group {
            return Err(ServiceStateError::GroupLinkCountExceeded.into());
        }

        let allocator = Allocator::new(self.max_attempts);
        let existence = FilterExistence {
            filter: &*self.filter,
            filter_name: crate::filter::DEFAULT_FILTER_NAME,
        };
        let short_uri = allocator
            .allocate(&request.original_url, &existence)
            .await
            .map_err(|err| match err {
                AllocatorError::TooManyAttempts(_) => ServiceStateError::TooManyAttempts,
            })?;

        let create_type = request.create_type.unwrap_or(CreateType::Api);
        let valid_type = request.valid_type.unwrap_or(ValidType::Permanent);
        let start_date = request.start_date.unwrap_or_else(Utc::now);
        let end_date = match valid_type {
            ValidType::Permanent => None,
            ValidType::Temporary => Some(
                request
                    .end_date
                    .unwrap_or_else(|| Link::default_end_date(start_date, DEFAULT_EXPIRATION_DAYS)),
            ),
        };
        let valid_date = ValidDate::new(valid_type, start_date, end_date)
            .map_err(|_| ServiceStateError::InvalidStatus)?;

        let link = Link {
            id: 0,
            gid: request.gid,
            short_uri,
            original_url: request.original_url,
            status: crate::domain::Status::Active,
            create_type,
            valid_date,
            favicon: request.favicon.or_else(|| Some(self.default_favicon.clone())),
            desc: request.desc,
            tenant_id: None,
            recycle_time: None,
        };

        self.link_store.create(&link).await.map_err(Into::into)
    }

    /// The fully-qualified redirect URL for a persisted link, derived from
    /// configured domain/SSL rather than stored.
    pub fn full_short_url(&self, link: &Link) -> String {
        link.full_short_url(&self.domain, self.use_ssl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::test_support::FakeFilter;
    use crate::linkstore::LinkStoreError as LsErr;
    use crate::lock::test_support::FakeLocker;
    use async_trait::async_trait;
    use dashmap::DashMap;

    struct FakeLinkStore {
        links: DashMap<String, Link>,
        counts: DashMap<String, i64>,
    }

    impl FakeLinkStore {
        fn new() -> Self {
            Self {
                links: DashMap::new(),
                counts: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl LinkStore for FakeLinkStore {
        async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LsErr> {
            Ok(self.links.contains_key(short_uri))
        }
        async fn count_by_gid(&self, gid: &str) -> Result<i64, LsErr> {
            Ok(*self.counts.get(gid).as_deref().unwrap_or(&0))
        }
        async fn create(&self, link: &Link) -> Result<Link, LsErr> {
            if self.links.contains_key(&link.short_uri) {
                return Err(LsErr::AlreadyExists);
            }
            self.links.insert(link.short_uri.clone(), link.clone());
            *self.counts.entry(link.gid.clone()).or_insert(0) += 1;
            let mut persisted = link.clone();
            persisted.id = self.links.len() as i64;
            Ok(persisted)
        }
        async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LsErr> {
            let mut out = Vec::new();
            for link in links {
                out.push(self.create(link).await?);
            }
            Ok(out)
        }
        async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LsErr> {
            Ok(self.links.get(short_uri).map(|l| l.clone()))
        }
        async fn find_page(
            &self,
            _gid: Option<&str>,
            _current: i64,
            _size: i64,
        ) -> Result<(Vec<Link>, i64), LsErr> {
            let records: Vec<Link> = self.links.iter().map(|e| e.value().clone()).collect();
            let total = records.len() as i64;
            Ok((records, total))
        }
        async fn update(&self, link: &Link) -> Result<(), LsErr> {
            self.links.insert(link.short_uri.clone(), link.clone());
            Ok(())
        }
        async fn save_to_recycle_bin(&self, _id: i64) -> Result<(), LsErr> {
            Ok(())
        }
        async fn remove_from_recycle_bin(&self, _id: i64) -> Result<(), LsErr> {
            Ok(())
        }
        async fn recover_from_recycle_bin(&self, _id: i64) -> Result<(), LsErr> {
            Ok(())
        }
    }

    fn request() -> CreateLinkRequest {
        CreateLinkRequest {
            gid: "g".into(),
            original_url: "https://example.com/a".into(),
            create_type: None,
            valid_type: None,
            start_date: None,
            end_date: None,
            desc: None,
            favicon: None,
            with_lock: true,
        }
    }

    #[tokio::test]
    async fn creates_a_link_with_defaults_applied() {
        let creator = Creator::new(
            Arc::new(FakeLinkStore::new()),
            Arc::new(FakeFilter::new()),
            Arc::new(FakeLocker::new()),
            10,
            100,
            "s.example.com".into(),
            true,
            "https://fav.ico".into(),
        );
        let link = creator.create(request()).await.unwrap();
        assert_eq!(link.create_type, CreateType::Api);
        assert_eq!(link.valid_date.valid_type, ValidType::Permanent);
        assert!(!link.short_uri.is_empty());
    }

    #[tokio::test]
    async fn rejects_when_group_link_count_exceeded() {
        let creator = Creator::new(
            Arc::new(FakeLinkStore::new()),
            Arc::new(FakeFilter::new()),
            Arc::new(FakeLocker::new()),
            10,
            0,
            "s.example.com".into(),
            true,
            "https://fav.ico".into(),
        );
        let err = creator.create(request()).await.unwrap_err();
        assert!(matches!(
            err,
            CreatorError::ServiceState(ServiceStateError::GroupLinkCountExceeded)
        ));
    }
}
