//! The hot short-link resolution path.
//!
//! Grounded on
//! `original_source/internal/link/app/query/get_original_url.go`:
//! publish the visit event first (fire-and-forget; a publish failure is
//! logged, not fatal), then resolve through SafeCache with a loader that
//! falls back to the LinkStore, translating `RedisKeyNotExist`/filter-miss
//! into `ResourceNotFound` and mapping the resulting `CacheValue.status`
//! into the spec §7 error taxonomy.

use std::sync::Arc;
use tracing::warn;

use crate::domain::{CacheValue, VisitEvent};
use crate::error::AppError;
use crate::eventbus::{EventBus, Envelope};
use crate::filter::{Filter, DEFAULT_FILTER_NAME};
use crate::linkstore::{goto_key, negative_key, LinkStore};
use crate::lock::Locker;
use crate::safecache::{KvStore, SafeCache, SafeCacheError};

pub const VISIT_TOPIC: &str = "shortlink";
pub const VISIT_TAG: &str = "user_visit";

/// What the caller observed about the inbound request, needed to build the
/// `VisitEvent` before any data access happens.
pub struct VisitContext {
    pub remote_addr: String,
    pub user_agent: String,
    pub os: String,
    pub browser: String,
    pub device: String,
    pub network: String,
    pub uv_token: String,
}

pub struct Resolver<K, F, L, S> {
    cache: Arc<SafeCache<K, F, L>>,
    link_store: Arc<S>,
    event_bus: Arc<dyn EventBus>,
}

impl<K, F, L, S> Resolver<K, F, L, S>
where
    K: KvStore,
    F: Filter,
    L: Locker,
    S: LinkStore,
{
    pub fn new(
        cache: Arc<SafeCache<K, F, L>>,
        link_store: Arc<S>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            cache,
            link_store,
            event_bus,
        }
    }

    pub async fn resolve(
        &self,
        short_uri: &str,
        gid: &str,
        ctx: VisitContext,
    ) -> Result<String, AppError> {
        let visit = VisitEvent::new(
            short_uri,
            gid,
            ctx.remote_addr,
            ctx.user_agent,
            ctx.os,
            ctx.browser,
            ctx.device,
            ctx.network,
            ctx.uv_token,
        );
        self.publish_visit(visit).await;

        let key = goto_key(short_uri);
        let negative = negative_key(short_uri);
        let link_store = self.link_store.clone();
        let short_uri_owned = short_uri.to_string();

        let loaded = self
            .cache
            .safe_get(
                &key,
                DEFAULT_FILTER_NAME,
                short_uri,
                Some(&negative),
                move || {
                    let link_store = link_store.clone();
                    let short_uri = short_uri_owned.clone();
                    async move {
                        let link = link_store
                            .find_by_short_uri(&short_uri)
                            .await
                            .map_err(|err| SafeCacheError::Loader(err.to_string()))?;
                        match link {
                            Some(link) => {
                                let cache_value = CacheValue::from_link(&link);
                                let ttl = cache_value.expiration();
                                let body = serde_json::to_string(&cache_value)
                                    .map_err(|err| SafeCacheError::Loader(err.to_string()))?;
                                Ok(Some((body, ttl)))
                            }
                            None => Ok(None),
                        }
                    }
                },
                Some(|| async { Ok(()) }),
            )
            .await;

        match loaded {
            Ok(Some(body)) => {
                let cache_value: CacheValue = serde_json::from_str(&body)
                    .map_err(|err| AppError::External(err.to_string()))?;
                if cache_value.is_empty() {
                    return Err(AppError::ResourceNotFound);
                }
                match cache_value.resolve() {
                    Ok(url) => Ok(url.to_string()),
                    Err(status_err) => Err(AppError::ServiceState(status_err)),
                }
            }
            Ok(None) => Err(AppError::ResourceNotFound),
            Err(err) => Err(AppError::External(err.to_string())),
        }
    }

    async fn publish_visit(&self, visit: VisitEvent) {
        let body = match serde_json::to_vec(&visit) {
            Ok(body) => body,
            Err(err) => {
                warn!(?err, "failed to serialize visit event, dropping");
                return;
            }
        };
        let envelope = Envelope::new(VISIT_TOPIC, body)
            .with_tag(VISIT_TAG)
            .with_message_group(visit.short_uri.clone());
        if let Err(err) = self.event_bus.publish(envelope).await {
            warn!(?err, short_uri = %visit.short_uri, "failed to publish visit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreateType, Link, Status, ValidDate, ValidType};
    use crate::eventbus::InMemoryEventBus;
    use crate::eventbus::RunMode;
    use crate::filter::test_support::FakeFilter;
    use crate::linkstore::LinkStoreError;
    use crate::lock::test_support::FakeLocker;
    use crate::safecache::test_support::FakeKv;
    use crate::safecache::SafeCache;
    use async_trait::async_trait;
    use chrono::Utc;
    use dashmap::DashMap;

    struct FakeLinkStore {
        links: DashMap<String, Link>,
    }

    #[async_trait]
    impl LinkStore for FakeLinkStore {
        async fn short_uri_exists(&self, short_uri: &str) -> Result<bool, LinkStoreError> {
            Ok(self.links.contains_key(short_uri))
        }
        async fn count_by_gid(&self, _gid: &str) -> Result<i64, LinkStoreError> {
            Ok(0)
        }
        async fn create(&self, link: &Link) -> Result<Link, LinkStoreError> {
            self.links.insert(link.short_uri.clone(), link.clone());
            Ok(link.clone())
        }
        async fn create_batch(&self, links: &[Link]) -> Result<Vec<Link>, LinkStoreError> {
            for link in links {
                self.links.insert(link.short_uri.clone(), link.clone());
            }
            Ok(links.to_vec())
        }
        async fn find_by_short_uri(&self, short_uri: &str) -> Result<Option<Link>, LinkStoreError> {
            Ok(self.links.get(short_uri).map(|l| l.clone()))
        }
        async fn find_page(
            &self,
            _gid: Option<&str>,
            _current: i64,
            _size: i64,
        ) -> Result<(Vec<Link>, i64), LinkStoreError> {
            let records: Vec<Link> = self.links.iter().map(|e| e.value().clone()).collect();
            let total = records.len() as i64;
            Ok((records, total))
        }
        async fn update(&self, link: &Link) -> Result<(), LinkStoreError> {
            self.links.insert(link.short_uri.clone(), link.clone());
            Ok(())
        }
        async fn save_to_recycle_bin(&self, _id: i64) -> Result<(), LinkStoreError> {
            Ok(())
        }
        async fn remove_from_recycle_bin(&self, _id: i64) -> Result<(), LinkStoreError> {
            Ok(())
        }
        async fn recover_from_recycle_bin(&self, _id: i64) -> Result<(), LinkStoreError> {
            Ok(())
        }
    }

    fn active_link(short_uri: &str) -> Link {
        Link {
            id: 1,
            gid: "g".into(),
            short_uri: short_uri.into(),
            original_url: "https://example.com/target".into(),
            status: Status::Active,
            create_type: CreateType::Api,
            valid_date: ValidDate::new(ValidType::Permanent, Utc::now(), None).unwrap(),
            favicon: None,
            desc: None,
            tenant_id: None,
            recycle_time: None,
        }
    }

    fn ctx() -> VisitContext {
        VisitContext {
            remote_addr: "1.2.3.4".into(),
            user_agent: "curl/8.0".into(),
            os: "linux".into(),
            browser: "curl".into(),
            device: "pc".into(),
            network: "wifi".into(),
            uv_token: "tok".into(),
        }
    }

    #[tokio::test]
    async fn resolves_an_active_link_on_cache_miss_via_loader() {
        let cache = Arc::new(SafeCache::new(
            FakeKv::new(),
            FakeFilter::new(),
            FakeLocker::new(),
            "shortlink",
        ));
        let link_store = Arc::new(FakeLinkStore {
            links: DashMap::new(),
        });
        link_store.create(&active_link("abc123")).await.unwrap();
        let event_bus = Arc::new(InMemoryEventBus::new(RunMode::Mixed));

        let resolver = Resolver::new(cache, link_store, event_bus.clone());
        let url = resolver.resolve("abc123", "g", ctx()).await.unwrap();
        assert_eq!(url, "https://example.com/target");
        assert_eq!(event_bus.publish_count(), 1);
    }

    #[tokio::test]
    async fn unknown_short_uri_is_not_found() {
        let cache = Arc::new(SafeCache::new(
            FakeKv::new(),
            FakeFilter::new(),
            FakeLocker::new(),
            "shortlink",
        ));
        let link_store = Arc::new(FakeLinkStore {
            links: DashMap::new(),
        });
        let event_bus = Arc::new(InMemoryEventBus::new(RunMode::Mixed));

        let resolver = Resolver::new(cache, link_store, event_bus);
        let err = resolver.resolve("missing", "g", ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::ResourceNotFound));
    }

    #[tokio::test]
    async fn forbidden_link_surfaces_service_state() {
        let cache = Arc::new(SafeCache::new(
            FakeKv::new(),
            FakeFilter::new(),
            FakeLocker::new(),
            "shortlink",
        ));
        let link_store = Arc::new(FakeLinkStore {
            links: DashMap::new(),
        });
        let mut link = active_link("forb1");
        link.status = Status::Forbidden;
        link_store.create(&link).await.unwrap();
        let event_bus = Arc::new(InMemoryEventBus::new(RunMode::Mixed));

        let resolver = Resolver::new(cache, link_store, event_bus);
        let err = resolver.resolve("forb1", "g", ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ServiceState(crate::error::ServiceStateError::LinkForbidden)
        ));
    }
}
