//! Shared application state, mirroring the teacher's
//! `api/handlers.rs::AppState` (state + config behind one `Arc`, cloned
//! into `axum::extract::State`).

use std::sync::Arc;

use prometheus::Registry;

use crate::config::Config;
use crate::creator::Creator;
use crate::eventbus::EventBus;
use crate::filter::RedisFilter;
use crate::linkstore::AnyLinkStore;
use crate::lock::RedisLocker;
use crate::resolver::Resolver;
use crate::safecache::RedisKvStore;

pub type AppResolver = Resolver<RedisKvStore, RedisFilter, RedisLocker, AnyLinkStore>;
pub type AppCreator = Creator<AnyLinkStore, RedisFilter, RedisLocker>;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<AppResolver>,
    pub creator: Arc<AppCreator>,
    pub link_store: Arc<AnyLinkStore>,
    pub event_bus: Arc<dyn EventBus>,
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
}
