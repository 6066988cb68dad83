//! Service entrypoint: loads configuration, wires the Redis/Postgres/Kafka
//! collaborators into the resolve/create/stats pipelines, and serves the
//! HTTP surface.
//!
//! Bootstrap style (tracing_subscriber registry + EnvFilter,
//! `redis::Client::open` then `ConnectionManager::new`) is grounded on the
//! teacher's `database/cache.rs` Redis L3 setup and the tracing init found
//! across the example pack's axum services.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use prometheus::Registry;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shortlink::api::{AppCreator, AppResolver, AppState};
use shortlink::config::Config;
use shortlink::creator::Creator;
use shortlink::eventbus::{EventBus, EventListener, KafkaEventBus, RunMode};
use shortlink::filter::{Filter, RedisFilter, DEFAULT_FILTER_NAME};
use shortlink::geo::UnknownGeoLocator;
use shortlink::linkstore::{AnyLinkStore, LinkStore, PostgresLinkStore, ShardedLinkStore};
use shortlink::lock::RedisLocker;
use shortlink::metrics::Metrics;
use shortlink::resolver::Resolver;
use shortlink::safecache;
use shortlink::stats_sink::StatsSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "shortlink=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("loading configuration")?;
    tracing::info!(port = config.port, "starting shortlink service");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.db.dsn)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    let redis_client = redis::Client::open(config.kv.addr.as_str()).context("parsing redis url")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("connecting to redis")?;

    let cache = Arc::new(safecache::redis_backed(redis_conn.clone(), "shortlink"));
    let filter = Arc::new(RedisFilter::new(redis_conn.clone()));
    filter
        .ensure_reserved(DEFAULT_FILTER_NAME)
        .await
        .context("reserving bloom filter")?;
    let locker = Arc::new(RedisLocker::new(redis_conn.clone(), "shortlink"));

    let link_store = Arc::new(if config.enable_sharding {
        AnyLinkStore::Sharded(ShardedLinkStore::new(
            pool.clone(),
            locker.clone(),
            cache.clone(),
        ))
    } else {
        AnyLinkStore::Single(PostgresLinkStore::new(pool.clone(), cache.clone()))
    });

    let broker = KafkaEventBus::new(
        RunMode::Mixed,
        &config.broker.name_server,
        &config.broker.consumer_group,
    )
    .context("connecting to kafka")?;

    let registry = Arc::new(Registry::new());
    // Registered eagerly so a name collision surfaces at startup rather
    // than on the first `/metrics` scrape.
    let _metrics = Metrics::new(&registry).context("registering metrics")?;

    let stats_sink: Arc<dyn EventListener> = Arc::new(StatsSink::new(
        pool.clone(),
        Arc::new(safecache::RedisKvStore::new(redis_conn.clone())),
        locker.clone(),
        Arc::new(UnknownGeoLocator) as Arc<dyn shortlink::geo::GeoLocator>,
    ));
    broker
        .subscribe(
            shortlink::resolver::VISIT_TOPIC,
            Some(shortlink::resolver::VISIT_TAG),
            stats_sink,
        )
        .await
        .context("subscribing stats sink to visit topic")?;
    let event_bus: Arc<KafkaEventBus> = Arc::new(broker);

    let resolver: Arc<AppResolver> =
        Arc::new(Resolver::new(cache, link_store.clone(), event_bus.clone()));
    let creator: Arc<AppCreator> = Arc::new(Creator::new(
        link_store.clone(),
        filter,
        locker,
        config.max_attempts,
        config.max_links_per_group,
        config.link_domain.clone(),
        config.use_ssl,
        config.default_favicon.clone(),
    ));

    let bus_for_consumer = event_bus.clone();
    tokio::spawn(async move {
        if let Err(err) = bus_for_consumer.run().await {
            tracing::error!(?err, "event bus consumer loop exited");
        }
    });

    let state = AppState {
        resolver,
        creator,
        link_store,
        event_bus,
        config: Arc::new(config.clone()),
        registry,
    };

    let app = shortlink::api::build_router(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listener")?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
