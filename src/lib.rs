pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod storage;

use axum::{http::HeaderName, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub use error::{Error, Result};

use config::{Config, StorageBackend};
use storage::{BookingLedger, CatalogStore, MemoryStore, PgStore};

// Shared state for every request handler
#[derive(Clone)]
pub struct AppState {
    pub engine: services::BookingEngine,
    pub cache: cache::CacheService,
    pub config: Config,
}

impl AppState {
    /// Connects the configured storage backend (running migrations for
    /// Postgres) and the optional Redis cache.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let (catalog, ledger): (Arc<dyn CatalogStore>, Arc<dyn BookingLedger>) = match config.storage.backend {
            StorageBackend::Postgres => {
                let url = config
                    .database
                    .url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
                let db = database::Database::connect(url, &config.database).await?;
                info!("Database connected");
                db.run_migrations().await?;

                let store = Arc::new(PgStore::new(db.pool.clone(), config.booking.lock_timeout()));
                let catalog: Arc<dyn CatalogStore> = store.clone();
                let ledger: Arc<dyn BookingLedger> = store;
                (catalog, ledger)
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage; bookings are lost on restart");
                let store = Arc::new(MemoryStore::with_demo_catalog().await?);
                let catalog: Arc<dyn CatalogStore> = store.clone();
                let ledger: Arc<dyn BookingLedger> = store;
                (catalog, ledger)
            }
        };

        let redis = match config.redis.url.as_deref() {
            Some(url) => {
                let client = redis_client::RedisClient::connect(url).await?;
                info!("Redis connected");
                Some(client)
            }
            None => {
                info!("REDIS_URL not set, catalog cache disabled");
                None
            }
        };

        let state = Self::from_parts(config, catalog, ledger, redis);
        state.cache.warmup_cache().await;
        Ok(state)
    }

    pub fn from_parts(
        config: Config,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn BookingLedger>,
        redis: Option<redis_client::RedisClient>,
    ) -> Arc<Self> {
        let cache = cache::CacheService::new(redis, catalog.clone(), config.redis.catalog_ttl_seconds);
        Arc::new(Self {
            engine: services::BookingEngine::new(catalog, ledger),
            cache,
            config,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let request_id = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/", get(|| async { "Seat Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}
