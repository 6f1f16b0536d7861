use std::sync::Arc;
use tracing::info;

use crate::{redis_client::RedisClient, storage::CatalogStore};

pub mod catalog;

/// Read-through cache in front of the catalog store. Without Redis every
/// call goes straight to the store.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
    catalog: Arc<dyn CatalogStore>,
    ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>, catalog: Arc<dyn CatalogStore>, ttl_seconds: u64) -> Self {
        Self { redis, catalog, ttl_seconds }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    // Prime the first page of movies at startup
    pub async fn warmup_cache(&self) {
        if !self.is_enabled() {
            return;
        }
        info!("Starting cache warmup...");
        match self.movies(catalog::DEFAULT_PAGE_SIZE, 0).await {
            Ok(movies) => info!("Cache warmup done, {} movies loaded", movies.len()),
            Err(e) => tracing::warn!("Cache warmup failed: {}", e),
        }
    }
}
