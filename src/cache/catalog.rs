use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::CacheService;
use crate::error::Result;
use crate::models::{Movie, ShowDetails};

pub const DEFAULT_PAGE_SIZE: i64 = 20;

impl CacheService {
    pub async fn movies(&self, limit: i64, offset: i64) -> Result<Vec<Movie>> {
        let key = format!("catalog:movies:l={}:o={}", limit, offset);
        if let Some(movies) = self.cached(&key).await {
            return Ok(movies);
        }

        let movies = self.catalog.list_movies(limit, offset).await?;
        self.store(&key, &movies).await;
        Ok(movies)
    }

    /// Shows of a movie with the movie nested. Unknown movies have no shows.
    pub async fn shows_for_movie(&self, movie_id: i64, limit: i64, offset: i64) -> Result<Vec<ShowDetails>> {
        let key = format!("catalog:movie:{}:shows:l={}:o={}", movie_id, limit, offset);
        if let Some(shows) = self.cached(&key).await {
            return Ok(shows);
        }

        let Some(movie) = self.catalog.get_movie(movie_id).await? else {
            return Ok(Vec::new());
        };
        let shows: Vec<ShowDetails> = self
            .catalog
            .shows_for_movie(movie_id, limit, offset)
            .await?
            .into_iter()
            .map(|show| ShowDetails::new(show, movie.clone()))
            .collect();

        self.store(&key, &shows).await;
        Ok(shows)
    }

    // Cache errors are logged and treated as a miss
    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let redis = self.redis.as_ref()?;
        let mut conn = redis.conn.clone();
        let data: Option<String> = match conn.get(key).await {
            Ok(data) => data,
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                return None;
            }
        };
        let value = serde_json::from_str(&data?)
            .map_err(|e| warn!("cache entry {} is corrupt: {}", key, e))
            .ok()?;
        debug!("cache hit: {}", key);
        Some(value)
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        let Some(redis) = self.redis.as_ref() else {
            return;
        };
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        let mut conn = redis.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, data, self.ttl_seconds).await {
            warn!("cache write failed for {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn disabled_cache_reads_through_to_the_store() {
        let store = MemoryStore::new();
        let movie = store.add_movie("Cached Movie", 120).await.unwrap();
        store.add_show(movie.id, "Screen 3", Utc::now(), 40).await.unwrap();

        let cache = CacheService::new(None, Arc::new(store), 60);
        assert!(!cache.is_enabled());

        let movies = cache.movies(DEFAULT_PAGE_SIZE, 0).await.unwrap();
        assert_eq!(movies, vec![movie.clone()]);

        let shows = cache.shows_for_movie(movie.id, DEFAULT_PAGE_SIZE, 0).await.unwrap();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].movie, movie);
        assert_eq!(shows[0].total_seats, 40);

        assert!(cache.shows_for_movie(movie.id + 1, DEFAULT_PAGE_SIZE, 0).await.unwrap().is_empty());
    }
}
