use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

// Top-level configuration, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    // Required only for the postgres backend
    pub url: Option<String>,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

// Redis backs the catalog cache; no URL means no cache
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub catalog_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub lock_timeout_ms: u64,
}

impl BookingConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests do not have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend: StorageBackend = parse(&var("STORAGE_BACKEND", "postgres"), "STORAGE_BACKEND")?;
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL must be set for the postgres storage backend"));
        }

        // PostgreSQL reads a zero lock_timeout as "wait forever".
        let lock_timeout_ms: u64 = parse(&var("BOOKING_LOCK_TIMEOUT_MS", "2000"), "BOOKING_LOCK_TIMEOUT_MS")?;
        if lock_timeout_ms == 0 {
            return Err(anyhow!("BOOKING_LOCK_TIMEOUT_MS must be greater than zero"));
        }

        Ok(Config {
            app: AppConfig {
                host: var("HOST", "0.0.0.0"),
                port: parse(&var("PORT", "8000"), "PORT")?,
                environment: var("ENVIRONMENT", "development"),
                rust_log: var("RUST_LOG", "seat_booking=debug,tower_http=debug"),
            },
            storage: StorageConfig { backend },
            database: DatabaseConfig {
                url: database_url,
                pool_size: parse(&var("DB_POOL_SIZE", "20"), "DB_POOL_SIZE")?,
                acquire_timeout_seconds: parse(
                    &var("DB_ACQUIRE_TIMEOUT_SECONDS", "5"),
                    "DB_ACQUIRE_TIMEOUT_SECONDS",
                )?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|s| !s.is_empty()),
                catalog_ttl_seconds: parse(&var("CATALOG_CACHE_TTL_SECONDS", "300"), "CATALOG_CACHE_TTL_SECONDS")?,
            },
            jwt: JwtConfig {
                secret: lookup("JWT_SECRET")
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?,
                leeway_seconds: parse(&var("JWT_LEEWAY_SECONDS", "30"), "JWT_LEEWAY_SECONDS")?,
            },
            booking: BookingConfig {
                lock_timeout_ms,
            },
        })
    }
}

fn parse<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("{} has an invalid value '{}'", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_for_memory_backend() {
        let config = Config::from_lookup(lookup(&[("STORAGE_BACKEND", "memory"), ("JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.database.pool_size, 20);
        assert!(config.database.url.is_none());
        assert!(config.redis.url.is_none());
        assert_eq!(config.booking.lock_timeout(), Duration::from_millis(2000));
        assert!(!config.app.is_production());
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/booking"),
            ("BOOKING_LOCK_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.booking.lock_timeout_ms, 250);
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(format!("{:#}", err).contains("PORT"));
    }

    #[test]
    fn zero_lock_timeout_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("BOOKING_LOCK_TIMEOUT_MS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BOOKING_LOCK_TIMEOUT_MS"));
    }

    #[test]
    fn jwt_secret_is_required() {
        let err = Config::from_lookup(lookup(&[("STORAGE_BACKEND", "memory")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!("sqlite".parse::<StorageBackend>().is_err());
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
    }
}
