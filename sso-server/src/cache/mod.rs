use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse value: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Interface every cache backend must fulfill.
///
/// The server keeps only ephemeral state here (login sessions); everything
/// with an audit requirement lives in the token store. Implementations must
/// be thread-safe and cheap to clone so handlers can share them.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Store a value under a key with the backend-wide TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T)
        -> Result<(), CacheError>;

    /// Retrieve a value, `None` on miss or expiry
    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError>;

    /// Remove a value
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Probe backend connectivity; for Redis this pings the server
    async fn health_check(&self) -> Result<(), String>;
}

/// Runtime-selected cache backend.
///
/// Enum dispatch instead of trait objects keeps the generic `set`/`get`
/// methods usable. The concrete variant is chosen from configuration at
/// startup.
#[derive(Clone)]
pub enum Cache {
    /// In-memory cache backed by Moka
    InMemory(memory::InMemoryCache),
    /// Redis-backed cache, shared across server replicas
    Redis(redis::RedisCache),
}

#[async_trait::async_trait]
impl CacheBackend for Cache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.set(key, value).await,
            Self::Redis(cache) => cache.set(key, value).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self {
            Self::InMemory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            Self::InMemory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }
}

/// Create the cache backend selected by the configuration.
///
/// Login sessions live in this cache, so there is no "disabled" mode; a
/// server without a working cache cannot complete the authorize flow.
pub async fn create_cache(config: &crate::config::SsoConfig) -> Result<Cache, CacheError> {
    match config.cache.store {
        crate::config::CacheStore::InMemory => {
            let cache = memory::InMemoryCache::new(config.cache.ttl, config.cache.memory.capacity);
            Ok(Cache::InMemory(cache))
        }
        crate::config::CacheStore::Redis => {
            if config.cache.redis.url.is_empty() {
                return Err(CacheError::Config(
                    "Redis URL is required for the Redis cache".to_string(),
                ));
            }
            let cache = redis::RedisCache::new(&config.cache.redis.url, config.cache.ttl)
                .await
                .map_err(CacheError::Config)?;
            Ok(Cache::Redis(cache))
        }
    }
}
