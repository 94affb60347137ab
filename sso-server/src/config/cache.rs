use confique::Config;
use serde::Deserialize;

/// Specifies which cache store implementation holds login sessions
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStore {
    #[default]
    InMemory,
    Redis,
}

/// Configuration for the session cache
#[derive(Debug, Config, Clone)]
pub struct CacheConfig {
    /// Session TTL in seconds (default: 1 hour)
    #[config(env = "SSO_CACHE_TTL", default = 3600)]
    pub ttl: u64,

    /// Cache store type: "in-memory" (default) or "redis"
    #[config(env = "SSO_CACHE_STORE", default = "in-memory")]
    pub store: CacheStore,

    /// In-memory cache specific configuration
    #[config(nested)]
    pub memory: InMemoryConfig,

    /// Redis cache specific configuration
    #[config(nested)]
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: 3600,
            store: CacheStore::InMemory,
            memory: InMemoryConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

/// In-memory cache configuration options
#[derive(Debug, Config, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of cached entries (default: 10000)
    #[config(env = "SSO_CACHE_MEMORY_CAPACITY", default = 10000)]
    pub capacity: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Redis cache configuration options
#[derive(Debug, Config, Clone)]
pub struct RedisConfig {
    /// Redis connection string
    #[config(env = "SSO_CACHE_REDIS_URL", default = "")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: String::new() }
    }
}
