use confique::Config;
use serde::Deserialize;

/// Specifies which token store backend persists OAuth state
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackendKind {
    Postgres,
    /// Process-local store for development and tests; loses all state on
    /// restart.
    #[default]
    Memory,
}

/// Configuration for the token store
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Token store backend: "postgres" or "memory" (default)
    #[config(env = "SSO_STORE_BACKEND", default = "memory")]
    pub backend: StoreBackendKind,

    /// Postgres connection string, required when backend is "postgres"
    #[config(env = "SSO_STORE_POSTGRES_URL", default = "")]
    pub postgres_url: String,

    /// Maximum connections in the Postgres pool (default: 5)
    #[config(env = "SSO_STORE_POSTGRES_MAX_CONNECTIONS", default = 5)]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            postgres_url: String::new(),
            max_connections: 5,
        }
    }
}
