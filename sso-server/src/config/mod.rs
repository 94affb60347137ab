pub(crate) use crate::config::cache::{CacheConfig, CacheStore};
pub(crate) use crate::config::store::{StoreBackendKind, StoreConfig};
use crate::config::oauth::OAuthConfig;
use confique::Config;

pub mod cache;
pub mod oauth;
pub mod store;

/// Main configuration structure for the SSO server
#[derive(Debug, Config, Clone)]
pub struct SsoConfig {
    /// The port the SSO server will listen to (default: 7600)
    #[config(env = "SSO_PORT", default = 7600)]
    pub port: u16,

    /// OAuth 2.0 configuration
    #[config(nested)]
    pub oauth: OAuthConfig,

    /// Session cache configuration
    #[config(nested)]
    pub cache: CacheConfig,

    /// Token store configuration
    #[config(nested)]
    pub store: StoreConfig,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            port: 7600,
            oauth: OAuthConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl SsoConfig {
    /// Loads the configuration from `SSO_*` environment variables
    pub fn load() -> Result<Self, String> {
        Self::builder().env().load().map_err(|e| e.to_string())
    }
}
