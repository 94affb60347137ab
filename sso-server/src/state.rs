use crate::cache::Cache;
use crate::config::SsoConfig;
use crate::store::TokenStore;
use std::sync::Arc;

/// Shared application state handed to every handler. Cloning is cheap;
/// all fields are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SsoConfig>,
    pub cache: Arc<Cache>,
    pub store: Arc<TokenStore>,
}

impl AppState {
    pub fn new(config: SsoConfig, cache: Cache, store: TokenStore) -> Self {
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            store: Arc::new(store),
        }
    }
}
