//! Persistent OAuth state: client registrations, authorization codes,
//! access tokens, refresh tokens, and the user credentials the login page
//! verifies against.
//!
//! The store is the only shared mutable resource in the server. All writes
//! that gate security decisions are row-scoped conditional updates; in
//! particular [`StoreBackend::consume_code`] marks a code used and returns
//! it in one step, so a code can never be redeemed twice even under
//! concurrent exchange requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Errors that can occur during token store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("store configuration error: {0}")]
    Config(String),
}

/// A registered OAuth 2.0 client, one per downstream service per
/// environment. Immutable except `is_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single-use authorization code. `used_at` is the tombstone set by
/// [`StoreBackend::consume_code`]; rows stay behind for auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: Uuid,
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A bearer access token (table `service_tokens`). `revoked` makes
/// revocation authoritative before natural expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub access_token: String,
    pub client_id: String,
    pub user_id: String,
    pub token_type: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// A refresh token. `revoked` is a tombstone; rows are never deleted.
/// Scopes ride along so a refreshed access token reproduces the original
/// grant instead of widening to the client's registered set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A platform user the login page authenticates. `password_hash` is
/// SHA-256 hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Interface every token store backend must fulfill
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    async fn insert_client(&self, client: &OAuthClient) -> Result<(), StoreError>;
    async fn client_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>, StoreError>;

    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically mark a code used and return it. `None` means the code is
    /// unknown or was already consumed; the caller must not issue tokens.
    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), StoreError>;
    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Mark an access token revoked; returns whether a row matched
    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;
    async fn refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Tombstone a refresh token; returns whether a row matched
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError>;

    async fn touch_refresh_token(&self, token: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn user_by_name(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn health_check(&self) -> Result<(), String>;
}

/// Runtime-selected token store backend, dispatched like the cache layer
#[derive(Clone)]
pub enum TokenStore {
    Memory(memory::MemoryStore),
    Postgres(postgres::PostgresStore),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Self::Memory($backend) => $call,
            Self::Postgres($backend) => $call,
        }
    };
}

#[async_trait::async_trait]
impl StoreBackend for TokenStore {
    async fn insert_client(&self, client: &OAuthClient) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.insert_client(client).await)
    }

    async fn client_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>, StoreError> {
        dispatch!(self, backend => backend.client_by_id(client_id).await)
    }

    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.insert_code(code).await)
    }

    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        dispatch!(self, backend => backend.consume_code(code).await)
    }

    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.insert_access_token(token).await)
    }

    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        dispatch!(self, backend => backend.access_token(token).await)
    }

    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError> {
        dispatch!(self, backend => backend.revoke_access_token(token).await)
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.insert_refresh_token(token).await)
    }

    async fn refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        dispatch!(self, backend => backend.refresh_token(token).await)
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        dispatch!(self, backend => backend.revoke_refresh_token(token).await)
    }

    async fn touch_refresh_token(&self, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.touch_refresh_token(token, at).await)
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        dispatch!(self, backend => backend.insert_user(user).await)
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        dispatch!(self, backend => backend.user_by_name(username).await)
    }

    async fn health_check(&self) -> Result<(), String> {
        dispatch!(self, backend => backend.health_check().await)
    }
}

/// Create the token store backend selected by the configuration
pub async fn create_store(config: &crate::config::SsoConfig) -> Result<TokenStore, StoreError> {
    match config.store.backend {
        crate::config::StoreBackendKind::Memory => {
            Ok(TokenStore::Memory(memory::MemoryStore::new()))
        }
        crate::config::StoreBackendKind::Postgres => {
            if config.store.postgres_url.is_empty() {
                return Err(StoreError::Config(
                    "Postgres URL is required for the postgres store".to_string(),
                ));
            }
            let store = postgres::PostgresStore::connect(
                &config.store.postgres_url,
                config.store.max_connections,
            )
            .await?;
            Ok(TokenStore::Postgres(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_store_requires_postgres_url() {
        let mut config = crate::config::SsoConfig::default();
        config.store.backend = crate::config::StoreBackendKind::Postgres;
        config.store.postgres_url = String::new();

        assert!(matches!(
            create_store(&config).await,
            Err(StoreError::Config(_))
        ));
    }
}
