//! Token and authorization code lifecycle for the OAuth 2.0 endpoints

use crate::store::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, StoreBackend, StoreError,
    TokenStore,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use log::{debug, warn};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during token and authorization code operations.
/// The handlers decide which of these map to `invalid_grant` on the wire.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("authorization code not found, expired, or already used")]
    CodeNotFound,
    #[error("authorization code was issued to a different client")]
    ClientMismatch,
    #[error("redirect_uri does not match the authorization request")]
    RedirectUriMismatch,
    #[error("code_verifier does not match the code_challenge")]
    PkceMismatch,
    #[error("refresh token not found or expired")]
    RefreshNotFound,
    #[error("refresh token has been revoked")]
    RefreshRevoked,
}

/// An access/refresh token pair minted by an exchange
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub scopes: Vec<String>,
}

/// Authorization code and token lifecycle over the token store
#[derive(Clone)]
pub struct TokenService {
    store: Arc<TokenStore>,
    access_token_ttl: u64,
    refresh_token_ttl: u64,
    code_ttl: u64,
    rotate_refresh_tokens: bool,
}

impl TokenService {
    pub fn new(store: Arc<TokenStore>, config: &crate::config::oauth::OAuthConfig) -> Self {
        Self {
            store,
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            code_ttl: config.code_ttl,
            rotate_refresh_tokens: config.rotate_refresh_tokens,
        }
    }

    /// Mint a single-use authorization code bound to the client, user,
    /// redirect URI, and PKCE challenge
    pub async fn issue_code(
        &self,
        user_id: &str,
        client: &OAuthClient,
        redirect_uri: &str,
        scopes: Vec<String>,
        code_challenge: &str,
    ) -> Result<String, TokenError> {
        let code = generate_secret();
        let now = Utc::now();

        let row = AuthorizationCode {
            id: Uuid::new_v4(),
            code: code.clone(),
            client_id: client.client_id.clone(),
            user_id: user_id.to_string(),
            scopes,
            redirect_uri: redirect_uri.to_string(),
            code_challenge: code_challenge.to_string(),
            code_challenge_method: "S256".to_string(),
            expires_at: now + Duration::seconds(self.code_ttl as i64),
            used_at: None,
            created_at: now,
        };
        self.store.insert_code(&row).await?;

        debug!(
            "issued authorization code for user '{}' via client '{}', expires in {}s",
            user_id, client.client_id, self.code_ttl
        );

        Ok(code)
    }

    /// Redeem an authorization code for a token pair.
    ///
    /// The code is consumed (marked used) before any further validation;
    /// a failed PKCE or redirect check burns it, so retrying with fixed
    /// parameters still fails.
    pub async fn exchange_code(
        &self,
        code: &str,
        client: &OAuthClient,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<IssuedTokens, TokenError> {
        let row = self
            .store
            .consume_code(code)
            .await?
            .ok_or(TokenError::CodeNotFound)?;

        if Utc::now() >= row.expires_at {
            warn!("rejected expired authorization code for client '{}'", row.client_id);
            return Err(TokenError::CodeNotFound);
        }

        if row.client_id != client.client_id {
            warn!(
                "authorization code issued to '{}' presented by '{}'",
                row.client_id, client.client_id
            );
            return Err(TokenError::ClientMismatch);
        }

        if row.redirect_uri != redirect_uri {
            warn!("redirect_uri mismatch for client '{}'", client.client_id);
            return Err(TokenError::RedirectUriMismatch);
        }

        if !verify_pkce(&row.code_challenge, code_verifier) {
            warn!("PKCE verification failed for client '{}'", client.client_id);
            return Err(TokenError::PkceMismatch);
        }

        self.mint_pair(&row.user_id, &client.client_id, row.scopes)
            .await
    }

    /// Exchange a refresh token for a new access token. With rotation
    /// enabled the presented token is tombstoned and a replacement issued;
    /// the returned pair always carries a usable refresh token.
    pub async fn exchange_refresh(
        &self,
        refresh_token: &str,
        client: &OAuthClient,
    ) -> Result<IssuedTokens, TokenError> {
        let row = self
            .store
            .refresh_token(refresh_token)
            .await?
            .ok_or(TokenError::RefreshNotFound)?;

        if row.client_id != client.client_id {
            warn!(
                "refresh token issued to '{}' presented by '{}'",
                row.client_id, client.client_id
            );
            return Err(TokenError::ClientMismatch);
        }

        // Revoked wins over expired: the tombstone is authoritative
        if row.revoked {
            warn!("rejected revoked refresh token for client '{}'", client.client_id);
            return Err(TokenError::RefreshRevoked);
        }

        if let Some(expires_at) = row.expires_at {
            if Utc::now() >= expires_at {
                return Err(TokenError::RefreshNotFound);
            }
        }

        let now = Utc::now();
        self.store
            .touch_refresh_token(refresh_token, now)
            .await?;

        let access_token = self
            .mint_access_token(&row.user_id, &client.client_id, row.scopes.clone())
            .await?;

        let refresh = if self.rotate_refresh_tokens {
            self.store.revoke_refresh_token(refresh_token).await?;
            self.mint_refresh_token(&row.user_id, &client.client_id, row.scopes)
                .await?
        } else {
            refresh_token.to_string()
        };

        debug!(
            "refreshed access token for user '{}' via client '{}' (rotation: {})",
            row.user_id, client.client_id, self.rotate_refresh_tokens
        );

        Ok(IssuedTokens {
            access_token: access_token.access_token,
            refresh_token: refresh,
            expires_in: self.access_token_ttl,
            scopes: access_token.scopes,
        })
    }

    /// Revoke a token of either kind. Unknown tokens are not an error
    /// (RFC 7009); the hint only orders the lookups.
    pub async fn revoke(&self, token: &str, token_type_hint: Option<&str>) -> Result<(), TokenError> {
        let revoked = if token_type_hint == Some("refresh_token") {
            self.store.revoke_refresh_token(token).await?
                || self.store.revoke_access_token(token).await?
        } else {
            self.store.revoke_access_token(token).await?
                || self.store.revoke_refresh_token(token).await?
        };

        if revoked {
            debug!("revoked token");
        } else {
            debug!("revocation request for unknown token, treated as success");
        }
        Ok(())
    }

    /// Look up an access token for introspection; `None` for unknown,
    /// expired, or revoked tokens
    pub async fn introspect(&self, token: &str) -> Result<Option<AccessToken>, TokenError> {
        let Some(row) = self.store.access_token(token).await? else {
            return Ok(None);
        };
        if row.revoked || Utc::now() >= row.expires_at {
            return Ok(None);
        }
        Ok(Some(row))
    }

    async fn mint_pair(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: Vec<String>,
    ) -> Result<IssuedTokens, TokenError> {
        let access = self
            .mint_access_token(user_id, client_id, scopes.clone())
            .await?;
        let refresh = self.mint_refresh_token(user_id, client_id, scopes).await?;

        debug!(
            "issued token pair for user '{}' via client '{}' with {} scopes",
            user_id,
            client_id,
            access.scopes.len()
        );

        Ok(IssuedTokens {
            access_token: access.access_token,
            refresh_token: refresh,
            expires_in: self.access_token_ttl,
            scopes: access.scopes,
        })
    }

    async fn mint_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: Vec<String>,
    ) -> Result<AccessToken, TokenError> {
        let now = Utc::now();
        let row = AccessToken {
            id: Uuid::new_v4(),
            access_token: generate_secret(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            token_type: "Bearer".to_string(),
            scopes,
            expires_at: now + Duration::seconds(self.access_token_ttl as i64),
            revoked: false,
            created_at: now,
        };
        self.store.insert_access_token(&row).await?;
        Ok(row)
    }

    async fn mint_refresh_token(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: Vec<String>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let row = RefreshToken {
            id: Uuid::new_v4(),
            refresh_token: generate_secret(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes,
            expires_at: Some(now + Duration::seconds(self.refresh_token_ttl as i64)),
            revoked: false,
            created_at: now,
            last_used_at: None,
        };
        self.store.insert_refresh_token(&row).await?;
        Ok(row.refresh_token)
    }
}

/// Compute `BASE64URL(SHA256(code_verifier))` and compare it against the
/// stored challenge without short-circuiting on the first differing byte
pub fn verify_pkce(code_challenge: &str, code_verifier: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
    constant_time_eq(expected.as_bytes(), code_challenge.as_bytes())
}

/// Derive the S256 challenge for a verifier; used by the login flow tests
pub fn derive_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 256 bits of randomness, base64url-encoded without padding. Used for
/// authorization codes, tokens, and session ids alike.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex of a password, the shape stored in `users.password_hash`
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare a submitted password against a stored hash
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    constant_time_eq(hash_password(password).as_bytes(), password_hash.as_bytes())
}
