use super::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, StoreBackend, StoreError, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local token store for development and tests.
///
/// All tables live behind one `RwLock`, so every conditional update runs
/// under the write lock and has the same atomicity as the Postgres
/// backend's `WHERE used_at IS NULL` updates. Revoked rows are kept, not
/// removed, matching the relational tombstone semantics.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    clients: HashMap<String, OAuthClient>,
    codes: HashMap<String, AuthorizationCode>,
    access_tokens: HashMap<String, AccessToken>,
    refresh_tokens: HashMap<String, RefreshToken>,
    users: HashMap<String, User>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn insert_client(&self, client: &OAuthClient) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn client_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables.clients.get(client_id).cloned())
    }

    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut tables = self.inner.write().await;
        match tables.codes.get_mut(code) {
            Some(row) if row.used_at.is_none() => {
                row.used_at = Some(Utc::now());
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables
            .access_tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables.access_tokens.get(token).cloned())
    }

    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError> {
        let mut tables = self.inner.write().await;
        match tables.access_tokens.get_mut(token) {
            Some(row) => {
                row.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables
            .refresh_tokens
            .insert(token.refresh_token.clone(), token.clone());
        Ok(())
    }

    async fn refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables.refresh_tokens.get(token).cloned())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let mut tables = self.inner.write().await;
        match tables.refresh_tokens.get_mut(token) {
            Some(row) => {
                row.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_refresh_token(&self, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        if let Some(row) = tables.refresh_tokens.get_mut(token) {
            row.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables.users.get(username).cloned())
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn test_code(code: &str) -> AuthorizationCode {
        AuthorizationCode {
            id: Uuid::new_v4(),
            code: code.to_string(),
            client_id: "client".to_string(),
            user_id: "user".to_string(),
            scopes: vec!["profile".to_string()],
            redirect_uri: "https://example.com/callback".to_string(),
            code_challenge: "challenge".to_string(),
            code_challenge_method: "S256".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
            used_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_consume_code_is_single_use() {
        let store = MemoryStore::new();
        store.insert_code(&test_code("abc")).await.unwrap();

        let first = store.consume_code("abc").await.unwrap();
        assert!(first.is_some());

        // Second redemption sees the used_at tombstone
        let second = store.consume_code("abc").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_consume_code_unknown() {
        let store = MemoryStore::new();
        assert!(store.consume_code("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consume_yields_one_winner() {
        let store = MemoryStore::new();
        store.insert_code(&test_code("race")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.consume_code("race").await },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_row_is_kept() {
        let store = MemoryStore::new();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            refresh_token: "rt".to_string(),
            client_id: "client".to_string(),
            user_id: "user".to_string(),
            scopes: vec!["profile".to_string()],
            expires_at: Some(Utc::now() + Duration::days(30)),
            revoked: false,
            created_at: Utc::now(),
            last_used_at: None,
        };
        store.insert_refresh_token(&token).await.unwrap();

        assert!(store.revoke_refresh_token("rt").await.unwrap());

        // Tombstoned, not deleted
        let row = store.refresh_token("rt").await.unwrap().unwrap();
        assert!(row.revoked);

        // Revoking again still reports a matching row
        assert!(store.revoke_refresh_token("rt").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_unknown_access_token() {
        let store = MemoryStore::new();
        assert!(!store.revoke_access_token("missing").await.unwrap());
    }
}
