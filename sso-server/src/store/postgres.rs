use super::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, StoreBackend, StoreError, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

/// Postgres-backed token store.
///
/// Every statement is parameterized; code consumption is a conditional
/// update whose affected-row count decides whether token issuance may
/// proceed, so two concurrent exchanges of the same code cannot both win.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to the database and apply pending migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn client_from_row(row: &PgRow) -> OAuthClient {
        OAuthClient {
            id: row.get("id"),
            client_id: row.get("client_id"),
            client_secret: row.get("client_secret"),
            name: row.get("name"),
            redirect_uris: row.get("redirect_uris"),
            scopes: row.get("scopes"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn code_from_row(row: &PgRow) -> AuthorizationCode {
        AuthorizationCode {
            id: row.get("id"),
            code: row.get("code"),
            client_id: row.get("client_id"),
            user_id: row.get("user_id"),
            scopes: row.get("scopes"),
            redirect_uri: row.get("redirect_uri"),
            code_challenge: row.get("code_challenge"),
            code_challenge_method: row.get("code_challenge_method"),
            expires_at: row.get("expires_at"),
            used_at: row.get("used_at"),
            created_at: row.get("created_at"),
        }
    }

    fn access_token_from_row(row: &PgRow) -> AccessToken {
        AccessToken {
            id: row.get("id"),
            access_token: row.get("access_token"),
            client_id: row.get("client_id"),
            user_id: row.get("user_id"),
            token_type: row.get("token_type"),
            scopes: row.get("scopes"),
            expires_at: row.get("expires_at"),
            revoked: row.get("revoked"),
            created_at: row.get("created_at"),
        }
    }

    fn refresh_token_from_row(row: &PgRow) -> RefreshToken {
        RefreshToken {
            id: row.get("id"),
            refresh_token: row.get("refresh_token"),
            client_id: row.get("client_id"),
            user_id: row.get("user_id"),
            scopes: row.get("scopes"),
            expires_at: row.get("expires_at"),
            revoked: row.get("revoked"),
            created_at: row.get("created_at"),
            last_used_at: row.get("last_used_at"),
        }
    }
}

#[async_trait]
impl StoreBackend for PostgresStore {
    async fn insert_client(&self, client: &OAuthClient) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO oauth_clients (
                id, client_id, client_secret, name, redirect_uris, scopes,
                is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(client.id)
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(&client.name)
        .bind(&client.redirect_uris)
        .bind(&client.scopes)
        .bind(client.is_active)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn client_by_id(&self, client_id: &str) -> Result<Option<OAuthClient>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, client_id, client_secret, name, redirect_uris, scopes,
                      is_active, created_at, updated_at
               FROM oauth_clients WHERE client_id = $1"#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::client_from_row))
    }

    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO authorization_codes (
                id, code, client_id, user_id, scopes, redirect_uri,
                code_challenge, code_challenge_method, expires_at, used_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(code.id)
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.scopes)
        .bind(&code.redirect_uri)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(code.expires_at)
        .bind(code.used_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_code(&self, code: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        // Zero affected rows means unknown or already consumed; RETURNING
        // hands the winner the row it just claimed.
        let row = sqlx::query(
            r#"UPDATE authorization_codes SET used_at = NOW()
               WHERE code = $1 AND used_at IS NULL
               RETURNING id, code, client_id, user_id, scopes, redirect_uri,
                         code_challenge, code_challenge_method, expires_at,
                         used_at, created_at"#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::code_from_row))
    }

    async fn insert_access_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO service_tokens (
                id, access_token, client_id, user_id, token_type, scopes,
                expires_at, revoked, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(token.id)
        .bind(&token.access_token)
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(&token.token_type)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn access_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, access_token, client_id, user_id, token_type, scopes,
                      expires_at, revoked, created_at
               FROM service_tokens WHERE access_token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::access_token_from_row))
    }

    async fn revoke_access_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE service_tokens SET revoked = TRUE WHERE access_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO refresh_tokens (
                id, refresh_token, client_id, user_id, scopes, expires_at,
                revoked, created_at, last_used_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(token.id)
        .bind(&token.refresh_token)
        .bind(&token.client_id)
        .bind(&token.user_id)
        .bind(&token.scopes)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.created_at)
        .bind(token.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, refresh_token, client_id, user_id, scopes, expires_at,
                      revoked, created_at, last_used_at
               FROM refresh_tokens WHERE refresh_token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::refresh_token_from_row))
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE refresh_token = $1")
                .bind(token)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_refresh_token(&self, token: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = $2 WHERE refresh_token = $1")
            .bind(token)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO users (id, username, password_hash, created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_by_name(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            password_hash: r.get("password_hash"),
            created_at: r.get("created_at"),
        }))
    }

    async fn health_check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| format!("Postgres health check failed: {err}"))
    }
}
