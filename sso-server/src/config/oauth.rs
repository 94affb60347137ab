//! OAuth 2.0 configuration

use confique::Config;

/// OAuth 2.0 configuration
#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// Issuer identifier stamped into introspection responses
    /// (default: "idea-sso")
    #[config(env = "SSO_OAUTH_ISSUER", default = "idea-sso")]
    pub issuer: String,

    /// Access token TTL in seconds (default: 3600 = 1 hour)
    #[config(env = "SSO_OAUTH_ACCESS_TOKEN_TTL", default = 3600)]
    pub access_token_ttl: u64,

    /// Refresh token TTL in seconds (default: 2592000 = 30 days)
    #[config(env = "SSO_OAUTH_REFRESH_TOKEN_TTL", default = 2592000)]
    pub refresh_token_ttl: u64,

    /// Authorization code TTL in seconds (default: 600 = 10 minutes)
    #[config(env = "SSO_OAUTH_CODE_TTL", default = 600)]
    pub code_ttl: u64,

    /// Rotate refresh tokens on every refresh_token grant. The presented
    /// token is tombstoned and a replacement issued in the same exchange.
    #[config(env = "SSO_OAUTH_ROTATE_REFRESH_TOKENS", default = true)]
    pub rotate_refresh_tokens: bool,

    /// Path of the hosted login page (default: "/login")
    #[config(env = "SSO_OAUTH_LOGIN_PATH", default = "/login")]
    pub login_path: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            issuer: "idea-sso".to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: 2_592_000,
            code_ttl: 600,
            rotate_refresh_tokens: true,
            login_path: "/login".to_string(),
        }
    }
}
