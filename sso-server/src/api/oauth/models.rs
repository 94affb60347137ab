//! OAuth 2.0 request/response structures and the wire-level error taxonomy

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// OAuth 2.0 Authorization Request (RFC 6749 Section 4.1.1), also used to
/// carry the preserved parameters through the login page
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Response type - must be "code"
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI where the authorization code will be sent
    pub redirect_uri: String,
    /// Requested scopes (space-separated); empty grants the client's full
    /// registered set
    pub scope: Option<String>,
    /// State parameter, echoed back verbatim for CSRF protection
    pub state: Option<String>,
    /// PKCE code challenge (required)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method - must be "S256"
    pub code_challenge_method: Option<String>,
}

/// OAuth 2.0 Token Request (RFC 6749 Section 4.1.3 / 6)
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// Grant type - "authorization_code" or "refresh_token"
    pub grant_type: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI, must match the authorization request
    /// (authorization_code grant)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (authorization_code grant)
    pub code_verifier: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// The access token string
    pub access_token: String,
    /// Token type - always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token usable at the token endpoint
    pub refresh_token: String,
    /// Granted scopes (space-separated)
    pub scope: String,
}

/// OAuth 2.0 Revocation Request (RFC 7009)
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevocationRequest {
    /// The token to revoke (access or refresh)
    pub token: String,
    /// Optional hint: "access_token" or "refresh_token"
    pub token_type_hint: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

/// OAuth 2.0 Token Introspection Request (RFC 7662)
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    /// The token to introspect
    pub token: String,
}

/// OAuth 2.0 Token Introspection Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    /// Whether the token is active
    pub active: bool,
    /// Client identifier the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Token scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Subject (user id) the token belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry timestamp (Unix time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at timestamp (Unix time)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Token issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl IntrospectionResponse {
    /// The RFC 7662 "not active" response: a lone `active: false`, with no
    /// hint at why
    pub fn inactive() -> Self {
        Self {
            active: false,
            client_id: None,
            scope: None,
            sub: None,
            exp: None,
            iat: None,
            iss: None,
        }
    }
}

/// Login form submission, carrying the preserved authorize parameters
/// through hidden fields
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// "authorize" or "deny"
    pub action: Option<String>,
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Login session stored in the cache, keyed by the session cookie value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

/// OAuth 2.0 Error Response (RFC 6749 Section 5.2)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthError {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthError {
    fn new(error: &str, description: &str) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }
    }

    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description)
    }

    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", description)
    }

    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description)
    }

    pub fn unauthorized_client(description: &str) -> Self {
        Self::new("unauthorized_client", description)
    }

    pub fn unsupported_grant_type() -> Self {
        Self::new(
            "unsupported_grant_type",
            "Supported grant types: authorization_code, refresh_token",
        )
    }

    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", description)
    }
}

/// Authorization endpoint error, redirect-encoded once the redirect target
/// has been validated
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizeError {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
    /// State parameter, echoed back when the request carried one
    pub state: Option<String>,
}

impl AuthorizeError {
    fn new(error: &str, description: &str, state: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
            state,
        }
    }

    pub fn invalid_request(description: &str, state: Option<String>) -> Self {
        Self::new("invalid_request", description, state)
    }

    pub fn unsupported_response_type(state: Option<String>) -> Self {
        Self::new(
            "unsupported_response_type",
            "Only the 'code' response type is supported",
            state,
        )
    }

    pub fn invalid_scope(description: &str, state: Option<String>) -> Self {
        Self::new("invalid_scope", description, state)
    }

    pub fn access_denied(description: &str, state: Option<String>) -> Self {
        Self::new("access_denied", description, state)
    }

    pub fn server_error(description: &str, state: Option<String>) -> Self {
        Self::new("server_error", description, state)
    }
}
