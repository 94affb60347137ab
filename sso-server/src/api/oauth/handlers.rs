//! OAuth 2.0 endpoint handlers

use crate::api::oauth::{
    models::{
        AuthorizeError, AuthorizeRequest, IntrospectionRequest, IntrospectionResponse,
        LoginRequest, OAuthError, RevocationRequest, Session, TokenRequest, TokenResponse,
    },
    token_service::{self, TokenError, TokenService},
};
use crate::cache::CacheBackend;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use crate::store::{OAuthClient, StoreBackend};
use axum::{
    extract::{Form, FromRequest, Query, Request, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use http::{
    header::{CONTENT_TYPE, LOCATION},
    StatusCode,
};
use log::{debug, error, info, warn};
use url::Url;

/// Name of the login session cookie
const SESSION_COOKIE: &str = "sso_session";

fn session_cache_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// OAuth 2.0 Authorization endpoint (RFC 6749 Section 4.1.1)
///
/// Validates the request, then either redirects an unauthenticated caller
/// to the login page (preserving every query parameter) or mints a
/// single-use authorization code and redirects back to the client.
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    params(
        ("response_type" = String, Query, description = "Must be 'code'"),
        ("client_id" = String, Query, description = "Client identifier"),
        ("redirect_uri" = String, Query, description = "Registered redirect URI"),
        ("scope" = Option<String>, Query, description = "Requested scopes (space-separated)"),
        ("state" = Option<String>, Query, description = "CSRF state, echoed back verbatim"),
        ("code_challenge" = String, Query, description = "PKCE code challenge"),
        ("code_challenge_method" = String, Query, description = "Must be 'S256'")
    ),
    responses(
        (status = 302, description = "Redirect to the login page or to redirect_uri with a code"),
        (status = 400, description = "Invalid request", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    info!(
        "authorization request from client_id: {}",
        request.client_id
    );

    let (client, scopes) = match validate_authorize(&state, &request).await {
        Ok(validated) => validated,
        Err(response) => return response,
    };

    let Some(session) = session_user(&state, &jar).await else {
        let login_url = format!(
            "{}?{}",
            state.config.oauth.login_path,
            preserved_query(&request)
        );
        debug!("unauthenticated caller, redirecting to {login_url}");
        return found(&login_url);
    };

    // Validation guarantees the challenge is present by now
    let code_challenge = request.code_challenge.as_deref().unwrap_or_default();
    let service = TokenService::new(state.store.clone(), &state.config.oauth);

    match service
        .issue_code(
            &session.user_id,
            &client,
            &request.redirect_uri,
            scopes,
            code_challenge,
        )
        .await
    {
        Ok(code) => {
            let mut url = match Url::parse(&request.redirect_uri) {
                Ok(url) => url,
                Err(_) => {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        OAuthError::invalid_request("Invalid redirect_uri"),
                    )
                }
            };
            url.query_pairs_mut().append_pair("code", &code);
            if let Some(state_param) = &request.state {
                url.query_pairs_mut().append_pair("state", state_param);
            }
            found(url.as_str())
        }
        Err(e) => {
            error!("failed to issue authorization code: {e}");
            redirect_with_error(
                &request.redirect_uri,
                AuthorizeError::server_error(
                    "Failed to issue authorization code",
                    request.state.clone(),
                ),
            )
        }
    }
}

/// Login page, carrying the preserved authorize parameters through hidden
/// form fields
pub async fn login_page(
    State(state): State<AppState>,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let form = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>IDEA on Action - Sign in</title>
    <style>
        body {{ font-family: sans-serif; max-width: 400px; margin: 50px auto; padding: 20px; }}
        .form-group {{ margin-bottom: 15px; }}
        label {{ display: block; margin-bottom: 5px; }}
        input {{ width: 100%; padding: 8px; border: 1px solid #ddd; border-radius: 4px; }}
        button {{ background: #1a73e8; color: white; padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; }}
        .scope-list {{ background: #f8f9fa; padding: 10px; border-radius: 4px; margin: 10px 0; }}
    </style>
</head>
<body>
    <h2>Sign in to continue</h2>
    <p>Application <strong>{client_id}</strong> is requesting access to your account.</p>

    <div class="scope-list">
        <strong>Requested scopes:</strong><br>
        {scope}
    </div>

    <form method="post" action="{login_path}">
        <input type="hidden" name="response_type" value="{response_type}">
        <input type="hidden" name="client_id" value="{client_id}">
        <input type="hidden" name="redirect_uri" value="{redirect_uri}">
        <input type="hidden" name="scope" value="{scope_raw}">
        <input type="hidden" name="state" value="{state}">
        <input type="hidden" name="code_challenge" value="{code_challenge}">
        <input type="hidden" name="code_challenge_method" value="{code_challenge_method}">

        <div class="form-group">
            <label for="username">Username:</label>
            <input type="text" id="username" name="username" required>
        </div>

        <div class="form-group">
            <label for="password">Password:</label>
            <input type="password" id="password" name="password" required>
        </div>

        <button type="submit" name="action" value="authorize">Sign in</button>
        <button type="submit" name="action" value="deny">Cancel</button>
    </form>
</body>
</html>"#,
        login_path = escape_attr(&state.config.oauth.login_path),
        response_type = escape_attr(&request.response_type),
        client_id = escape_attr(&request.client_id),
        redirect_uri = escape_attr(&request.redirect_uri),
        scope = escape_attr(request.scope.as_deref().unwrap_or("(all registered scopes)")),
        scope_raw = escape_attr(request.scope.as_deref().unwrap_or("")),
        state = escape_attr(request.state.as_deref().unwrap_or("")),
        code_challenge = escape_attr(request.code_challenge.as_deref().unwrap_or("")),
        code_challenge_method = escape_attr(request.code_challenge_method.as_deref().unwrap_or("")),
    );

    Html(form).into_response()
}

/// Processes the login form: verifies credentials, creates a cache-backed
/// session, and sends the browser back through `/oauth/authorize`
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(login): Form<LoginRequest>,
) -> Response {
    // Re-validate the preserved parameters; deny/failure redirects must
    // never target an unregistered URI either.
    let request = AuthorizeRequest {
        response_type: login.response_type.clone(),
        client_id: login.client_id.clone(),
        redirect_uri: login.redirect_uri.clone(),
        scope: login.scope.clone().filter(|s| !s.is_empty()),
        state: login.state.clone().filter(|s| !s.is_empty()),
        code_challenge: login.code_challenge.clone().filter(|s| !s.is_empty()),
        code_challenge_method: login.code_challenge_method.clone().filter(|s| !s.is_empty()),
    };
    if let Err(response) = validate_authorize(&state, &request).await {
        return response;
    }

    if login.action.as_deref() == Some("deny") {
        return redirect_with_error(
            &request.redirect_uri,
            AuthorizeError::access_denied("User denied authorization", request.state),
        );
    }

    if login.username.is_empty() || login.password.is_empty() {
        return redirect_with_error(
            &request.redirect_uri,
            AuthorizeError::invalid_request("Username and password are required", request.state),
        );
    }

    let user = match state.store.user_by_name(&login.username).await {
        Ok(user) => user,
        Err(e) => {
            error!("failed to load user '{}': {e}", login.username);
            return redirect_with_error(
                &request.redirect_uri,
                AuthorizeError::server_error("Authentication failed", request.state),
            );
        }
    };

    let Some(user) =
        user.filter(|u| token_service::verify_password(&login.password, &u.password_hash))
    else {
        warn!("failed login attempt for '{}'", login.username);
        return redirect_with_error(
            &request.redirect_uri,
            AuthorizeError::access_denied("Invalid username or password", request.state),
        );
    };

    let session_id = token_service::generate_secret();
    let session = Session {
        user_id: user.id.to_string(),
    };
    if let Err(e) = state
        .cache
        .set(&session_cache_key(&session_id), &session)
        .await
    {
        error!("failed to persist session: {e}");
        return redirect_with_error(
            &request.redirect_uri,
            AuthorizeError::server_error("Failed to create session", request.state),
        );
    }

    info!(
        "user '{}' logged in via client '{}'",
        user.username, request.client_id
    );

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .build();
    let authorize_url = format!("/oauth/authorize?{}", preserved_query(&request));
    (jar.add(cookie), found(&authorize_url)).into_response()
}

/// OAuth 2.0 Token endpoint (RFC 6749 Section 4.1.3 / 6)
#[utoipa::path(
    post,
    path = "/oauth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request or grant", body = OAuthError),
        (status = 401, description = "Invalid client credentials", body = OAuthError),
        (status = 500, description = "Internal server error", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn token(State(state): State<AppState>, Form(request): Form<TokenRequest>) -> Response {
    info!(
        "token request from client_id: {} with grant_type: {}",
        request.client_id, request.grant_type
    );

    if request.client_id.is_empty() || request.client_secret.is_empty() {
        warn!("missing client credentials in token request");
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("client_id and client_secret are required"),
        );
    }

    let client = match authenticate_client(&state, &request.client_id, &request.client_secret).await
    {
        Ok(client) => client,
        Err(response) => return response,
    };

    let service = TokenService::new(state.store.clone(), &state.config.oauth);

    match request.grant_type.as_str() {
        "authorization_code" => handle_authorization_code_grant(service, client, request).await,
        "refresh_token" => handle_refresh_token_grant(service, client, request).await,
        _ => {
            warn!(
                "unsupported grant type '{}' from client '{}'",
                request.grant_type, request.client_id
            );
            error_response(StatusCode::BAD_REQUEST, OAuthError::unsupported_grant_type())
        }
    }
}

async fn handle_authorization_code_grant(
    service: TokenService,
    client: OAuthClient,
    request: TokenRequest,
) -> Response {
    let (Some(code), Some(redirect_uri), Some(code_verifier)) =
        (&request.code, &request.redirect_uri, &request.code_verifier)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request(
                "code, redirect_uri, and code_verifier are required for the authorization_code grant",
            ),
        );
    };

    match service
        .exchange_code(code, &client, redirect_uri, code_verifier)
        .await
    {
        Ok(tokens) => {
            info!(
                "issued token pair to client '{}' with {} scopes",
                client.client_id,
                tokens.scopes.len()
            );
            token_response(tokens)
        }
        Err(e) => token_error_response(e),
    }
}

async fn handle_refresh_token_grant(
    service: TokenService,
    client: OAuthClient,
    request: TokenRequest,
) -> Response {
    let Some(refresh_token) = &request.refresh_token else {
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("refresh_token is required for the refresh_token grant"),
        );
    };

    match service.exchange_refresh(refresh_token, &client).await {
        Ok(tokens) => {
            info!("refreshed access token for client '{}'", client.client_id);
            token_response(tokens)
        }
        Err(e) => token_error_response(e),
    }
}

/// OAuth 2.0 Token Revocation endpoint (RFC 7009)
///
/// Idempotent: unknown and already-revoked tokens return 200 as well, so
/// the response never leaks whether a token existed.
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    request_body = RevocationRequest,
    responses(
        (status = 200, description = "Revocation processed"),
        (status = 401, description = "Invalid client credentials", body = OAuthError),
        (status = 500, description = "Internal server error", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn revoke(
    State(state): State<AppState>,
    Form(request): Form<RevocationRequest>,
) -> Response {
    if let Err(response) =
        authenticate_client(&state, &request.client_id, &request.client_secret).await
    {
        return response;
    }

    let service = TokenService::new(state.store.clone(), &state.config.oauth);
    match service
        .revoke(&request.token, request.token_type_hint.as_deref())
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("revocation failed: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                OAuthError::server_error("Revocation failed"),
            )
        }
    }
}

/// OAuth 2.0 Token Introspection endpoint (RFC 7662)
///
/// Accepts both form-encoded and JSON request bodies.
#[utoipa::path(
    post,
    path = "/oauth/introspect",
    request_body = IntrospectionRequest,
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Invalid request", body = OAuthError),
        (status = 500, description = "Internal server error", body = OAuthError)
    ),
    tag = OAUTH_TAG
)]
pub async fn introspect(
    State(state): State<AppState>,
    IntrospectionBody(request): IntrospectionBody,
) -> Response {
    if request.token.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("token parameter is required"),
        );
    }

    let service = TokenService::new(state.store.clone(), &state.config.oauth);
    match service.introspect(&request.token).await {
        Ok(Some(token)) => Json(IntrospectionResponse {
            active: true,
            client_id: Some(token.client_id),
            scope: Some(token.scopes.join(" ")),
            sub: Some(token.user_id),
            exp: Some(token.expires_at.timestamp()),
            iat: Some(token.created_at.timestamp()),
            iss: Some(state.config.oauth.issuer.clone()),
        })
        .into_response(),
        Ok(None) => Json(IntrospectionResponse::inactive()).into_response(),
        Err(e) => {
            error!("introspection failed: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                OAuthError::server_error("Failed to validate token"),
            )
        }
    }
}

/// Custom extractor that accepts form-encoded and JSON introspection bodies
pub struct IntrospectionBody(pub IntrospectionRequest);

impl<S> FromRequest<S> for IntrospectionBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            match Json::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Json(request)) => Ok(Self(request)),
                Err(_) => Err(error_response(
                    StatusCode::BAD_REQUEST,
                    OAuthError::invalid_request("Invalid JSON in request body"),
                )),
            }
        } else {
            match Form::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Form(request)) => Ok(Self(request)),
                Err(_) => Err(error_response(
                    StatusCode::BAD_REQUEST,
                    OAuthError::invalid_request("Invalid form data in request body"),
                )),
            }
        }
    }
}

/// Shared authorize-request validation, used by the authorize endpoint and
/// by the login flow before it redirects anywhere.
///
/// Ordering matters: the registered-redirect check runs before any
/// redirect-encoded error can be produced, so an unregistered URI is never
/// echoed into a Location header.
async fn validate_authorize(
    state: &AppState,
    request: &AuthorizeRequest,
) -> Result<(OAuthClient, Vec<String>), Response> {
    let client = match state.store.client_by_id(&request.client_id).await {
        Ok(client) => client,
        Err(e) => {
            error!("failed to load client '{}': {e}", request.client_id);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                OAuthError::server_error("Failed to load client registration"),
            ));
        }
    };

    let Some(client) = client.filter(|c| c.is_active) else {
        warn!("unknown or inactive client '{}'", request.client_id);
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_client("Unknown or inactive client_id"),
        ));
    };

    if !client
        .redirect_uris
        .iter()
        .any(|uri| uri == &request.redirect_uri)
    {
        warn!(
            "unregistered redirect_uri '{}' for client '{}'",
            request.redirect_uri, request.client_id
        );
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("redirect_uri is not registered for this client"),
        ));
    }

    if request.response_type != "code" {
        return Err(redirect_with_error(
            &request.redirect_uri,
            AuthorizeError::unsupported_response_type(request.state.clone()),
        ));
    }

    let scopes = match requested_scopes(&client, request.scope.as_deref()) {
        Ok(scopes) => scopes,
        Err(unknown) => {
            return Err(redirect_with_error(
                &request.redirect_uri,
                AuthorizeError::invalid_scope(
                    &format!("Scope '{unknown}' is not registered for this client"),
                    request.state.clone(),
                ),
            ));
        }
    };

    // No plaintext PKCE: S256 is the only accepted method
    match (
        request.code_challenge.as_deref(),
        request.code_challenge_method.as_deref(),
    ) {
        (Some(challenge), Some("S256")) if !challenge.is_empty() => {}
        _ => {
            return Err(redirect_with_error(
                &request.redirect_uri,
                AuthorizeError::invalid_request(
                    "code_challenge with code_challenge_method=S256 is required",
                    request.state.clone(),
                ),
            ));
        }
    }

    Ok((client, scopes))
}

/// Resolve the requested scopes against the client registration. An empty
/// request grants the full registered set.
fn requested_scopes(client: &OAuthClient, scope: Option<&str>) -> Result<Vec<String>, String> {
    let Some(scope) = scope.filter(|s| !s.trim().is_empty()) else {
        return Ok(client.scopes.clone());
    };

    let mut scopes = Vec::new();
    for requested in scope.split_whitespace() {
        if !client.scopes.iter().any(|s| s == requested) {
            return Err(requested.to_string());
        }
        scopes.push(requested.to_string());
    }
    Ok(scopes)
}

/// Authenticate a client at the token/revocation endpoints. The secret is
/// compared by direct equality against the stored value.
async fn authenticate_client(
    state: &AppState,
    client_id: &str,
    client_secret: &str,
) -> Result<OAuthClient, Response> {
    let client = match state.store.client_by_id(client_id).await {
        Ok(client) => client,
        Err(e) => {
            error!("failed to load client '{client_id}': {e}");
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                OAuthError::server_error("Failed to load client registration"),
            ));
        }
    };

    let Some(client) = client else {
        warn!("token request for unknown client '{client_id}'");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            OAuthError::invalid_client("Invalid client credentials"),
        ));
    };

    if client.client_secret != client_secret {
        warn!("invalid client secret for '{client_id}'");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            OAuthError::invalid_client("Invalid client credentials"),
        ));
    }

    if !client.is_active {
        warn!("deactivated client '{client_id}' attempted a token operation");
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::unauthorized_client("Client registration has been deactivated"),
        ));
    }

    Ok(client)
}

async fn session_user(state: &AppState, jar: &CookieJar) -> Option<Session> {
    let cookie = jar.get(SESSION_COOKIE)?;
    match state
        .cache
        .get::<Session>(&session_cache_key(cookie.value()))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("session lookup failed: {e}");
            None
        }
    }
}

fn token_response(tokens: token_service::IssuedTokens) -> Response {
    Json(TokenResponse {
        access_token: tokens.access_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens.expires_in,
        refresh_token: tokens.refresh_token,
        scope: tokens.scopes.join(" "),
    })
    .into_response()
}

fn token_error_response(error: TokenError) -> Response {
    let (status, body) = match &error {
        TokenError::CodeNotFound => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("Invalid, expired, or already used authorization code"),
        ),
        TokenError::ClientMismatch => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("Grant was not issued to this client"),
        ),
        TokenError::RedirectUriMismatch => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("redirect_uri does not match the authorization request"),
        ),
        TokenError::PkceMismatch => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("PKCE verification failed"),
        ),
        TokenError::RefreshNotFound => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("Invalid or expired refresh token"),
        ),
        TokenError::RefreshRevoked => (
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_grant("Refresh token has been revoked"),
        ),
        TokenError::Store(e) => {
            error!("token operation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                OAuthError::server_error("Token operation failed"),
            )
        }
    };
    error_response(status, body)
}

/// Rebuild the authorize query string, preserving every parameter
fn preserved_query(request: &AuthorizeRequest) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("response_type", &request.response_type);
    query.append_pair("client_id", &request.client_id);
    query.append_pair("redirect_uri", &request.redirect_uri);
    if let Some(scope) = &request.scope {
        query.append_pair("scope", scope);
    }
    if let Some(state) = &request.state {
        query.append_pair("state", state);
    }
    if let Some(challenge) = &request.code_challenge {
        query.append_pair("code_challenge", challenge);
    }
    if let Some(method) = &request.code_challenge_method {
        query.append_pair("code_challenge_method", method);
    }
    query.finish()
}

/// 302 Found redirect; the OAuth redirects are specified as 302, which
/// axum's `Redirect` (303/307/308) does not produce
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn error_response(status: StatusCode, error: OAuthError) -> Response {
    (status, Json(error)).into_response()
}

/// Redirect back to an already-validated redirect URI with error params
fn redirect_with_error(redirect_uri: &str, error: AuthorizeError) -> Response {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("error", &error.error)
                .append_pair(
                    "error_description",
                    error.error_description.as_deref().unwrap_or(""),
                );
            if let Some(state) = &error.state {
                url.query_pairs_mut().append_pair("state", state);
            }
            found(url.as_str())
        }
        Err(_) => error_response(
            StatusCode::BAD_REQUEST,
            OAuthError::invalid_request("Invalid redirect_uri"),
        ),
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use crate::api::oauth::models::{IntrospectionResponse, TokenResponse};
    use crate::api::oauth::token_service::derive_challenge;
    use crate::test_utils::{TestFixture, CALLBACK_URI, CLIENT_ID, CLIENT_SECRET};
    use http::StatusCode;
    use url::Url;

    // RFC 7636 Appendix B test vector
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

    fn authorize_uri() -> String {
        format!(
            "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={CALLBACK_URI}\
             &response_type=code&scope=profile&code_challenge={}\
             &code_challenge_method=S256&state=abc123",
            derive_challenge(VERIFIER)
        )
    }

    fn login_form() -> Vec<(&'static str, String)> {
        vec![
            ("username", "ada".to_string()),
            ("password", "wonderland".to_string()),
            ("action", "authorize".to_string()),
            ("response_type", "code".to_string()),
            ("client_id", CLIENT_ID.to_string()),
            ("redirect_uri", CALLBACK_URI.to_string()),
            ("scope", "profile".to_string()),
            ("state", "abc123".to_string()),
            ("code_challenge", derive_challenge(VERIFIER)),
            ("code_challenge_method", "S256".to_string()),
        ]
    }

    fn code_from_location(location: &str) -> String {
        let url = Url::parse(location).expect("Location should be a valid URL");
        url.query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .expect("Location should carry a code")
    }

    /// Drive the full browser flow and hand back an authorization code
    async fn login_and_get_code(fixture: &TestFixture) -> String {
        let response = fixture.post_form("/login", &login_form()).await;
        response.assert_status(StatusCode::FOUND);
        let cookie = response.session_cookie().expect("login should set a session cookie");
        let authorize_location = response.location().expect("login should redirect");

        let response = fixture
            .get_with_cookie(&authorize_location, &cookie)
            .await;
        response.assert_status(StatusCode::FOUND);
        code_from_location(&response.location().unwrap())
    }

    #[tokio::test]
    async fn test_authorize_unknown_client() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(&format!(
                "/oauth/authorize?client_id=nobody&redirect_uri={CALLBACK_URI}\
                 &response_type=code&code_challenge=x&code_challenge_method=S256"
            ))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_client");
        assert!(response.location().is_none());
    }

    #[tokio::test]
    async fn test_authorize_unregistered_redirect_is_not_followed() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(&format!(
                "/oauth/authorize?client_id={CLIENT_ID}\
                 &redirect_uri=https://evil.example/steal\
                 &response_type=code&code_challenge=x&code_challenge_method=S256"
            ))
            .await;

        // Rejected as JSON, never redirected to the attacker URI
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");
        assert!(response.location().is_none());
    }

    #[tokio::test]
    async fn test_authorize_rejects_plain_pkce() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(&format!(
                "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={CALLBACK_URI}\
                 &response_type=code&code_challenge={VERIFIER}&code_challenge_method=plain"
            ))
            .await;

        response.assert_status(StatusCode::FOUND);
        let location = response.location().unwrap();
        assert!(location.starts_with(CALLBACK_URI));
        assert!(location.contains("error=invalid_request"));
    }

    #[tokio::test]
    async fn test_authorize_unknown_scope() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(&format!(
                "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={CALLBACK_URI}\
                 &response_type=code&scope=admin:everything\
                 &code_challenge=x&code_challenge_method=S256&state=s1"
            ))
            .await;

        response.assert_status(StatusCode::FOUND);
        let location = response.location().unwrap();
        assert!(location.contains("error=invalid_scope"));
        assert!(location.contains("state=s1"));
    }

    #[tokio::test]
    async fn test_authorize_redirects_to_login_preserving_query() {
        let fixture = TestFixture::new().await;

        let response = fixture.get(&authorize_uri()).await;

        response.assert_status(StatusCode::FOUND);
        let location = response.location().unwrap();
        assert!(location.starts_with("/login?"));
        for param in [
            "response_type=code",
            &format!("client_id={CLIENT_ID}"),
            "scope=profile",
            "state=abc123",
            "code_challenge_method=S256",
        ] {
            assert!(location.contains(param), "missing {param} in {location}");
        }
    }

    #[tokio::test]
    async fn test_full_authorization_code_flow() {
        let fixture = TestFixture::new().await;

        // Unauthenticated: bounced to the login page
        let response = fixture.get(&authorize_uri()).await;
        response.assert_status(StatusCode::FOUND);
        assert!(response.location().unwrap().starts_with("/login?"));

        // Login: session cookie plus a redirect back into the authorize flow
        let response = fixture.post_form("/login", &login_form()).await;
        response.assert_status(StatusCode::FOUND);
        let cookie = response.session_cookie().unwrap();
        let authorize_location = response.location().unwrap();
        assert!(authorize_location.starts_with("/oauth/authorize?"));

        // Authenticated authorize: code delivered to the registered callback
        let response = fixture
            .get_with_cookie(&authorize_location, &cookie)
            .await;
        response.assert_status(StatusCode::FOUND);
        let location = response.location().unwrap();
        assert!(location.starts_with(CALLBACK_URI));
        assert!(location.contains("state=abc123"));
        let code = code_from_location(&location);

        // Exchange the code for a token pair
        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                    ("code", code),
                    ("redirect_uri", CALLBACK_URI.to_string()),
                    ("code_verifier", VERIFIER.to_string()),
                ],
            )
            .await;

        response.assert_status(StatusCode::OK);
        let tokens: TokenResponse = response.json_as();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 3600);
        assert_eq!(tokens.scope, "profile");
        assert!(!tokens.access_token.is_empty());
        assert!(!tokens.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn test_code_cannot_be_redeemed_twice() {
        let fixture = TestFixture::new().await;
        let code = login_and_get_code(&fixture).await;

        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("client_id", CLIENT_ID.to_string()),
            ("client_secret", CLIENT_SECRET.to_string()),
            ("code", code),
            ("redirect_uri", CALLBACK_URI.to_string()),
            ("code_verifier", VERIFIER.to_string()),
        ];

        let first = fixture.post_form("/oauth/token", &form).await;
        first.assert_status(StatusCode::OK);

        let second = fixture.post_form("/oauth/token", &form).await;
        second.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(second.json["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_token_rejects_wrong_verifier() {
        let fixture = TestFixture::new().await;
        let code = login_and_get_code(&fixture).await;

        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                    ("code", code),
                    ("redirect_uri", CALLBACK_URI.to_string()),
                    ("code_verifier", "not-the-right-verifier".to_string()),
                ],
            )
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_token_rejects_bad_client_secret() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", "wrong".to_string()),
                    ("code", "whatever".to_string()),
                    ("redirect_uri", CALLBACK_URI.to_string()),
                    ("code_verifier", VERIFIER.to_string()),
                ],
            )
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_token_unsupported_grant_type() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "password".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                ],
            )
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_refresh_grant_rotates_token() {
        let fixture = TestFixture::new().await;
        let code = login_and_get_code(&fixture).await;

        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                    ("code", code),
                    ("redirect_uri", CALLBACK_URI.to_string()),
                    ("code_verifier", VERIFIER.to_string()),
                ],
            )
            .await;
        let tokens: TokenResponse = response.json_as();

        let refresh_form = [
            ("grant_type", "refresh_token".to_string()),
            ("client_id", CLIENT_ID.to_string()),
            ("client_secret", CLIENT_SECRET.to_string()),
            ("refresh_token", tokens.refresh_token.clone()),
        ];

        let response = fixture.post_form("/oauth/token", &refresh_form).await;
        response.assert_status(StatusCode::OK);
        let refreshed: TokenResponse = response.json_as();
        assert_ne!(refreshed.access_token, tokens.access_token);
        assert_ne!(refreshed.refresh_token, tokens.refresh_token);
        assert_eq!(refreshed.scope, "profile");

        // The rotated-out refresh token is dead
        let response = fixture.post_form("/oauth/token", &refresh_form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_revocation_is_idempotent() {
        let fixture = TestFixture::new().await;

        // Unknown tokens revoke "successfully" - no information leak
        for _ in 0..2 {
            let response = fixture
                .post_form(
                    "/oauth/revoke",
                    &[
                        ("token", "no-such-token".to_string()),
                        ("client_id", CLIENT_ID.to_string()),
                        ("client_secret", CLIENT_SECRET.to_string()),
                    ],
                )
                .await;
            response.assert_status(StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_revoked_access_token_goes_inactive() {
        let fixture = TestFixture::new().await;
        let code = login_and_get_code(&fixture).await;

        let response = fixture
            .post_form(
                "/oauth/token",
                &[
                    ("grant_type", "authorization_code".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                    ("code", code),
                    ("redirect_uri", CALLBACK_URI.to_string()),
                    ("code_verifier", VERIFIER.to_string()),
                ],
            )
            .await;
        let tokens: TokenResponse = response.json_as();

        let response = fixture
            .post_form(
                "/oauth/introspect",
                &[("token", tokens.access_token.clone())],
            )
            .await;
        response.assert_status(StatusCode::OK);
        assert!(response.json_as::<IntrospectionResponse>().active);

        let response = fixture
            .post_form(
                "/oauth/revoke",
                &[
                    ("token", tokens.access_token.clone()),
                    ("token_type_hint", "access_token".to_string()),
                    ("client_id", CLIENT_ID.to_string()),
                    ("client_secret", CLIENT_SECRET.to_string()),
                ],
            )
            .await;
        response.assert_status(StatusCode::OK);

        // Revocation is authoritative before natural expiry
        let response = fixture
            .post_form(
                "/oauth/introspect",
                &[("token", tokens.access_token.clone())],
            )
            .await;
        response.assert_status(StatusCode::OK);
        let introspection: IntrospectionResponse = response.json_as();
        assert!(!introspection.active);
        assert!(introspection.client_id.is_none());
    }

    #[tokio::test]
    async fn test_introspect_accepts_json_body() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .post_json(
                "/oauth/introspect",
                &serde_json::json!({ "token": "unknown-token" }),
            )
            .await;

        response.assert_status(StatusCode::OK);
        assert!(!response.json_as::<IntrospectionResponse>().active);
    }

    #[tokio::test]
    async fn test_introspect_requires_token() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .post_form("/oauth/introspect", &[("token", String::new())])
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_login_deny_redirects_with_access_denied() {
        let fixture = TestFixture::new().await;

        let mut form = login_form();
        for field in form.iter_mut() {
            if field.0 == "action" {
                field.1 = "deny".to_string();
            }
        }

        let response = fixture.post_form("/login", &form).await;
        response.assert_status(StatusCode::FOUND);
        let location = response.location().unwrap();
        assert!(location.starts_with(CALLBACK_URI));
        assert!(location.contains("error=access_denied"));
        assert!(location.contains("state=abc123"));
    }

    #[tokio::test]
    async fn test_login_bad_password_is_denied() {
        let fixture = TestFixture::new().await;

        let mut form = login_form();
        for field in form.iter_mut() {
            if field.0 == "password" {
                field.1 = "guessing".to_string();
            }
        }

        let response = fixture.post_form("/login", &form).await;
        response.assert_status(StatusCode::FOUND);
        assert!(response.location().unwrap().contains("error=access_denied"));
        assert!(response.session_cookie().is_none());
    }

    #[tokio::test]
    async fn test_login_page_renders_form() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(&format!("/login?{}", authorize_uri().trim_start_matches("/oauth/authorize?")))
            .await;

        response.assert_status(StatusCode::OK);
    }
}
