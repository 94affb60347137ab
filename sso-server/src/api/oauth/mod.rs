pub(crate) mod handlers;
pub(crate) mod models;
pub(crate) mod token_service;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Combines the OAuth 2.0 routes into a single router. The login page is
/// mounted separately because its path comes from configuration.
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/authorize", get(handlers::authorize))
        .route("/oauth/token", post(handlers::token))
        .route("/oauth/revoke", post(handlers::revoke))
        .route("/oauth/introspect", post(handlers::introspect))
}
