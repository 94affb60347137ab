pub(crate) mod health;
pub(crate) mod oauth;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(oauth::router())
        // The login page path is configurable, so it is mounted here
        // rather than inside the oauth router
        .route(
            &state.config.oauth.login_path,
            get(oauth::handlers::login_page).post(oauth::handlers::login_submit),
        )
}
