use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0 API";

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "Authorization, token, revocation, and introspection endpoints"),
    ),
    info(
        title = "IDEA on Action SSO",
        description = "OAuth 2.0 single-sign-on service for the Minu product surfaces",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;
