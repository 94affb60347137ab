use crate::cache::{memory::InMemoryCache, Cache};
use crate::config::SsoConfig;
use crate::create_app;
use crate::state::AppState;
use crate::store::{memory::MemoryStore, OAuthClient, StoreBackend, TokenStore, User};
use axum::body::Body;
use axum::Router;
use chrono::Utc;
use http::header::{LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Client seeded into every test fixture
pub const CLIENT_ID: &str = "minu-find-local";
pub const CLIENT_SECRET: &str = "local-secret";
pub const CALLBACK_URI: &str = "http://localhost:3001/auth/callback";

/// Test fixture wiring the full application against in-memory backends.
///
/// The fixture seeds one OAuth client (`minu-find-local`) and one user
/// (`ada` / `wonderland`), so tests can drive the complete
/// authorize-login-exchange flow without touching the network.
pub struct TestFixture {
    pub app: Router,
    pub state: AppState,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let config = SsoConfig::default();
        let cache = Cache::InMemory(InMemoryCache::new(
            config.cache.ttl,
            config.cache.memory.capacity,
        ));
        let store = TokenStore::Memory(MemoryStore::new());
        Self::seed(&store).await;

        let state = AppState::new(config, cache, store);
        let app = create_app(state.clone()).await;

        Self { app, state }
    }

    async fn seed(store: &TokenStore) {
        let now = Utc::now();
        store
            .insert_client(&OAuthClient {
                id: Uuid::new_v4(),
                client_id: CLIENT_ID.to_string(),
                client_secret: CLIENT_SECRET.to_string(),
                name: "Minu Find (local)".to_string(),
                redirect_uris: vec![CALLBACK_URI.to_string()],
                scopes: vec!["profile".to_string(), "find:market:read".to_string()],
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("Failed to seed client");

        store
            .insert_user(&User {
                id: Uuid::new_v4(),
                username: "ada".to_string(),
                password_hash: crate::api::oauth::token_service::hash_password("wonderland"),
                created_at: now,
            })
            .await
            .expect("Failed to seed user");
    }

    /// Sends a GET request
    pub async fn get(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a GET request carrying a session cookie
    pub async fn get_with_cookie(&self, uri: &str, cookie: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("Cookie", cookie)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a form-encoded POST, the shape every OAuth endpoint consumes
    pub async fn post_form(&self, uri: &str, fields: &[(&str, String)]) -> TestResponse {
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            body.append_pair(key, value);
        }

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(body.finish()))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a JSON POST (the introspection endpoint accepts both shapes)
    pub async fn post_json<T: Serialize>(&self, uri: &str, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

/// Response from a test request with convenient access to the pieces the
/// OAuth flow tests care about: status, redirect target, session cookie,
/// and the JSON body
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    /// Asserts the response status, printing the body on mismatch
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// The Location header, if the response is a redirect
    pub fn location(&self) -> Option<String> {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// The `name=value` pair of the session cookie set by the response
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }

    /// Deserializes the response body into the given type
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
