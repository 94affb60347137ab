//! HTTP client for the platform's subscriptions read API.
//!
//! The API is an external collaborator; this module only knows its three
//! read shapes. A 404 from any of them is data ("no such row"), not an
//! error.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors from the subscriptions API. All of them are transient from the
/// gate's point of view; none of them is an access decision.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0} from subscriptions API")]
    Status(reqwest::StatusCode),
    #[error("invalid request path: {0}")]
    Url(#[from] url::ParseError),
}

/// A service record. A missing record means the service is unavailable,
/// the highest-priority denial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub service_id: String,
    pub name: String,
    /// Plan the service asks subscribers to hold, surfaced in upgrade
    /// prompts
    pub required_plan: Option<String>,
}

/// Subscription lifecycle states as reported by the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Expired,
    PastDue,
    Canceled,
}

/// A subscription row for one `(user, service)` pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub plan: String,
}

/// An explicit permission grant. Elevated permissions are never inferred
/// from the plan name; they exist only as rows like this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionGrant {
    pub permission: String,
    pub granted: bool,
}

/// Read client for services, subscriptions, and permission grants
#[derive(Clone)]
pub struct SubscriptionsClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SubscriptionsClient {
    pub fn new(mut base_url: Url) -> Result<Self, ClientError> {
        // Url::join treats the last path segment as a file without this
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self { http, base_url })
    }

    /// Fetch a service record; `None` when the service does not exist
    pub async fn service(&self, service_id: &str) -> Result<Option<Service>, ClientError> {
        self.get_optional(&format!("services/{service_id}")).await
    }

    /// Fetch the subscription for a `(user, service)` pair; `None` when no
    /// subscription row exists
    pub async fn subscription(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> Result<Option<Subscription>, ClientError> {
        self.get_optional(&format!("subscriptions/{user_id}/{service_id}"))
            .await
    }

    /// Fetch an explicit permission grant; `None` when none was ever
    /// granted
    pub async fn permission(
        &self,
        user_id: &str,
        service_id: &str,
        permission: &str,
    ) -> Result<Option<PermissionGrant>, ClientError> {
        self.get_optional(&format!("permissions/{user_id}/{service_id}/{permission}"))
            .await
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let url = self.base_url.join(path)?;
        let response = self.http.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }

        Ok(Some(response.json::<T>().await?))
    }
}
