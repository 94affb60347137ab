//! The service gate: resolve a permission decision and dispatch to the
//! caller's views.
//!
//! The gate is explicit composition, not a wrapper macro: callers hand it
//! a [`GateView`] and get back whichever of the four renderings applies.
//! Construction is fail-fast; a resolver without a wired cache or client
//! is a wiring bug, and the builder panics rather than limping along.

use crate::cache::{DecisionKey, PermissionCache};
use crate::client::{ClientError, SubscriptionsClient};
use crate::decision::{self, DenialReason, PermissionStatus, BASELINE_PERMISSION};
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use thiserror::Error;

/// A transient failure while resolving a decision. Strictly distinct from
/// a denial: the caller should offer a retry, not an upsell.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("subscription service unreachable: {0}")]
    Client(#[from] ClientError),
}

/// The remediation a denial view should lead with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// No subscription: offer to subscribe
    Subscribe,
    /// Insufficient permission level: offer an upgrade
    Upgrade,
    /// Lapsed subscription: offer to renew
    Renew,
    /// Nothing the user can buy fixes a missing service
    ContactSupport,
}

impl Remediation {
    pub fn for_reason(reason: DenialReason) -> Self {
        match reason {
            DenialReason::ServiceUnavailable => Self::ContactSupport,
            DenialReason::SubscriptionRequired => Self::Subscribe,
            DenialReason::SubscriptionExpired => Self::Renew,
            DenialReason::InsufficientPlan => Self::Upgrade,
        }
    }
}

/// Outcome of a gate resolution
#[derive(Debug)]
pub enum GateState {
    Granted(PermissionStatus),
    Denied {
        status: PermissionStatus,
        reason: DenialReason,
        remediation: Remediation,
    },
    Failed(GateError),
}

/// Resolver for permission decisions: cache-aside over the subscriptions
/// API, one decision per `(service, permission)` key.
///
/// The cache and client are injected; the same cache instance must be
/// handed to whatever code mutates entitlements so its invalidation calls
/// hit the decisions gates actually read.
#[derive(Clone)]
pub struct ServicePermissions {
    client: SubscriptionsClient,
    cache: Arc<PermissionCache>,
    user_id: String,
}

impl ServicePermissions {
    pub fn builder() -> ServicePermissionsBuilder {
        ServicePermissionsBuilder::default()
    }

    /// Resolve the decision for a service and an optional required
    /// permission, consulting the cache first
    pub async fn check(
        &self,
        service_id: &str,
        required_permission: Option<&str>,
    ) -> Result<PermissionStatus, GateError> {
        let key = DecisionKey {
            service_id: service_id.to_string(),
            permission: required_permission.map(str::to_string),
        };

        if let Some(hit) = self.cache.get(&key).await {
            debug!("decision cache hit for {service_id}");
            return Ok(hit);
        }
        debug!("decision cache miss for {service_id}, fetching");

        let service = self.client.service(service_id).await?;

        // Later lookups are skipped once an earlier rule already denies
        let subscription = match &service {
            Some(_) => self.client.subscription(&self.user_id, service_id).await?,
            None => None,
        };

        let needs_grant_lookup = subscription.is_some()
            && matches!(required_permission, Some(p) if p != BASELINE_PERMISSION);
        let grant = if needs_grant_lookup {
            // required_permission is Some by the check above
            let permission = required_permission.unwrap_or_default();
            self.client
                .permission(&self.user_id, service_id, permission)
                .await?
        } else {
            None
        };

        let status = decision::evaluate(
            service.as_ref(),
            subscription.as_ref(),
            required_permission,
            grant.as_ref(),
            Utc::now(),
        );

        // Only authoritative decisions are cached; failures propagate and
        // the next check retries
        self.cache.insert(key, status.clone()).await;
        Ok(status)
    }

    /// The injected cache, for wiring invalidation into mutation paths
    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn invalidate_service(&self, service_id: &str) {
        self.cache.invalidate_service(service_id);
    }

    pub fn invalidate_subscription(&self) {
        self.cache.invalidate_subscription();
    }

    pub fn invalidate_permission(&self, permission: &str) {
        self.cache.invalidate_permission(permission);
    }
}

/// Builder for [`ServicePermissions`]. `build` panics on missing pieces;
/// a gate without its cache or client is mis-wired, not degraded.
#[derive(Default)]
pub struct ServicePermissionsBuilder {
    client: Option<SubscriptionsClient>,
    cache: Option<Arc<PermissionCache>>,
    user_id: Option<String>,
}

impl ServicePermissionsBuilder {
    pub fn client(mut self, client: SubscriptionsClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn cache(mut self, cache: Arc<PermissionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// # Panics
    ///
    /// Panics if the client, cache, or user id was never wired.
    pub fn build(self) -> ServicePermissions {
        ServicePermissions {
            client: self
                .client
                .expect("ServicePermissions built without a wired SubscriptionsClient"),
            cache: self
                .cache
                .expect("ServicePermissions built without a wired PermissionCache"),
            user_id: self
                .user_id
                .expect("ServicePermissions built without a user id"),
        }
    }
}

/// The four renderings a gated subtree can take. `loading` is what the
/// caller shows while the resolve future is pending.
pub trait GateView<R> {
    fn loading(&self) -> R;
    fn granted(&self, status: &PermissionStatus) -> R;
    fn denied(&self, status: &PermissionStatus, reason: DenialReason, remediation: Remediation)
        -> R;
    fn failed(&self, error: &GateError) -> R;
}

/// A gate around one protected subtree
pub struct ServiceGate<'a> {
    permissions: &'a ServicePermissions,
    service_id: String,
    required_permission: Option<String>,
}

impl<'a> ServiceGate<'a> {
    pub fn new(permissions: &'a ServicePermissions, service_id: impl Into<String>) -> Self {
        Self {
            permissions,
            service_id: service_id.into(),
            required_permission: None,
        }
    }

    /// Require an elevated permission on top of baseline access
    pub fn require(mut self, permission: impl Into<String>) -> Self {
        self.required_permission = Some(permission.into());
        self
    }

    /// Resolve the decision into a gate state
    pub async fn resolve(&self) -> GateState {
        match self
            .permissions
            .check(&self.service_id, self.required_permission.as_deref())
            .await
        {
            Ok(status) if status.is_granted() => GateState::Granted(status),
            Ok(status) => {
                // A non-granted decision always carries its reason
                let reason = status.reason.unwrap_or(DenialReason::ServiceUnavailable);
                GateState::Denied {
                    remediation: Remediation::for_reason(reason),
                    reason,
                    status,
                }
            }
            Err(error) => GateState::Failed(error),
        }
    }

    /// The pre-resolution rendering
    pub fn render_loading<R>(&self, view: &impl GateView<R>) -> R {
        view.loading()
    }

    /// Resolve and dispatch to the matching view callback
    pub async fn render<R>(&self, view: &impl GateView<R>) -> R {
        match self.resolve().await {
            GateState::Granted(status) => view.granted(&status),
            GateState::Denied {
                status,
                reason,
                remediation,
            } => view.denied(&status, reason, remediation),
            GateState::Failed(error) => view.failed(&error),
        }
    }
}
