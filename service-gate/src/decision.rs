//! The access decision: how a service record, a subscription row, and an
//! optional permission grant combine into granted or denied-with-reason.

use crate::client::{PermissionGrant, Service, Subscription, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The permission a live subscription grants without any explicit grant
/// row
pub const BASELINE_PERMISSION: &str = "read";

/// Why access was denied, in evaluation priority order. Earlier reasons
/// mask later ones: an expired subscription on a missing service reports
/// `ServiceUnavailable`, not `SubscriptionExpired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The service record itself is missing
    ServiceUnavailable,
    /// No subscription row exists for this user and service
    SubscriptionRequired,
    /// The subscription lapsed: period end in the past, or a terminal
    /// status
    SubscriptionExpired,
    /// Subscription is live but the granted permission level is below the
    /// required one
    InsufficientPlan,
}

/// A resolved permission decision, the shape cached and handed to gates
#[derive(Debug, Clone)]
pub struct PermissionStatus {
    /// Whether the subscription grants baseline access
    pub has_access: bool,
    /// Whether the required permission (baseline or elevated) is held
    pub has_permission: bool,
    /// Denial reason; `None` when granted
    pub reason: Option<DenialReason>,
    /// The subscription the decision was derived from, if any
    pub subscription: Option<Subscription>,
    /// Plan to surface in upgrade prompts
    pub required_plan: Option<String>,
    /// When this decision was fetched; cache TTL runs from here
    pub fetched_at: DateTime<Utc>,
}

impl PermissionStatus {
    /// A gate renders its children only when both checks hold
    pub fn is_granted(&self) -> bool {
        self.has_access && self.has_permission
    }
}

/// Whether a subscription currently grants baseline access
fn is_live(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    matches!(
        subscription.status,
        SubscriptionStatus::Active | SubscriptionStatus::Trial
    ) && subscription.current_period_end >= now
}

/// Combine the fetched rows into a decision.
///
/// The denial priority is fixed: missing service, then missing
/// subscription, then expired subscription, then insufficient permission.
/// A live subscription grants only [`BASELINE_PERMISSION`]; anything else
/// must arrive as an explicit grant.
pub(crate) fn evaluate(
    service: Option<&Service>,
    subscription: Option<&Subscription>,
    required_permission: Option<&str>,
    grant: Option<&PermissionGrant>,
    now: DateTime<Utc>,
) -> PermissionStatus {
    let required_plan = service.and_then(|s| s.required_plan.clone());

    let Some(_service) = service else {
        return PermissionStatus {
            has_access: false,
            has_permission: false,
            reason: Some(DenialReason::ServiceUnavailable),
            subscription: subscription.cloned(),
            required_plan: None,
            fetched_at: now,
        };
    };

    let Some(subscription) = subscription else {
        return PermissionStatus {
            has_access: false,
            has_permission: false,
            reason: Some(DenialReason::SubscriptionRequired),
            subscription: None,
            required_plan,
            fetched_at: now,
        };
    };

    if !is_live(subscription, now) {
        return PermissionStatus {
            has_access: false,
            has_permission: false,
            reason: Some(DenialReason::SubscriptionExpired),
            subscription: Some(subscription.clone()),
            required_plan,
            fetched_at: now,
        };
    }

    let has_permission = match required_permission {
        None => true,
        Some(BASELINE_PERMISSION) => true,
        Some(_) => grant.map(|g| g.granted).unwrap_or(false),
    };

    PermissionStatus {
        has_access: true,
        has_permission,
        reason: (!has_permission).then_some(DenialReason::InsufficientPlan),
        subscription: Some(subscription.clone()),
        required_plan,
        fetched_at: now,
    }
}
