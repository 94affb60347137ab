//! Client-side permission gating for the Minu service surfaces.
//!
//! A consumer wraps a protected piece of UI in a [`gate::ServiceGate`]. The
//! gate asks [`gate::ServicePermissions`] whether the current user may see
//! it; the resolver answers from a five-minute [`cache::PermissionCache`]
//! or, on a miss, from the platform's subscriptions read API via
//! [`client::SubscriptionsClient`]. Denials carry a specific reason and a
//! remediation path; transient failures stay strictly apart from denials
//! so callers can offer a retry instead of an upsell.
//!
//! Every cached decision can be dropped through the explicit invalidation
//! protocol (`invalidate_all` / `invalidate_service` /
//! `invalidate_subscription` / `invalidate_permission`), which entitlement
//! mutations must call to avoid serving stale grants past a downgrade.
//!
//! Resolutions are plain futures; dropping one (for example because the
//! consumer went away) abandons the fetch without touching shared state.

pub mod cache;
pub mod client;
pub mod decision;
pub mod gate;

pub use cache::{DecisionKey, PermissionCache};
pub use client::{
    ClientError, PermissionGrant, Service, Subscription, SubscriptionStatus, SubscriptionsClient,
};
pub use decision::{DenialReason, PermissionStatus, BASELINE_PERMISSION};
pub use gate::{GateError, GateState, GateView, Remediation, ServiceGate, ServicePermissions};
