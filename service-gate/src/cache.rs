//! Time-boxed cache of permission decisions with an explicit invalidation
//! protocol.
//!
//! The cache is an ordinary value passed to its consumers, not a module
//! singleton, so tests can build one, fill it, and observe exactly which
//! entries each invalidation drops.

use crate::decision::PermissionStatus;
use log::warn;
use moka::future::Cache as MokaCache;
use std::time::Duration;

/// Default decision TTL: five minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache key: one decision per `(service, required permission)` pair.
/// `permission: None` is the plain subscription-access decision.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DecisionKey {
    pub service_id: String,
    pub permission: Option<String>,
}

/// TTL'd decision cache over Moka with scoped invalidation
#[derive(Clone)]
pub struct PermissionCache {
    entries: MokaCache<DecisionKey, PermissionStatus>,
}

impl PermissionCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let entries = MokaCache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .support_invalidation_closures()
            .build();
        Self { entries }
    }

    /// A cache with the default five-minute TTL
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL, 10_000)
    }

    pub async fn get(&self, key: &DecisionKey) -> Option<PermissionStatus> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: DecisionKey, status: PermissionStatus) {
        self.entries.insert(key, status).await;
    }

    /// Wipe every cached decision. The next check per key goes back to the
    /// network.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Drop every decision for one service, across all permissions
    pub fn invalidate_service(&self, service_id: &str) {
        let service_id = service_id.to_string();
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |key, _| key.service_id == service_id)
        {
            warn!("failed to invalidate service entries: {e}");
        }
    }

    /// Drop decisions derived from subscription state. Every decision
    /// embeds the subscription, so this wipes the whole cache; scoping
    /// narrower would keep serving stale grants after a downgrade.
    pub fn invalidate_subscription(&self) {
        self.invalidate_all();
    }

    /// Drop every decision keyed on one required permission, across all
    /// services
    pub fn invalidate_permission(&self, permission: &str) {
        let permission = Some(permission.to_string());
        if let Err(e) = self
            .entries
            .invalidate_entries_if(move |key, _| key.permission == permission)
        {
            warn!("failed to invalidate permission entries: {e}");
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}
