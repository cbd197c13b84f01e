//! Durable storage for pending actions.
//!
//! [`PendingActionStore`] is a typed façade over one [`CacheProvider`]
//! instance. It owns the TTL policy, the `user_actions` secondary index,
//! and the defensive local-clock expiry check layered on top of the
//! cache's own TTL.
//!
//! The store has no opinion about confirmation semantics: claim ordering,
//! ownership checks, and executor handling live in
//! [`ConfirmationService`](crate::service::ConfirmationService).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::action::{generate_action_id, ActionType, PendingAction, RiskLevel};
use crate::cache::CacheProvider;
use crate::constants::{DEFAULT_ACTION_TTL_SECS, USER_ACTIONS_INDEX};
use crate::error::ConfirmError;

/// Inputs for storing a new pending action.
///
/// `action_id`, `created_at`, and `expires_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAction {
    /// The principal preparing the action.
    pub user_id: String,
    /// Optional session tag for filtered listing.
    pub session_id: Option<String>,
    /// Integration tag (`jira`, `email`, ...).
    pub integration: String,
    /// Tool tag (`create_jira_issue`, ...).
    pub tool_name: String,
    /// Advisory mutation classification.
    pub action_type: ActionType,
    /// Advisory risk classification.
    pub risk_level: RiskLevel,
    /// The executor's inputs.
    pub parameters: Map<String, Value>,
}

/// Snapshot of store configuration, for monitoring and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// The cache namespace backing the store.
    pub namespace: String,
    /// Configured action TTL in seconds.
    pub ttl_seconds: u64,
}

/// Cache-backed store for actions awaiting user confirmation.
///
/// Integration-agnostic and TTL-owning: every record is written with the
/// configured TTL, the cache expires it autonomously, and reads apply a
/// defensive local-clock check on top (deleting on the spot when it fires
/// first).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use confirm_core::cache::InMemoryCache;
/// use confirm_core::store::PendingActionStore;
///
/// let cache = Arc::new(InMemoryCache::new("confirmation"));
/// let store = PendingActionStore::new(cache).with_ttl(Duration::from_secs(300));
/// assert_eq!(store.ttl(), Duration::from_secs(300));
/// ```
#[derive(Clone)]
pub struct PendingActionStore {
    cache: Arc<dyn CacheProvider>,
    ttl: Duration,
}

impl std::fmt::Debug for PendingActionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingActionStore")
            .field("namespace", &self.cache.namespace())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl PendingActionStore {
    /// Creates a store over the given cache with the default 10-minute TTL.
    pub fn new(cache: Arc<dyn CacheProvider>) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(DEFAULT_ACTION_TTL_SECS),
        }
    }

    /// Sets the pending-action TTL (builder pattern).
    ///
    /// Durations under one second are rounded up: the cache layer works in
    /// whole seconds.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The configured pending-action TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    /// Stores a new pending action and returns the full record.
    ///
    /// The record is written with the configured TTL and indexed under
    /// `user_actions:<user_id>`.
    ///
    /// # Errors
    ///
    /// [`ConfirmError::CacheUnavailable`] when the cache refused the write.
    pub async fn store(&self, new_action: NewAction) -> Result<PendingAction, ConfirmError> {
        let now = Utc::now();
        let ttl_secs = self.ttl_secs();
        let expires_at = now + chrono::Duration::seconds(ttl_secs as i64);

        let action = PendingAction {
            action_id: generate_action_id(),
            user_id: new_action.user_id,
            session_id: new_action.session_id,
            integration: new_action.integration,
            tool_name: new_action.tool_name,
            action_type: new_action.action_type,
            risk_level: new_action.risk_level,
            parameters: new_action.parameters,
            created_at: now,
            expires_at,
        };

        let value = serde_json::to_value(&action).map_err(|err| {
            tracing::warn!(action_id = %action.action_id, error = %err, "failed to serialize action");
            ConfirmError::CacheUnavailable { operation: "store" }
        })?;

        let stored = self
            .cache
            .set(
                &action.action_id,
                &value,
                Some(ttl_secs),
                &[(USER_ACTIONS_INDEX, action.user_id.as_str())],
            )
            .await;
        if !stored {
            return Err(ConfirmError::CacheUnavailable { operation: "store" });
        }

        tracing::info!(
            action_id = %action.action_id,
            user_id = %action.user_id,
            tool_name = %action.tool_name,
            risk_level = %action.risk_level,
            "stored pending action"
        );
        Ok(action)
    }

    /// Retrieves a pending action by id.
    ///
    /// Returns `None` when the key is missing, the cache TTL already
    /// fired, or the local clock says the record is expired (in which
    /// case the record is deleted defensively).
    pub async fn get(&self, action_id: &str) -> Option<PendingAction> {
        let value = self.cache.get(action_id).await?;
        let action: PendingAction = match serde_json::from_value(value) {
            Ok(action) => action,
            Err(err) => {
                tracing::warn!(action_id, error = %err, "undecodable pending action");
                return None;
            },
        };

        if action.is_expired() {
            tracing::warn!(action_id, "pending action expired");
            // The cache TTL should have fired already; delete to be safe.
            self.delete_record(&action).await;
            return None;
        }

        Some(action)
    }

    /// Deletes a pending action, returning `true` iff the key existed.
    ///
    /// Index cleanup is deferred to stale-tolerant reads: the `user_actions`
    /// member lapses with the set's TTL or is purged on the next indexed
    /// read.
    pub async fn delete(&self, action_id: &str) -> bool {
        let deleted = self.cache.delete(action_id, &[]).await;
        if deleted {
            tracing::info!(action_id, "deleted pending action");
        } else {
            tracing::warn!(action_id, "attempted to delete non-existent action");
        }
        deleted
    }

    /// Deletes a record we have in hand, cleaning its index entry too.
    async fn delete_record(&self, action: &PendingAction) {
        self.cache
            .delete(
                &action.action_id,
                &[(USER_ACTIONS_INDEX, action.user_id.as_str())],
            )
            .await;
    }

    /// Returns every live pending action owned by `user_id`, optionally
    /// filtered to one session.
    ///
    /// Expired records found through the index are skipped and deleted
    /// best-effort.
    pub async fn get_by_user(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Vec<PendingAction> {
        let values = self.cache.get_by_index(USER_ACTIONS_INDEX, user_id).await;

        let mut actions = Vec::with_capacity(values.len());
        for value in values {
            let action: PendingAction = match serde_json::from_value(value) {
                Ok(action) => action,
                Err(err) => {
                    tracing::warn!(user_id, error = %err, "undecodable pending action in index");
                    continue;
                },
            };
            if action.is_expired() {
                self.delete_record(&action).await;
                continue;
            }
            if let Some(wanted) = session_id {
                if action.session_id.as_deref() != Some(wanted) {
                    continue;
                }
            }
            actions.push(action);
        }
        actions
    }

    /// Forces a cleanup pass for expired actions.
    ///
    /// The cache TTL owns expiration; both providers clean up on their own
    /// (Redis natively, the in-memory provider lazily on read), so this is
    /// a no-op reporting zero. Kept for operational symmetry with stores
    /// that need scheduled sweeps.
    pub async fn cleanup_expired(&self) -> usize {
        tracing::debug!("cleanup requested; cache TTL handles expiration");
        0
    }

    /// Removes every pending action in the namespace. Primarily for tests
    /// and operational resets.
    pub async fn clear_all(&self) -> usize {
        let removed = self.cache.clear_namespace().await;
        tracing::warn!(removed, "cleared all pending actions");
        removed
    }

    /// Store configuration snapshot for monitoring.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            namespace: self.cache.namespace().to_string(),
            ttl_seconds: self.ttl_secs(),
        }
    }
}
