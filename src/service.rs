//! The confirmation state machine: prepare, confirm, cancel, list.
//!
//! [`ConfirmationService`] orchestrates the lifecycle of a pending action:
//!
//! ```text
//!           prepare_action
//!   (none) ───────────────▶ PENDING
//!                           │
//!                 ┌─────────┼─────────┐
//!                 │         │         │
//!        confirm_action  cancel_action  TTL expiry
//!                 │         │         │
//!                 ▼         ▼         ▼
//!            EXECUTED   CANCELLED   EXPIRED
//! ```
//!
//! The three terminal transitions are mutually exclusive. Within one
//! process that is enforced by the executor-map *claim*: a compare-and-
//! remove on a mutex-protected map, performed before the store delete.
//! Whichever of confirm/cancel claims the executor wins; the loser sees
//! [`ConfirmError::InvalidAction`].
//!
//! # Executors
//!
//! The executor closure captures arbitrary code, connections, and secrets,
//! so it is never persisted. It lives in a process-local map keyed by
//! `action_id` for the lifetime of the server process. Consequently, in a
//! multi-replica deployment `confirm_action`/`cancel_action` must be
//! routed to the replica that handled `prepare_action`; routing is the
//! embedding service's concern.
//!
//! No store key or lock is held across the executor invocation: once the
//! executor starts it runs to completion (or its own internal timeout).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::{PendingAction, RiskLevel};
use crate::catalog::classify_tool;
use crate::error::{ConfirmError, ExecutorError};
use crate::preview::PreviewFormatterRegistry;
use crate::store::{NewAction, PendingActionStore};

/// The future an executor produces when invoked.
pub type ExecutorFuture = BoxFuture<'static, Result<Value, ExecutorError>>;

/// A zero-argument closure performing the mutating operation on confirm.
///
/// Captured at prepare time, held in-process only, invoked at most once.
pub type Executor = Box<dyn FnOnce() -> ExecutorFuture + Send>;

/// Boxes a plain async closure into an [`Executor`].
///
/// # Examples
///
/// ```
/// use confirm_core::service::boxed_executor;
/// use serde_json::json;
///
/// let executor = boxed_executor(|| async { Ok(json!({"issue": "PROJ-1"})) });
/// # let _ = executor;
/// ```
pub fn boxed_executor<F, Fut>(f: F) -> Executor
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, ExecutorError>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Inputs for [`ConfirmationService::prepare_action`].
///
/// `risk_level` arrives as a string from the agent runtime and is
/// validated during prepare; `integration` and `action_type` are derived
/// from `tool_name`, not supplied.
#[derive(Debug, Clone)]
pub struct PrepareActionRequest {
    /// The principal requesting the action.
    pub user_id: String,
    /// Optional session tag for grouping related actions.
    pub session_id: Option<String>,
    /// The tool to execute on confirm (`create_jira_issue`, ...).
    pub tool_name: String,
    /// Arguments for the tool.
    pub tool_args: Map<String, Value>,
    /// `low`, `medium`, or `high`.
    pub risk_level: String,
}

/// Outcome of a successful prepare.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedAction {
    /// Unique id to pass to confirm or cancel.
    pub action_id: String,
    /// Human-readable Markdown preview of the proposed action.
    pub preview: String,
    /// When the action lapses if neither confirmed nor cancelled.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a successful confirm: the executor ran.
#[derive(Debug, Serialize)]
pub struct ConfirmedAction {
    /// The confirmed action's id.
    pub action_id: String,
    /// The executor's return value.
    pub result: Value,
    /// When execution finished.
    pub executed_at: DateTime<Utc>,
}

/// Outcome of a successful cancel: the executor was discarded unrun.
#[derive(Debug, Clone, Serialize)]
pub struct CancelledAction {
    /// The cancelled action's id.
    pub action_id: String,
    /// When the cancellation took effect.
    pub cancelled_at: DateTime<Utc>,
}

/// One pending action as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct PendingActionSummary {
    /// The action's id.
    pub action_id: String,
    /// The tool to execute on confirm.
    pub tool_name: String,
    /// The integration the tool belongs to.
    pub integration: String,
    /// Advisory risk classification.
    pub risk_level: RiskLevel,
    /// Human-readable Markdown preview.
    pub preview: String,
    /// When the action was prepared.
    pub created_at: DateTime<Utc>,
    /// When the action lapses.
    pub expires_at: DateTime<Utc>,
}

/// Renders a successful outcome as the tagged `{status: "success", ...}`
/// record the agent runtime expects.
///
/// # Examples
///
/// ```
/// use confirm_core::service::{success_payload, CancelledAction};
/// use chrono::Utc;
///
/// let outcome = CancelledAction {
///     action_id: "action_9f3ab2c104d7".to_string(),
///     cancelled_at: Utc::now(),
/// };
/// let json = success_payload(&outcome);
/// assert_eq!(json["status"], "success");
/// assert_eq!(json["action_id"], "action_9f3ab2c104d7");
/// ```
pub fn success_payload<T: Serialize>(outcome: &T) -> Value {
    let mut value =
        serde_json::to_value(outcome).unwrap_or_else(|_| Value::Object(Map::new()));
    if let Value::Object(map) = &mut value {
        map.insert("status".to_string(), Value::String("success".to_string()));
    }
    value
}

/// Orchestrates the two-phase confirmation lifecycle.
///
/// Dependencies are explicit: construct with a [`PendingActionStore`] and
/// a [`PreviewFormatterRegistry`] rather than relying on globals, so tests
/// and multi-tenant embeddings can each hold their own instance.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use confirm_core::cache::InMemoryCache;
/// use confirm_core::preview::default_registry;
/// use confirm_core::service::ConfirmationService;
/// use confirm_core::store::PendingActionStore;
///
/// let store = PendingActionStore::new(Arc::new(InMemoryCache::new("confirmation")));
/// let service = ConfirmationService::new(store, default_registry());
/// # let _ = service;
/// ```
pub struct ConfirmationService {
    store: PendingActionStore,
    registry: PreviewFormatterRegistry,
    executors: Mutex<HashMap<String, Executor>>,
}

impl fmt::Debug for ConfirmationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationService")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("held_executors", &self.executors.lock().len())
            .finish()
    }
}

impl ConfirmationService {
    /// Creates a service over the given store and formatter registry.
    pub fn new(store: PendingActionStore, registry: PreviewFormatterRegistry) -> Self {
        Self {
            store,
            registry,
            executors: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store, for embedders that need direct access.
    pub fn store(&self) -> &PendingActionStore {
        &self.store
    }

    /// Captures a proposed action as a pending action and renders its
    /// preview.
    ///
    /// The executor is registered in the process-local map under the new
    /// action id and will be invoked exactly once if (and only if) the
    /// action is later confirmed.
    ///
    /// # Errors
    ///
    /// - [`ConfirmError::Validation`] for an empty `user_id` or
    ///   `tool_name`, or a `risk_level` outside `low`/`medium`/`high`.
    /// - [`ConfirmError::CacheUnavailable`] when the store write failed.
    pub async fn prepare_action(
        &self,
        request: PrepareActionRequest,
        executor: Executor,
    ) -> Result<PreparedAction, ConfirmError> {
        if request.user_id.trim().is_empty() {
            return Err(ConfirmError::Validation {
                field: "user_id",
                message: "must not be empty".to_string(),
            });
        }
        if request.tool_name.trim().is_empty() {
            return Err(ConfirmError::Validation {
                field: "tool_name",
                message: "must not be empty".to_string(),
            });
        }
        let risk_level: RiskLevel = request.risk_level.parse()?;
        let (integration, action_type) = classify_tool(&request.tool_name);

        let action = self
            .store
            .store(NewAction {
                user_id: request.user_id,
                session_id: request.session_id,
                integration: integration.to_string(),
                tool_name: request.tool_name,
                action_type,
                risk_level,
                parameters: request.tool_args,
            })
            .await?;

        self.executors
            .lock()
            .insert(action.action_id.clone(), executor);

        let preview = self
            .registry
            .format(&action.integration, &action.tool_name, &action.parameters);

        tracing::info!(
            action_id = %action.action_id,
            user_id = %action.user_id,
            tool_name = %action.tool_name,
            integration = %action.integration,
            risk_level = %action.risk_level,
            "prepared action"
        );

        Ok(PreparedAction {
            action_id: action.action_id,
            preview,
            expires_at: action.expires_at,
        })
    }

    /// Confirms a pending action and invokes its executor.
    ///
    /// Order of operations: load, ownership check, executor claim, store
    /// delete, execute. The claim is the at-most-once source of truth; a
    /// failed store delete is logged and does not abort execution.
    ///
    /// # Errors
    ///
    /// - [`ConfirmError::InvalidAction`] when the action is missing,
    ///   expired, or already confirmed/cancelled.
    /// - [`ConfirmError::PermissionDenied`] when `user_id` is not the
    ///   preparer. The action remains pending.
    /// - [`ConfirmError::ExecutionFailed`] when the executor raised; the
    ///   action is consumed regardless.
    pub async fn confirm_action(
        &self,
        action_id: &str,
        user_id: &str,
    ) -> Result<ConfirmedAction, ConfirmError> {
        let action = self.load_owned(action_id, user_id, "confirm").await?;
        let executor = self.claim_executor(action_id)?;

        if !self.store.delete(action_id).await {
            tracing::warn!(action_id, "store delete failed after executor claim");
        }

        let result = executor().await.map_err(|source| {
            tracing::error!(
                action_id,
                user_id,
                tool_name = %action.tool_name,
                error = %source,
                "executor failed"
            );
            ConfirmError::ExecutionFailed {
                action_id: action_id.to_string(),
                source,
            }
        })?;

        let executed_at = Utc::now();
        tracing::info!(
            action_id,
            user_id,
            tool_name = %action.tool_name,
            "confirmed and executed action"
        );
        Ok(ConfirmedAction {
            action_id: action_id.to_string(),
            result,
            executed_at,
        })
    }

    /// Cancels a pending action without invoking its executor.
    ///
    /// Same load/ownership/claim sequence as confirm; the claimed executor
    /// is dropped unrun. A repeated cancel reports
    /// [`ConfirmError::InvalidAction`].
    ///
    /// # Errors
    ///
    /// - [`ConfirmError::InvalidAction`] when the action is missing,
    ///   expired, or already processed.
    /// - [`ConfirmError::PermissionDenied`] when `user_id` is not the
    ///   preparer.
    pub async fn cancel_action(
        &self,
        action_id: &str,
        user_id: &str,
    ) -> Result<CancelledAction, ConfirmError> {
        self.load_owned(action_id, user_id, "cancel").await?;
        let executor = self.claim_executor(action_id)?;
        drop(executor);

        if !self.store.delete(action_id).await {
            tracing::warn!(action_id, "store delete failed after executor claim");
        }

        let cancelled_at = Utc::now();
        tracing::info!(action_id, user_id, "cancelled action");
        Ok(CancelledAction {
            action_id: action_id.to_string(),
            cancelled_at,
        })
    }

    /// Lists every live pending action owned by `user_id`, optionally
    /// filtered to one session. Previews are re-derived through the
    /// registry.
    ///
    /// The listing is a snapshot with no isolation guarantee against
    /// concurrent prepare/confirm/cancel.
    ///
    /// # Errors
    ///
    /// [`ConfirmError::Validation`] for an empty `user_id`.
    pub async fn list_pending_actions(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<Vec<PendingActionSummary>, ConfirmError> {
        if user_id.trim().is_empty() {
            return Err(ConfirmError::Validation {
                field: "user_id",
                message: "must not be empty".to_string(),
            });
        }
        let actions = self.store.get_by_user(user_id, session_id).await;
        Ok(actions.into_iter().map(|a| self.summarize(a)).collect())
    }

    /// Ownership-checked read of a single pending action.
    ///
    /// No side effects: the executor stays claimed-able and the record
    /// stays in the store.
    ///
    /// # Errors
    ///
    /// - [`ConfirmError::InvalidAction`] when the action is missing or
    ///   expired.
    /// - [`ConfirmError::PermissionDenied`] when `user_id` is not the
    ///   preparer.
    pub async fn get_action_details(
        &self,
        action_id: &str,
        user_id: &str,
    ) -> Result<PendingActionSummary, ConfirmError> {
        let action = self.load_owned(action_id, user_id, "inspect").await?;
        Ok(self.summarize(action))
    }

    /// Loads an action and enforces that `user_id` prepared it.
    async fn load_owned(
        &self,
        action_id: &str,
        user_id: &str,
        operation: &'static str,
    ) -> Result<PendingAction, ConfirmError> {
        let Some(action) = self.store.get(action_id).await else {
            return Err(ConfirmError::InvalidAction {
                action_id: action_id.to_string(),
            });
        };
        if action.user_id != user_id {
            // The caller only learns "user mismatch"; the ids stay in the log.
            tracing::warn!(
                action_id,
                operation,
                requested_by = user_id,
                owned_by = %action.user_id,
                "ownership check failed"
            );
            return Err(ConfirmError::PermissionDenied {
                action_id: action_id.to_string(),
            });
        }
        Ok(action)
    }

    /// Atomically claims the executor for `action_id`.
    ///
    /// The compare-and-remove decides which of confirm/cancel wins; it
    /// must happen before the store delete so a concurrent second confirm
    /// cannot also claim.
    fn claim_executor(&self, action_id: &str) -> Result<Executor, ConfirmError> {
        match self.executors.lock().remove(action_id) {
            Some(executor) => Ok(executor),
            None => {
                tracing::debug!(action_id, "executor already claimed or never registered");
                Err(ConfirmError::InvalidAction {
                    action_id: action_id.to_string(),
                })
            },
        }
    }

    fn summarize(&self, action: PendingAction) -> PendingActionSummary {
        let preview = self
            .registry
            .format(&action.integration, &action.tool_name, &action.parameters);
        PendingActionSummary {
            action_id: action.action_id,
            tool_name: action.tool_name,
            integration: action.integration,
            risk_level: action.risk_level,
            preview,
            created_at: action.created_at,
            expires_at: action.expires_at,
        }
    }
}
