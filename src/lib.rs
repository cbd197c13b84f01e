//! Two-phase confirmation core for agent tool execution.
//!
//! This crate interposes between an agent's intent to invoke a mutating
//! external action (create a ticket, send an email, write to a wiki) and
//! the actual execution. It captures the proposed action as a durable,
//! uniquely identified *pending action*, renders a human-readable preview
//! for out-of-band review, and atomically transitions the action to
//! executed or cancelled under strict ownership and TTL rules.
//!
//! # Overview
//!
//! Four cooperating components, leaves first:
//!
//! - [`cache`] - Namespaced key-value abstraction with TTL and secondary
//!   indexes: [`CacheProvider`], the in-memory provider, and the Redis
//!   provider (feature `redis`).
//! - [`store`] - [`PendingActionStore`], typed CRUD over pending actions
//!   keyed by action id and indexed by user.
//! - [`preview`] - [`PreviewFormatterRegistry`], per-tool Markdown preview
//!   rendering with a safe default.
//! - [`service`] - [`ConfirmationService`], the prepare → confirm /
//!   cancel / expire state machine holding the process-local executor map.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use confirm_core::cache::InMemoryCache;
//! use confirm_core::preview::default_registry;
//! use confirm_core::service::{boxed_executor, ConfirmationService, PrepareActionRequest};
//! use confirm_core::store::PendingActionStore;
//! use serde_json::{json, Map};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = PendingActionStore::new(Arc::new(InMemoryCache::new("confirmation")));
//! let service = ConfirmationService::new(store, default_registry());
//!
//! let mut tool_args = Map::new();
//! tool_args.insert("project".to_string(), json!("PROJ"));
//! tool_args.insert("summary".to_string(), json!("Fix login crash"));
//!
//! let prepared = service
//!     .prepare_action(
//!         PrepareActionRequest {
//!             user_id: "alice".to_string(),
//!             session_id: None,
//!             tool_name: "create_jira_issue".to_string(),
//!             tool_args,
//!             risk_level: "medium".to_string(),
//!         },
//!         boxed_executor(|| async { Ok(json!({"issue": "PROJ-1"})) }),
//!     )
//!     .await
//!     .unwrap();
//!
//! // The user reviews `prepared.preview` out-of-band, then:
//! let confirmed = service
//!     .confirm_action(&prepared.action_id, "alice")
//!     .await
//!     .unwrap();
//! assert_eq!(confirmed.result, json!({"issue": "PROJ-1"}));
//! # });
//! ```
//!
//! # Deployment Note
//!
//! Pending actions live in the shared cache and survive restarts, but the
//! executor closures are process-local. In a multi-replica deployment,
//! confirm and cancel must be routed to the replica that served the
//! prepare; see [`service`] for details.

pub mod action;
pub mod cache;
pub mod catalog;
pub mod constants;
pub mod error;
pub mod preview;
pub mod service;
pub mod store;

// Re-exports for ergonomic access
pub use action::{ActionType, PendingAction, RiskLevel};
pub use cache::{CacheProvider, InMemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use error::{ConfirmError, ErrorKind, ErrorPayload, ExecutorError};
pub use preview::{default_registry, PreviewFormatterRegistry};
pub use service::{
    boxed_executor, CancelledAction, ConfirmationService, ConfirmedAction, Executor,
    PendingActionSummary, PrepareActionRequest, PreparedAction,
};
pub use store::{NewAction, PendingActionStore, StoreStats};
