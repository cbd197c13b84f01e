//! Error types for confirmation operations.
//!
//! Provides [`ConfirmError`], the error enum for every public operation,
//! and [`ErrorKind`], the stable tag surfaced to agent callers in error
//! payloads.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The boxed error type produced by a failing executor.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during confirmation operations.
///
/// Each variant carries the context needed for internal logs. The client-
/// facing message (via `Display`) deliberately does not distinguish the
/// sub-cases of [`InvalidAction`](Self::InvalidAction) (missing, expired,
/// already processed) and keeps [`PermissionDenied`](Self::PermissionDenied)
/// generic.
///
/// # Examples
///
/// ```
/// use confirm_core::error::{ConfirmError, ErrorKind};
///
/// let err = ConfirmError::InvalidAction {
///     action_id: "action_9f3ab2c104d7".to_string(),
/// };
/// assert_eq!(err.kind(), ErrorKind::InvalidAction);
/// assert!(err.to_string().contains("action_9f3ab2c104d7"));
/// ```
#[derive(Debug, Error)]
pub enum ConfirmError {
    /// Malformed input (bad risk level, empty user id, etc.).
    #[error("invalid {field}: {message}")]
    Validation {
        /// The offending input field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The action does not exist, has expired, or was already processed.
    #[error("action not found or expired: {action_id}")]
    InvalidAction {
        /// The action id the caller supplied.
        action_id: String,
    },

    /// The caller is not the user who prepared the action.
    ///
    /// The message stays generic; internal logs carry both user ids.
    #[error("user mismatch for action {action_id}")]
    PermissionDenied {
        /// The action id the caller supplied.
        action_id: String,
    },

    /// The executor ran and raised. The action is consumed either way.
    #[error("execution failed for action {action_id}: {source}")]
    ExecutionFailed {
        /// The action whose executor failed.
        action_id: String,
        /// The executor's own error, chained for internal logs.
        #[source]
        source: ExecutorError,
    },

    /// The cache provider signalled failure where a caller needed success.
    #[error("cache unavailable during {operation}")]
    CacheUnavailable {
        /// The store operation that needed the cache.
        operation: &'static str,
    },
}

/// Stable error tags surfaced to agent callers.
///
/// Serializes to exactly the wire strings of the error payload contract
/// (`ValidationError`, `InvalidAction`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed input.
    ValidationError,
    /// Action not found, expired, or already processed.
    InvalidAction,
    /// Ownership check failed.
    PermissionDenied,
    /// The executor raised.
    ExecutionFailed,
    /// The cache provider failed a required mutation.
    CacheUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::ValidationError => "ValidationError",
            Self::InvalidAction => "InvalidAction",
            Self::PermissionDenied => "PermissionDenied",
            Self::ExecutionFailed => "ExecutionFailed",
            Self::CacheUnavailable => "CacheUnavailable",
        };
        write!(f, "{tag}")
    }
}

/// Tagged error record returned to the agent runtime.
///
/// # Examples
///
/// ```
/// use confirm_core::error::ConfirmError;
///
/// let err = ConfirmError::Validation {
///     field: "risk_level",
///     message: "expected one of low, medium, high".to_string(),
/// };
/// let payload = err.payload();
/// let json = serde_json::to_value(&payload).unwrap();
/// assert_eq!(json["status"], "error");
/// assert_eq!(json["kind"], "ValidationError");
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    /// Always `"error"`.
    pub status: &'static str,
    /// The stable error tag.
    pub kind: ErrorKind,
    /// The client-facing message.
    pub message: String,
}

impl ConfirmError {
    /// Maps this error to its stable client-facing tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use confirm_core::error::{ConfirmError, ErrorKind};
    ///
    /// let err = ConfirmError::CacheUnavailable { operation: "store" };
    /// assert_eq!(err.kind(), ErrorKind::CacheUnavailable);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::InvalidAction { .. } => ErrorKind::InvalidAction,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            Self::CacheUnavailable { .. } => ErrorKind::CacheUnavailable,
        }
    }

    /// Renders the tagged `{status, kind, message}` record for the caller.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            status: "error",
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = ConfirmError::InvalidAction {
            action_id: "action_0123456789ab".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "action not found or expired: action_0123456789ab"
        );

        let err = ConfirmError::PermissionDenied {
            action_id: "action_0123456789ab".to_string(),
        };
        assert_eq!(err.to_string(), "user mismatch for action action_0123456789ab");

        let err = ConfirmError::Validation {
            field: "user_id",
            message: "must not be empty".to_string(),
        };
        assert_eq!(err.to_string(), "invalid user_id: must not be empty");
    }

    #[test]
    fn permission_denied_message_does_not_leak_owner() {
        let err = ConfirmError::PermissionDenied {
            action_id: "action_0123456789ab".to_string(),
        };
        let msg = err.to_string();
        assert!(!msg.contains("alice"));
        assert!(!msg.contains("exists"));
    }

    #[test]
    fn kinds() {
        assert_eq!(
            ConfirmError::Validation {
                field: "risk_level",
                message: String::new(),
            }
            .kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            ConfirmError::InvalidAction {
                action_id: "a".to_string(),
            }
            .kind(),
            ErrorKind::InvalidAction
        );
        assert_eq!(
            ConfirmError::ExecutionFailed {
                action_id: "a".to_string(),
                source: "boom".into(),
            }
            .kind(),
            ErrorKind::ExecutionFailed
        );
    }

    #[test]
    fn execution_failed_chains_source() {
        let inner = std::io::Error::other("API 503");
        let err = ConfirmError::ExecutionFailed {
            action_id: "action_0123456789ab".to_string(),
            source: Box::new(inner),
        };
        let source = std::error::Error::source(&err).expect("source should be chained");
        assert!(source.to_string().contains("API 503"));
        assert!(err.to_string().contains("API 503"));
    }

    #[test]
    fn kind_serializes_to_wire_tag() {
        let json = serde_json::to_value(ErrorKind::PermissionDenied).unwrap();
        assert_eq!(json, "PermissionDenied");
        assert_eq!(ErrorKind::ValidationError.to_string(), "ValidationError");
    }

    #[test]
    fn payload_shape() {
        let err = ConfirmError::InvalidAction {
            action_id: "action_0123456789ab".to_string(),
        };
        let json = serde_json::to_value(err.payload()).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "InvalidAction");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("action_0123456789ab"));
    }
}
