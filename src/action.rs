//! The pending-action record and its supporting value types.
//!
//! [`PendingAction`] is the single core entity: a durable description of a
//! proposed mutating operation awaiting user confirmation. Timestamps are
//! ISO-8601 UTC strings end-to-end in the serialized form (chrono's serde
//! support on [`DateTime<Utc>`]); raw epoch encodings are never used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::constants::{ACTION_ID_HEX_LEN, ACTION_ID_PREFIX};
use crate::error::ConfirmError;

/// Advisory risk classification for a pending action.
///
/// Pure metadata: the core stores and surfaces it but never gates on it.
/// Any risk-driven policy (auto-approve `low`, extra prompts for `high`)
/// belongs in the agent layer.
///
/// # Examples
///
/// ```
/// use confirm_core::action::RiskLevel;
///
/// let risk: RiskLevel = "medium".parse().unwrap();
/// assert_eq!(risk, RiskLevel::Medium);
/// assert_eq!(risk.to_string(), "medium");
/// assert!("urgent".parse::<RiskLevel>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Safe, easily reversible.
    Low,
    /// Moderate impact.
    Medium,
    /// Significant impact.
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = ConfirmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ConfirmError::Validation {
                field: "risk_level",
                message: format!("expected one of low, medium, high; got {other:?}"),
            }),
        }
    }
}

/// Advisory classification of what kind of mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Creates a new resource (issue, page, ...).
    Create,
    /// Modifies an existing resource.
    Update,
    /// Removes a resource.
    Delete,
    /// Dispatches a message (email, notification, ...).
    Send,
    /// Anything else.
    Other,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Send => write!(f, "send"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A durable record of a proposed mutating operation awaiting confirmation.
///
/// Integration-agnostic: the same record shape serves Jira, email, GitHub,
/// or any future tool. The executor closure is *not* part of this record;
/// it lives in a process-local map keyed by `action_id` for the lifetime
/// of the server process.
///
/// # Examples
///
/// ```
/// use confirm_core::action::{ActionType, PendingAction, RiskLevel};
/// use chrono::{Duration, Utc};
/// use serde_json::Map;
///
/// let now = Utc::now();
/// let action = PendingAction {
///     action_id: confirm_core::action::generate_action_id(),
///     user_id: "alice".to_string(),
///     session_id: None,
///     integration: "jira".to_string(),
///     tool_name: "create_jira_issue".to_string(),
///     action_type: ActionType::Create,
///     risk_level: RiskLevel::Medium,
///     parameters: Map::new(),
///     created_at: now,
///     expires_at: now + Duration::minutes(10),
/// };
/// assert!(!action.is_expired());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique identifier, format `action_<12-hex>`. Never reused.
    pub action_id: String,

    /// The principal who prepared the action. Immutable after creation;
    /// only this principal may confirm or cancel.
    pub user_id: String,

    /// Optional session tag, used only for filtered listing.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Short lowercase integration tag (`jira`, `email`, `github`, ...).
    pub integration: String,

    /// Short lowercase tool tag (`create_jira_issue`, `send_email`, ...).
    pub tool_name: String,

    /// Advisory mutation classification.
    pub action_type: ActionType,

    /// Advisory risk classification.
    pub risk_level: RiskLevel,

    /// The executor's inputs, as supplied by the agent runtime.
    pub parameters: Map<String, Value>,

    /// When the action was prepared (UTC).
    pub created_at: DateTime<Utc>,

    /// When the action ceases to exist: `created_at + TTL` (UTC). The
    /// cache's own TTL equals this span at insertion and is authoritative;
    /// this field backs the local-clock check.
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    /// Returns `true` once the local clock has passed `expires_at`.
    ///
    /// The cache TTL fires independently; whichever triggers first makes
    /// the action invisible.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Generates a fresh action identifier: `action_` plus 12 lowercase hex
/// characters drawn from a CSPRNG (48 random bits).
///
/// # Examples
///
/// ```
/// use confirm_core::action::generate_action_id;
///
/// let id = generate_action_id();
/// assert_eq!(id.len(), 19);
/// assert!(id.starts_with("action_"));
/// assert!(id["action_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn generate_action_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{ACTION_ID_PREFIX}{}", &hex[..ACTION_ID_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample_action(expires_in: Duration) -> PendingAction {
        let now = Utc::now();
        PendingAction {
            action_id: generate_action_id(),
            user_id: "alice".to_string(),
            session_id: Some("s1".to_string()),
            integration: "jira".to_string(),
            tool_name: "create_jira_issue".to_string(),
            action_type: ActionType::Create,
            risk_level: RiskLevel::Medium,
            parameters: Map::new(),
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    // ---- RiskLevel tests ----

    #[test]
    fn risk_level_parses_valid_values() {
        assert_eq!("low".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert_eq!("medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
    }

    #[test]
    fn risk_level_rejects_unknown_value() {
        let err = "urgent".parse::<RiskLevel>().unwrap_err();
        assert!(matches!(
            err,
            ConfirmError::Validation {
                field: "risk_level",
                ..
            }
        ));
        assert!(err.to_string().contains("urgent"));
    }

    #[test]
    fn risk_level_rejects_uppercase() {
        assert!("Medium".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn risk_level_serde_is_lowercase() {
        let json = serde_json::to_value(RiskLevel::High).unwrap();
        assert_eq!(json, "high");
        let back: RiskLevel = serde_json::from_value(json!("high")).unwrap();
        assert_eq!(back, RiskLevel::High);
    }

    // ---- ActionType tests ----

    #[test]
    fn action_type_serde_is_lowercase() {
        let json = serde_json::to_value(ActionType::Send).unwrap();
        assert_eq!(json, "send");
        let back: ActionType = serde_json::from_value(json!("other")).unwrap();
        assert_eq!(back, ActionType::Other);
    }

    #[test]
    fn action_type_display() {
        assert_eq!(ActionType::Create.to_string(), "create");
        assert_eq!(ActionType::Other.to_string(), "other");
    }

    // ---- Id generation tests ----

    #[test]
    fn action_id_has_expected_format() {
        let id = generate_action_id();
        assert_eq!(id.len(), 19);
        let hex = id.strip_prefix("action_").expect("prefix");
        assert_eq!(hex.len(), 12);
        assert!(hex
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn action_ids_do_not_collide_in_practice() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(generate_action_id()));
        }
    }

    // ---- PendingAction tests ----

    #[test]
    fn is_expired_respects_expiry() {
        assert!(!sample_action(Duration::minutes(10)).is_expired());
        assert!(sample_action(Duration::seconds(-10)).is_expired());
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let mut action = sample_action(Duration::minutes(10));
        action
            .parameters
            .insert("project".to_string(), json!("PROJ"));

        let raw = serde_json::to_string(&action).unwrap();
        let back: PendingAction = serde_json::from_str(&raw).unwrap();

        assert_eq!(back.action_id, action.action_id);
        assert_eq!(back.user_id, "alice");
        assert_eq!(back.session_id.as_deref(), Some("s1"));
        assert_eq!(back.action_type, ActionType::Create);
        assert_eq!(back.risk_level, RiskLevel::Medium);
        assert_eq!(back.parameters["project"], json!("PROJ"));
        assert_eq!(back.created_at, action.created_at);
        assert_eq!(back.expires_at, action.expires_at);
    }

    #[test]
    fn timestamps_serialize_as_iso_strings() {
        let action = sample_action(Duration::minutes(10));
        let json = serde_json::to_value(&action).unwrap();
        let created = json["created_at"].as_str().expect("string timestamp");
        assert!(created.contains('T'));
        assert!(json["expires_at"].is_string());
    }

    #[test]
    fn missing_session_id_deserializes_as_none() {
        let raw = serde_json::json!({
            "action_id": "action_0123456789ab",
            "user_id": "alice",
            "integration": "generic",
            "tool_name": "do_thing",
            "action_type": "other",
            "risk_level": "low",
            "parameters": {},
            "created_at": "2026-08-01T10:00:00Z",
            "expires_at": "2026-08-01T10:10:00Z"
        });
        let action: PendingAction = serde_json::from_value(raw).unwrap();
        assert!(action.session_id.is_none());
    }
}
