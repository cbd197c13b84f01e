//! Tool classification: maps a tool name to its integration and action type.
//!
//! The table covers the built-in integrations; anything unknown falls back
//! to `("generic", ActionType::Other)` so new tools work before they are
//! catalogued.

use crate::action::ActionType;

/// Integration tag used for tools with no catalog entry.
pub const GENERIC_INTEGRATION: &str = "generic";

/// Derives `(integration, action_type)` from a tool name.
///
/// # Examples
///
/// ```
/// use confirm_core::action::ActionType;
/// use confirm_core::catalog::classify_tool;
///
/// assert_eq!(classify_tool("create_jira_issue"), ("jira", ActionType::Create));
/// assert_eq!(classify_tool("send_email"), ("email", ActionType::Send));
/// assert_eq!(classify_tool("launch_rockets"), ("generic", ActionType::Other));
/// ```
pub fn classify_tool(tool_name: &str) -> (&'static str, ActionType) {
    match tool_name {
        "create_jira_issue" => ("jira", ActionType::Create),
        "update_jira_issue" => ("jira", ActionType::Update),
        "delete_jira_issue" => ("jira", ActionType::Delete),
        "add_jira_comment" => ("jira", ActionType::Create),
        "send_email" => ("email", ActionType::Send),
        "create_github_issue" => ("github", ActionType::Create),
        "add_github_comment" => ("github", ActionType::Create),
        "close_github_issue" => ("github", ActionType::Update),
        "create_confluence_page" => ("confluence", ActionType::Create),
        "update_confluence_page" => ("confluence", ActionType::Update),
        _ => (GENERIC_INTEGRATION, ActionType::Other),
    }
}
