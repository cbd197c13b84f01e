//! Human-readable previews for pending actions.
//!
//! [`PreviewFormatterRegistry`] maps `(integration, tool_name)` to a pure
//! function that renders an action's parameters as Markdown. Unknown pairs
//! fall back to a generic preview, so every action can always be shown to
//! a user. [`default_registry`] ships formatters for the built-in
//! integrations.
//!
//! Formatters must not read external state, must not mutate parameters,
//! and must tolerate missing optional fields.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{Map, Value};

/// A pure rendering function from action parameters to Markdown.
pub type PreviewFormatter = Arc<dyn Fn(&Map<String, Value>) -> String + Send + Sync>;

/// Registry of per-tool preview formatters with a generic fallback.
///
/// # Examples
///
/// ```
/// use confirm_core::preview::PreviewFormatterRegistry;
/// use serde_json::Map;
///
/// let mut registry = PreviewFormatterRegistry::new();
/// registry.register("wiki", "archive_page", |params| {
///     format!("**Archive Page** `{}`", params["page"].as_str().unwrap_or("?"))
/// });
///
/// let mut params = Map::new();
/// params.insert("page".to_string(), "Runbook".into());
/// let preview = registry.format("wiki", "archive_page", &params);
/// assert!(preview.contains("Archive Page"));
/// ```
#[derive(Clone, Default)]
pub struct PreviewFormatterRegistry {
    formatters: HashMap<(String, String), PreviewFormatter>,
}

impl fmt::Debug for PreviewFormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewFormatterRegistry")
            .field("registered", &self.formatters.len())
            .finish()
    }
}

impl PreviewFormatterRegistry {
    /// Creates an empty registry. Misses fall back to the generic preview.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a formatter for an `(integration, tool_name)` pair.
    ///
    /// Both tags are lowercased, so registration and dispatch are
    /// case-insensitive. A second registration for the same pair replaces
    /// the first.
    pub fn register<F>(&mut self, integration: &str, tool_name: &str, formatter: F)
    where
        F: Fn(&Map<String, Value>) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(
            (integration.to_lowercase(), tool_name.to_lowercase()),
            Arc::new(formatter),
        );
    }

    /// Returns `true` if a formatter is registered for the pair.
    pub fn contains(&self, integration: &str, tool_name: &str) -> bool {
        self.formatters
            .contains_key(&(integration.to_lowercase(), tool_name.to_lowercase()))
    }

    /// Renders the preview for an action.
    ///
    /// Dispatches to the registered formatter, or to the generic preview
    /// when the pair is unknown.
    pub fn format(
        &self,
        integration: &str,
        tool_name: &str,
        parameters: &Map<String, Value>,
    ) -> String {
        let key = (integration.to_lowercase(), tool_name.to_lowercase());
        match self.formatters.get(&key) {
            Some(formatter) => formatter(parameters),
            None => generic_preview(integration, tool_name, parameters),
        }
    }
}

/// Renders a parameter as display text: strings verbatim, everything else
/// as compact JSON.
fn text(params: &Map<String, Value>, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "(not specified)".to_string(),
    }
}

/// Fallback preview for tools without a registered formatter.
fn generic_preview(integration: &str, tool_name: &str, parameters: &Map<String, Value>) -> String {
    let pretty = serde_json::to_string_pretty(parameters).unwrap_or_else(|_| "{}".to_string());
    let mut out = String::new();
    let _ = writeln!(out, "**Execute `{tool_name}`**");
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Integration**: {integration}");
    let _ = writeln!(out, "- **Parameters**:");
    let _ = writeln!(out, "```json");
    let _ = writeln!(out, "{pretty}");
    let _ = write!(out, "```");
    out
}

fn format_create_jira_issue(params: &Map<String, Value>) -> String {
    format!(
        "**Create Jira Issue**\n\n\
         - **Project**: {}\n\
         - **Summary**: {}\n\
         - **Type**: {}\n\
         - **Description**: {}",
        text(params, "project"),
        text(params, "summary"),
        text(params, "issue_type"),
        text(params, "description"),
    )
}

fn format_add_jira_comment(params: &Map<String, Value>) -> String {
    format!(
        "**Add Jira Comment**\n\n\
         - **Issue**: {}\n\
         - **Comment**: {}",
        text(params, "issue_key"),
        text(params, "comment"),
    )
}

fn format_send_email(params: &Map<String, Value>) -> String {
    format!(
        "**Send Email**\n\n\
         - **To**: {}\n\
         - **Subject**: {}\n\
         - **Body**: {}",
        text(params, "to"),
        text(params, "subject"),
        text(params, "body"),
    )
}

fn format_create_github_issue(params: &Map<String, Value>) -> String {
    format!(
        "**Create GitHub Issue**\n\n\
         - **Repository**: {}\n\
         - **Title**: {}\n\
         - **Body**: {}",
        text(params, "repo"),
        text(params, "title"),
        text(params, "body"),
    )
}

fn format_update_confluence_page(params: &Map<String, Value>) -> String {
    format!(
        "**Update Confluence Page**\n\n\
         - **Space**: {}\n\
         - **Page**: {}\n\
         - **Content**: {}",
        text(params, "space"),
        text(params, "title"),
        text(params, "content"),
    )
}

/// Builds a registry pre-populated with formatters for the built-in
/// integrations.
///
/// # Examples
///
/// ```
/// use confirm_core::preview::default_registry;
/// use serde_json::Map;
///
/// let registry = default_registry();
/// let mut params = Map::new();
/// params.insert("project".to_string(), "PROJ".into());
/// let preview = registry.format("jira", "create_jira_issue", &params);
/// assert!(preview.contains("Create Jira Issue"));
/// assert!(preview.contains("PROJ"));
/// ```
pub fn default_registry() -> PreviewFormatterRegistry {
    let mut registry = PreviewFormatterRegistry::new();
    registry.register("jira", "create_jira_issue", format_create_jira_issue);
    registry.register("jira", "add_jira_comment", format_add_jira_comment);
    registry.register("email", "send_email", format_send_email);
    registry.register("github", "create_github_issue", format_create_github_issue);
    registry.register(
        "confluence",
        "update_confluence_page",
        format_update_confluence_page,
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn jira_create_preview_includes_heading_and_fields() {
        let registry = default_registry();
        let preview = registry.format(
            "jira",
            "create_jira_issue",
            &params(&[
                ("project", json!("PROJ")),
                ("summary", json!("Login page crashes on mobile Safari")),
                ("issue_type", json!("Bug")),
            ]),
        );
        assert!(preview.contains("Create Jira Issue"));
        assert!(preview.contains("PROJ"));
        assert!(preview.contains("Login page crashes on mobile Safari"));
        assert!(preview.contains("Bug"));
    }

    #[test]
    fn missing_optional_fields_render_placeholder() {
        let registry = default_registry();
        let preview = registry.format(
            "jira",
            "create_jira_issue",
            &params(&[("project", json!("PROJ"))]),
        );
        assert!(preview.contains("(not specified)"));
    }

    #[test]
    fn email_preview() {
        let registry = default_registry();
        let preview = registry.format(
            "email",
            "send_email",
            &params(&[
                ("to", json!("team@example.com")),
                ("subject", json!("Release notes")),
            ]),
        );
        assert!(preview.contains("Send Email"));
        assert!(preview.contains("team@example.com"));
        assert!(preview.contains("Release notes"));
    }

    #[test]
    fn github_preview() {
        let registry = default_registry();
        let preview = registry.format(
            "github",
            "create_github_issue",
            &params(&[("repo", json!("acme/api")), ("title", json!("Flaky CI"))]),
        );
        assert!(preview.contains("Create GitHub Issue"));
        assert!(preview.contains("acme/api"));
    }

    #[test]
    fn dispatch_is_case_insensitive() {
        let registry = default_registry();
        let preview = registry.format("JIRA", "Create_Jira_Issue", &Map::new());
        assert!(preview.contains("Create Jira Issue"));
    }

    #[test]
    fn unknown_tool_uses_generic_preview() {
        let registry = default_registry();
        let preview = registry.format(
            "generic",
            "frobnicate",
            &params(&[("target", json!("db-1"))]),
        );
        assert!(preview.contains("frobnicate"));
        assert!(preview.contains("generic"));
        assert!(preview.contains("target"));
        assert!(preview.contains("db-1"));
    }

    #[test]
    fn empty_parameters_are_allowed() {
        let registry = default_registry();
        let preview = registry.format("generic", "frobnicate", &Map::new());
        assert!(preview.contains("{}"));
    }

    #[test]
    fn non_string_parameter_values_render_as_json() {
        let registry = default_registry();
        let preview = registry.format(
            "jira",
            "create_jira_issue",
            &params(&[("project", json!({"key": "PROJ"}))]),
        );
        assert!(preview.contains(r#"{"key":"PROJ"}"#));
    }

    #[test]
    fn register_replaces_existing_formatter() {
        let mut registry = default_registry();
        registry.register("jira", "create_jira_issue", |_| "overridden".to_string());
        let preview = registry.format("jira", "create_jira_issue", &Map::new());
        assert_eq!(preview, "overridden");
    }

    #[test]
    fn contains_reflects_registration() {
        let registry = default_registry();
        assert!(registry.contains("jira", "create_jira_issue"));
        assert!(!registry.contains("jira", "unknown_tool"));
    }

    #[test]
    fn formatters_do_not_mutate_parameters() {
        let registry = default_registry();
        let before = params(&[("project", json!("PROJ"))]);
        let snapshot = before.clone();
        registry.format("jira", "create_jira_issue", &before);
        assert_eq!(before, snapshot);
    }
}
