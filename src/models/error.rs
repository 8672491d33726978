//! Structured, UI-facing agent errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::HostPlatform;

/// Machine category of a surfaced error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Process or transport failure.
    Connection,
    /// Missing or wrong command, exit code 127.
    Configuration,
    /// Missing or failed authentication.
    Authentication,
    /// Upstream rate limiting.
    RateLimit,
    /// A lifecycle step exceeded its budget.
    Timeout,
}

/// How loudly the UI should present the error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks the conversation.
    Error,
    /// Informational; the conversation may continue.
    Warning,
}

/// Error surfaced to the UI layer without any protocol knowledge attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentError {
    /// Unique error identifier.
    pub id: String,
    /// Machine category.
    pub category: ErrorCategory,
    /// Presentation severity.
    pub severity: Severity,
    /// Short title.
    pub title: String,
    /// Human-readable description.
    pub message: String,
    /// Optional remediation hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Process exit code, when the error came from an exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Agent the error belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// When the error occurred.
    pub occurred_at: DateTime<Utc>,
}

impl AgentError {
    /// Build an error with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(category: ErrorCategory, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            severity: Severity::Error,
            title: title.into(),
            message: message.into(),
            suggestion: None,
            code: None,
            agent_id: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attach a remediation hint.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach the owning agent id.
    #[must_use]
    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Attach a process exit code.
    #[must_use]
    pub fn with_code(mut self, code: Option<i32>) -> Self {
        self.code = code;
        self
    }

    /// "Command not found" error for a configured agent command.
    #[must_use]
    pub fn command_not_found(command: &str, agent_label: &str, platform: HostPlatform) -> Self {
        Self::new(
            ErrorCategory::Configuration,
            "Command Not Found",
            format!(
                "The command \"{command}\" could not be found. Please check the path \
                 configuration for {agent_label}."
            ),
        )
        .with_suggestion(command_not_found_suggestion(command, platform))
    }
}

/// Remediation hint telling the user how to locate `command` on `platform`.
#[must_use]
pub fn command_not_found_suggestion(command: &str, platform: HostPlatform) -> String {
    let name = command
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("command");

    if platform.is_windows() {
        format!(
            "1. Verify the agent path: Use \"where {name}\" in Command Prompt to find the correct \
             path. 2. If the agent requires Node.js, also check that the Node.js path is set \
             correctly (use \"where node\" to find it)."
        )
    } else {
        format!(
            "1. Verify the agent path: Use \"which {name}\" in Terminal to find the correct path. \
             2. If the agent requires Node.js, also check that the Node.js path is set correctly \
             (use \"which node\" to find it)."
        )
    }
}
