//! Agent configuration and capability models.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by an agent process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentProtocol {
    /// Agent Client Protocol over newline-delimited stdio.
    Acp,
    /// The Codex MCP-style variant with mixed framing.
    Mcp,
}

/// Immutable per-initialization descriptor of the agent to launch.
///
/// Produced by [`crate::agents::build_agent_config`] from a configured
/// profile; consumed once per `initialize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Unique agent identifier.
    pub id: String,
    /// Human-readable name used in logs and error messages.
    pub display_name: String,
    /// Executable name or path.
    pub command: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Agent-specific environment overlay.
    pub env: BTreeMap<String, String>,
    /// Working directory of the agent process.
    pub working_directory: PathBuf,
    /// Wire protocol.
    pub protocol: AgentProtocol,
    /// Module identifier, e.g. `acp:claude`.
    pub module_id: String,
}

impl AgentConfig {
    /// Label used in log lines and error messages: `Name (id)`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.id)
    }

    /// Trimmed command, or `None` when no command is configured.
    #[must_use]
    pub fn trimmed_command(&self) -> Option<&str> {
        let command = self.command.trim();
        (!command.is_empty()).then_some(command)
    }
}

/// Authentication method advertised by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    /// Method identifier passed back to `authenticate`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Content kinds an agent accepts in prompts. All default to `false`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptCapabilities {
    /// Image blocks.
    pub image: bool,
    /// Audio blocks.
    pub audio: bool,
    /// Embedded resource blocks.
    pub embedded_context: bool,
}

/// Normalized result of a successful `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeResult {
    /// Protocol version the agent negotiated.
    pub protocol_version: u32,
    /// Supported authentication methods.
    pub auth_methods: Vec<AuthMethod>,
    /// Supported prompt content kinds.
    pub prompt_capabilities: PromptCapabilities,
}

/// A session mode offered by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMode {
    /// Mode identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Modes available in a session and the active one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModeState {
    /// All selectable modes.
    pub available_modes: Vec<SessionMode>,
    /// Currently active mode.
    pub current_mode_id: String,
}

/// A model offered by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModel {
    /// Model identifier.
    pub model_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Models available in a session and the active one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModelState {
    /// All selectable models.
    pub available_models: Vec<SessionModel>,
    /// Currently active model.
    pub current_model_id: String,
}

/// Result of `newSession`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionResult {
    /// Session identifier used for subsequent prompts.
    pub session_id: String,
    /// Session modes, when the agent supports them.
    pub modes: Option<SessionModeState>,
    /// Session models, when the agent supports them.
    pub models: Option<SessionModelState>,
}

/// One block of user prompt content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image without a `data:` prefix.
    Image {
        /// Image payload.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl PromptContent {
    /// Convenience constructor for a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
