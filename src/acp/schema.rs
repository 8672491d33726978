//! Typed ACP wire payloads.
//!
//! Only the fields this client reads or writes are modelled. Inbound types
//! are lenient (`default` everywhere it is legal) so that agents that omit
//! optional members still parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{
    AuthMethod, PromptCapabilities, PromptContent, SessionModeState, SessionModelState,
    ToolCallLocation,
};

/// ACP protocol version this client speaks.
pub const PROTOCOL_VERSION: u32 = 1;

// ── Client → agent ────────────────────────────────────────────────────────────

/// `fs` capability block; both operations are declared unsupported.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCapability {
    /// `fs/read_text_file`.
    pub read_text_file: bool,
    /// `fs/write_text_file`.
    pub write_text_file: bool,
}

/// Capabilities advertised in `initialize`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// File-system access.
    pub fs: FileSystemCapability,
    /// `terminal/*` support.
    pub terminal: bool,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            fs: FileSystemCapability::default(),
            terminal: true,
        }
    }
}

/// `initialize` parameters.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Requested protocol version.
    pub protocol_version: u32,
    /// Client capabilities.
    pub client_capabilities: ClientCapabilities,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            client_capabilities: ClientCapabilities::default(),
        }
    }
}

/// `session/new` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionParams {
    /// Session working directory, already translated for WSL.
    pub cwd: String,
    /// MCP servers to attach; always empty.
    pub mcp_servers: Vec<Value>,
}

/// `session/prompt` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptParams<'a> {
    /// Target session.
    pub session_id: &'a str,
    /// Prompt blocks.
    pub prompt: &'a [PromptContent],
}

/// `session/cancel` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelParams<'a> {
    /// Target session.
    pub session_id: &'a str,
}

/// `session/set_mode` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeParams<'a> {
    /// Target session.
    pub session_id: &'a str,
    /// Mode to switch to.
    pub mode_id: &'a str,
}

/// `session/set_model` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModelParams<'a> {
    /// Target session.
    pub session_id: &'a str,
    /// Model to switch to.
    pub model_id: &'a str,
}

/// `authenticate` parameters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateParams<'a> {
    /// Chosen method.
    pub method_id: &'a str,
}

/// Outcome sent back for `session/request_permission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcomeWire {
    /// An option was chosen.
    Selected {
        /// The option.
        #[serde(rename = "optionId")]
        option_id: String,
    },
    /// No decision was made.
    Cancelled,
}

/// `session/request_permission` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionResponse {
    /// The outcome.
    pub outcome: PermissionOutcomeWire,
}

// ── Agent → client ────────────────────────────────────────────────────────────

/// `agentCapabilities` of the `initialize` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
    /// Prompt content support.
    pub prompt_capabilities: PromptCapabilities,
}

/// `initialize` result.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeResponse {
    /// Negotiated protocol version.
    pub protocol_version: u32,
    /// Supported authentication methods.
    pub auth_methods: Vec<AuthMethod>,
    /// Agent capabilities.
    pub agent_capabilities: AgentCapabilities,
}

/// `session/new` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    /// New session id.
    pub session_id: String,
    /// Available modes.
    #[serde(default)]
    pub modes: Option<SessionModeState>,
    /// Available models.
    #[serde(default)]
    pub models: Option<SessionModelState>,
}

/// `session/update` notification parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Originating session.
    pub session_id: String,
    /// The update.
    pub update: SessionUpdateWire,
}

/// Content block of a streamed chunk; only text is rendered.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentChunk {
    /// Text.
    Text {
        /// The text.
        text: String,
    },
    /// Images, audio, resources.
    #[serde(other)]
    Other,
}

/// Fields shared by `tool_call` and `tool_call_update` updates and by the
/// `toolCall` member of a permission request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallWire {
    /// Tool call id.
    pub tool_call_id: String,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Raw kind string.
    #[serde(default)]
    pub kind: Option<String>,
    /// Raw status string.
    #[serde(default)]
    pub status: Option<String>,
    /// Content items, converted one by one.
    #[serde(default)]
    pub content: Option<Vec<Value>>,
    /// Locations.
    #[serde(default)]
    pub locations: Option<Vec<ToolCallLocation>>,
}

/// Plan entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanEntryWire {
    /// Step text.
    pub content: String,
    /// Priority.
    #[serde(default)]
    pub priority: String,
    /// Status.
    #[serde(default)]
    pub status: String,
}

/// Input hint of a slash command.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandInputWire {
    /// Placeholder text.
    #[serde(default)]
    pub hint: Option<String>,
}

/// Slash command.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableCommandWire {
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Input definition.
    #[serde(default)]
    pub input: Option<CommandInputWire>,
}

/// Closed set of `session/update` kinds, tagged by `sessionUpdate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdateWire {
    /// Assistant text.
    AgentMessageChunk {
        /// Chunk content.
        content: ContentChunk,
    },
    /// Reasoning text.
    AgentThoughtChunk {
        /// Chunk content.
        content: ContentChunk,
    },
    /// Echo of the user's own message.
    UserMessageChunk {
        /// Chunk content.
        content: ContentChunk,
    },
    /// New tool call.
    ToolCall(ToolCallWire),
    /// Tool call changes.
    ToolCallUpdate(ToolCallWire),
    /// Plan.
    Plan {
        /// Steps.
        #[serde(default)]
        entries: Vec<PlanEntryWire>,
    },
    /// Slash commands.
    AvailableCommandsUpdate {
        /// Commands.
        #[serde(rename = "availableCommands", default)]
        available_commands: Vec<AvailableCommandWire>,
    },
    /// Mode switch.
    CurrentModeUpdate {
        /// New mode.
        #[serde(rename = "currentModeId")]
        current_mode_id: String,
    },
    /// Anything this client does not know.
    #[serde(other)]
    Unknown,
}

/// Option of a permission request as sent by the agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOptionWire {
    /// Option id.
    pub option_id: String,
    /// Label.
    #[serde(default)]
    pub name: String,
    /// Raw kind.
    #[serde(default)]
    pub kind: Option<String>,
}

/// `session/request_permission` parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionParams {
    /// Session.
    pub session_id: String,
    /// Gated tool call.
    pub tool_call: ToolCallWire,
    /// Options.
    #[serde(default)]
    pub options: Vec<PermissionOptionWire>,
}

/// Environment variable of `terminal/create`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvVariable {
    /// Name.
    pub name: String,
    /// Value.
    pub value: String,
}

/// `terminal/create` parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalParams {
    /// Session.
    #[serde(default)]
    pub session_id: String,
    /// Command line or program.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment additions.
    #[serde(default)]
    pub env: Vec<EnvVariable>,
    /// Working directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Retained output limit in bytes.
    #[serde(default)]
    pub output_byte_limit: Option<usize>,
}

/// Parameters of the `terminal/*` calls addressing one terminal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalParams {
    /// Session.
    #[serde(default)]
    pub session_id: String,
    /// Terminal.
    pub terminal_id: String,
}
