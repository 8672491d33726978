//! Domain session-update events consumed by the chat UI.
//!
//! [`SessionUpdate`] is a closed set: each protocol translator maps its
//! native notifications onto these variants and drops everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized category of a tool invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reading files or data.
    Read,
    /// Modifying files.
    Edit,
    /// Removing files.
    Delete,
    /// Moving or renaming files.
    Move,
    /// Searching or listing.
    Search,
    /// Running a command.
    Execute,
    /// Internal reasoning.
    Think,
    /// Retrieving external data.
    Fetch,
    /// Switching session mode.
    SwitchMode,
    /// Anything else.
    Other,
}

impl ToolKind {
    /// Map a wire kind string onto the normalized vocabulary.
    ///
    /// `list` is folded into [`ToolKind::Search`]; unknown strings map to
    /// [`ToolKind::Other`].
    #[must_use]
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "read" => Self::Read,
            "edit" => Self::Edit,
            "delete" => Self::Delete,
            "move" => Self::Move,
            "search" | "list" => Self::Search,
            "execute" => Self::Execute,
            "think" => Self::Think,
            "fetch" => Self::Fetch,
            "switch_mode" => Self::SwitchMode,
            _ => Self::Other,
        }
    }
}

/// Execution status of a tool call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Not started yet or awaiting approval.
    #[default]
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl ToolCallStatus {
    /// Parse a wire status, defaulting unknown values to `Pending`.
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Content attached to a tool call, passed through structurally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    /// A regular content block (text, image, resource).
    Content {
        /// The raw content block.
        content: Value,
    },
    /// A file diff.
    Diff {
        /// Path of the affected file.
        path: String,
        /// Previous text, absent for new files.
        #[serde(rename = "oldText", default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        /// Replacement text.
        #[serde(rename = "newText")]
        new_text: String,
    },
    /// Live output of an embedded terminal.
    Terminal {
        /// Terminal identifier.
        #[serde(rename = "terminalId")]
        terminal_id: String,
    },
}

/// File location touched by a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallLocation {
    /// Absolute path.
    pub path: String,
    /// Optional 1-based line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Normalized kind of a permission option.
///
/// `reject_always` never survives normalization; it folds into
/// [`PermissionOptionKind::RejectOnce`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this invocation.
    AllowOnce,
    /// Allow this and future invocations.
    AllowAlways,
    /// Reject this invocation.
    RejectOnce,
}

impl PermissionOptionKind {
    /// Whether selecting this option approves the tool call.
    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// One selectable answer to a permission request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Identifier sent back to the agent.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Normalized kind.
    pub kind: PermissionOptionKind,
}

/// UI state of a permission request attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestView {
    /// Locally generated request identifier.
    pub request_id: String,
    /// Normalized options.
    pub options: Vec<PermissionOption>,
    /// Option chosen by the user, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
    /// Whether this request is the one currently shown.
    pub is_active: bool,
    /// Whether the request was cancelled without a decision.
    #[serde(default)]
    pub is_cancelled: bool,
}

/// Payload shared by `tool_call` and `tool_call_update`.
///
/// Every field except the ids is optional so that partial updates only
/// carry what changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    /// Originating session.
    pub session_id: String,
    /// Tool call identifier.
    pub tool_call_id: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Normalized kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    /// Execution status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Attached content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolCallContent>>,
    /// Affected locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ToolCallLocation>>,
    /// Permission request state, when the call awaits approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_request: Option<PermissionRequestView>,
}

/// One step of an agent plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    /// Description of the step.
    pub content: String,
    /// `high`, `medium` or `low`.
    #[serde(default)]
    pub priority: String,
    /// `pending`, `in_progress` or `completed`.
    #[serde(default)]
    pub status: String,
}

/// A slash command the agent accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlashCommand {
    /// Command name without the slash.
    pub name: String,
    /// What the command does.
    pub description: String,
    /// Input hint, if the command takes input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Incremental change visible to the chat UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Streamed assistant text.
    AgentMessageChunk {
        /// Originating session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Non-empty text fragment.
        text: String,
    },
    /// Streamed reasoning text.
    AgentThoughtChunk {
        /// Originating session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Non-empty text fragment.
        text: String,
    },
    /// A new tool call.
    ToolCall(ToolCallEvent),
    /// Changes to an existing tool call.
    ToolCallUpdate(ToolCallEvent),
    /// The agent's current plan.
    Plan {
        /// Originating session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Plan steps in order.
        entries: Vec<PlanEntry>,
    },
    /// Slash commands available in the session.
    AvailableCommandsUpdate {
        /// Originating session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// The commands.
        commands: Vec<SlashCommand>,
    },
    /// The session switched modes.
    CurrentModeUpdate {
        /// Originating session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// New mode identifier.
        #[serde(rename = "currentModeId")]
        current_mode_id: String,
    },
}

impl SessionUpdate {
    /// Session the update belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::AgentMessageChunk { session_id, .. }
            | Self::AgentThoughtChunk { session_id, .. }
            | Self::Plan { session_id, .. }
            | Self::AvailableCommandsUpdate { session_id, .. }
            | Self::CurrentModeUpdate { session_id, .. } => session_id,
            Self::ToolCall(event) | Self::ToolCallUpdate(event) => &event.session_id,
        }
    }

    /// Permission state carried by a tool-call update, if any.
    #[must_use]
    pub fn permission_request(&self) -> Option<&PermissionRequestView> {
        match self {
            Self::ToolCall(event) | Self::ToolCallUpdate(event) => {
                event.permission_request.as_ref()
            }
            _ => None,
        }
    }
}
