//! Closed union of the Codex events this client understands.
//!
//! Codex streams its progress as `codex/event` envelopes whose
//! `params.msg.type` selects the payload. The envelope is decoded once into
//! [`CodexEvent`]; everything downstream matches on the enum.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::SessionUpdate;
use crate::permission::RawOption;

/// Method of the event envelope.
pub const EVENT_METHOD: &str = "codex/event";

/// Suffix of role-reversed elicitation requests.
pub const ELICITATION_SUFFIX: &str = "elicitation/create";

/// `exec_approval_request` payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecApproval {
    /// Codex call id.
    #[serde(default)]
    pub call_id: String,
    /// Command, as an argv array or a string.
    #[serde(default)]
    pub command: Value,
    /// Working directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Why Codex wants to run it.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `apply_patch_approval_request` payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatchApproval {
    /// Codex call id.
    #[serde(default)]
    pub call_id: String,
    /// File changes keyed by path.
    #[serde(default)]
    pub changes: Option<Map<String, Value>>,
    /// Alternate name some Codex builds use for `changes`.
    #[serde(default)]
    pub codex_changes: Option<Map<String, Value>>,
    /// Why Codex wants to apply it.
    #[serde(default)]
    pub reason: Option<String>,
}

impl PatchApproval {
    /// `changes`, falling back to `codex_changes`, or an empty map.
    #[must_use]
    pub fn changes(&self) -> Map<String, Value> {
        self.changes
            .clone()
            .or_else(|| self.codex_changes.clone())
            .unwrap_or_default()
    }
}

impl ExecApproval {
    /// Command line for display.
    #[must_use]
    pub fn command_line(&self) -> Option<String> {
        match &self.command {
            Value::String(line) => Some(line.clone()),
            Value::Array(argv) => Some(
                argv.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
        .filter(|line| !line.is_empty())
    }
}

/// Any other approval-like event that carries its own options.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionApproval {
    /// Original event type.
    pub event_type: String,
    /// Codex call id, empty when absent.
    pub call_id: String,
    /// Title, when the event has one.
    pub title: Option<String>,
    /// Options as sent, not yet normalized.
    pub options: Vec<RawOption>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownEvent {
    AgentMessageDelta {
        #[serde(default)]
        delta: String,
    },
    AgentMessage {
        #[serde(default)]
        message: String,
    },
    AgentReasoningDelta {
        #[serde(default)]
        delta: String,
    },
    SessionConfigured {
        #[serde(default)]
        session_id: Option<Value>,
    },
    ExecApprovalRequest(ExecApproval),
    ApplyPatchApprovalRequest(PatchApproval),
    #[serde(other)]
    Other,
}

/// A decoded `codex/event` message.
#[derive(Debug, Clone, PartialEq)]
pub enum CodexEvent {
    /// Streamed assistant text.
    AgentMessageDelta(String),
    /// Complete assistant message.
    AgentMessage(String),
    /// Streamed reasoning text.
    AgentReasoningDelta(String),
    /// Codex assigned the conversation id.
    SessionConfigured(Option<String>),
    /// Codex wants to run a command.
    ExecApproval(ExecApproval),
    /// Codex wants to apply a patch.
    PatchApproval(PatchApproval),
    /// Generic approval with its own options.
    OptionApproval(OptionApproval),
    /// Anything else, by type.
    Unknown(String),
}

impl CodexEvent {
    /// Decode the `msg` object of a `codex/event` envelope's params.
    ///
    /// Returns `None` when there is no `msg.type`.
    #[must_use]
    pub fn from_params(params: &Value) -> Option<Self> {
        let msg = params.get("msg")?;
        let event_type = msg.get("type")?.as_str()?.to_owned();

        let known = match KnownEvent::deserialize(msg) {
            Ok(known) => known,
            Err(err) => {
                debug!(event_type, %err, "malformed codex event");
                KnownEvent::Other
            }
        };

        Some(match known {
            KnownEvent::AgentMessageDelta { delta } => Self::AgentMessageDelta(delta),
            KnownEvent::AgentMessage { message } => Self::AgentMessage(message),
            KnownEvent::AgentReasoningDelta { delta } => Self::AgentReasoningDelta(delta),
            KnownEvent::SessionConfigured { session_id } => {
                Self::SessionConfigured(session_id.as_ref().and_then(id_string))
            }
            KnownEvent::ExecApprovalRequest(exec) => Self::ExecApproval(exec),
            KnownEvent::ApplyPatchApprovalRequest(patch) => Self::PatchApproval(patch),
            KnownEvent::Other => match option_approval(&event_type, msg) {
                Some(approval) => Self::OptionApproval(approval),
                None => Self::Unknown(event_type),
            },
        })
    }

    /// Domain update for text-bearing events. Empty text yields nothing.
    #[must_use]
    pub fn to_update(&self, session_id: &str) -> Option<SessionUpdate> {
        let (text, thought) = match self {
            Self::AgentMessageDelta(text) | Self::AgentMessage(text) => (text, false),
            Self::AgentReasoningDelta(text) => (text, true),
            _ => return None,
        };
        if text.is_empty() {
            return None;
        }
        let session_id = session_id.to_owned();
        let text = text.clone();
        Some(if thought {
            SessionUpdate::AgentThoughtChunk { session_id, text }
        } else {
            SessionUpdate::AgentMessageChunk { session_id, text }
        })
    }
}

/// Call id of an approval-carrying envelope: `codex_call_id`, `call_id`, or
/// for elicitations `elicitation_<rpc id>`.
#[must_use]
pub fn elicitation_call_id(params: &Value, rpc_id: &Value) -> String {
    ["codex_call_id", "call_id"]
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map_or_else(|| format!("elicitation_{}", id_string(rpc_id).unwrap_or_default()), str::to_owned)
}

/// Key under which role-reversed requests are remembered.
#[must_use]
pub fn normalize_call_id(call_id: &str) -> &str {
    let call_id = call_id.strip_prefix("patch_").unwrap_or(call_id);
    call_id.strip_prefix("elicitation_").unwrap_or(call_id)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Generic approval: a type mentioning approval or permission plus an
/// `options` or `choices` array.
fn option_approval(event_type: &str, msg: &Value) -> Option<OptionApproval> {
    let lowered = event_type.to_ascii_lowercase();
    if !lowered.contains("approval") && !lowered.contains("permission") {
        return None;
    }
    let items = msg
        .get("options")
        .or_else(|| msg.get("choices"))
        .and_then(Value::as_array)?;

    Some(OptionApproval {
        event_type: event_type.to_owned(),
        call_id: msg
            .get("call_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        title: ["title", "message", "reason"]
            .iter()
            .find_map(|key| msg.get(*key).and_then(Value::as_str))
            .map(str::to_owned),
        options: items.iter().filter_map(raw_option).collect(),
    })
}

fn raw_option(item: &Value) -> Option<RawOption> {
    if let Some(label) = item.as_str() {
        return Some(RawOption {
            option_id: label.to_owned(),
            name: label.to_owned(),
            kind: None,
        });
    }
    let first = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| item.get(*key).and_then(Value::as_str))
            .map(str::to_owned)
    };
    let option_id = first(&["optionId", "option_id", "id", "value"])?;
    Some(RawOption {
        name: first(&["name", "label", "title"]).unwrap_or_else(|| option_id.clone()),
        kind: first(&["kind"]),
        option_id,
    })
}
