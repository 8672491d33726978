//! ACP `session/update` → domain [`SessionUpdate`].

use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{ContentChunk, SessionNotification, SessionUpdateWire, ToolCallWire};
use crate::models::{
    PlanEntry, SessionUpdate, SlashCommand, ToolCallContent, ToolCallEvent, ToolCallStatus,
    ToolKind,
};

/// Parse and translate one `session/update` notification.
///
/// Malformed payloads and unknown update kinds are logged and dropped.
#[must_use]
pub fn translate_notification(params: Value) -> Option<SessionUpdate> {
    match serde_json::from_value::<SessionNotification>(params) {
        Ok(notification) => translate(notification),
        Err(err) => {
            warn!(%err, "acp: malformed session/update dropped");
            None
        }
    }
}

/// Translate a parsed notification. Returns `None` for updates with no
/// domain counterpart and for empty text chunks.
#[must_use]
pub fn translate(notification: SessionNotification) -> Option<SessionUpdate> {
    let session_id = notification.session_id;

    match notification.update {
        SessionUpdateWire::AgentMessageChunk { content } => {
            chunk_text(content).map(|text| SessionUpdate::AgentMessageChunk { session_id, text })
        }
        SessionUpdateWire::AgentThoughtChunk { content } => {
            chunk_text(content).map(|text| SessionUpdate::AgentThoughtChunk { session_id, text })
        }
        SessionUpdateWire::ToolCall(wire) => {
            Some(SessionUpdate::ToolCall(tool_call_event(session_id, wire)))
        }
        SessionUpdateWire::ToolCallUpdate(wire) => {
            Some(SessionUpdate::ToolCallUpdate(tool_call_event(session_id, wire)))
        }
        SessionUpdateWire::Plan { entries } => Some(SessionUpdate::Plan {
            session_id,
            entries: entries
                .into_iter()
                .map(|entry| PlanEntry {
                    content: entry.content,
                    priority: entry.priority,
                    status: entry.status,
                })
                .collect(),
        }),
        SessionUpdateWire::AvailableCommandsUpdate { available_commands } => {
            Some(SessionUpdate::AvailableCommandsUpdate {
                session_id,
                commands: available_commands
                    .into_iter()
                    .map(|command| SlashCommand {
                        name: command.name,
                        description: command.description,
                        hint: command.input.and_then(|input| input.hint),
                    })
                    .collect(),
            })
        }
        SessionUpdateWire::CurrentModeUpdate { current_mode_id } => {
            Some(SessionUpdate::CurrentModeUpdate {
                session_id,
                current_mode_id,
            })
        }
        SessionUpdateWire::UserMessageChunk { .. } => None,
        SessionUpdateWire::Unknown => {
            debug!(session_id, "acp: unknown session update kind ignored");
            None
        }
    }
}

/// Build a tool-call event; the status defaults to pending.
#[must_use]
pub fn tool_call_event(session_id: String, wire: ToolCallWire) -> ToolCallEvent {
    ToolCallEvent {
        session_id,
        tool_call_id: wire.tool_call_id,
        title: wire.title,
        kind: wire.kind.as_deref().map(ToolKind::from_wire),
        status: Some(
            wire.status
                .as_deref()
                .map(ToolCallStatus::from_wire)
                .unwrap_or_default(),
        ),
        content: wire.content.map(convert_content),
        locations: wire.locations,
        permission_request: None,
    }
}

fn chunk_text(content: ContentChunk) -> Option<String> {
    match content {
        ContentChunk::Text { text } if !text.is_empty() => Some(text),
        _ => None,
    }
}

fn convert_content(items: Vec<Value>) -> Vec<ToolCallContent> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(content) => Some(content),
            Err(err) => {
                debug!(%err, "acp: unsupported tool call content skipped");
                None
            }
        })
        .collect()
}
