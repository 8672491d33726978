//! Unit tests for protocol-to-domain translation.
//!
//! Covers:
//! - every ACP `session/update` kind the client renders
//! - user echoes, unknown kinds and malformed payloads are dropped
//! - Codex `codex/event` decoding for text, approvals and call ids

use serde_json::json;

use cchub::acp::translator::translate_notification;
use cchub::codex::events::{elicitation_call_id, normalize_call_id};
use cchub::codex::CodexEvent;
use cchub::models::{SessionUpdate, ToolCallContent, ToolCallStatus, ToolKind};

fn update(kind: serde_json::Value) -> Option<SessionUpdate> {
    translate_notification(json!({"sessionId": "sess-1", "update": kind}))
}

// ── ACP text chunks ───────────────────────────────────────────────────────────

#[test]
fn message_and_thought_chunks() {
    assert_eq!(
        update(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "Hello"}})),
        Some(SessionUpdate::AgentMessageChunk {
            session_id: "sess-1".into(),
            text: "Hello".into()
        })
    );
    assert_eq!(
        update(json!({"sessionUpdate": "agent_thought_chunk", "content": {"type": "text", "text": "hmm"}})),
        Some(SessionUpdate::AgentThoughtChunk {
            session_id: "sess-1".into(),
            text: "hmm".into()
        })
    );
}

/// Non-text chunks and the user's own echo have no rendering.
#[test]
fn non_text_and_user_chunks_dropped() {
    assert_eq!(
        update(json!({"sessionUpdate": "agent_message_chunk", "content": {"type": "image", "data": "AA=="}})),
        None
    );
    assert_eq!(
        update(json!({"sessionUpdate": "user_message_chunk", "content": {"type": "text", "text": "hi"}})),
        None
    );
}

// ── ACP tool calls ────────────────────────────────────────────────────────────

/// A tool call keeps its id, kind, locations and supported content.
#[test]
fn tool_call_translates() {
    let Some(SessionUpdate::ToolCall(event)) = update(json!({
        "sessionUpdate": "tool_call",
        "toolCallId": "call-1",
        "title": "Edit main.rs",
        "kind": "edit",
        "status": "in_progress",
        "locations": [{"path": "/src/main.rs", "line": 3}],
        "content": [
            {"type": "diff", "path": "/src/main.rs", "oldText": "a", "newText": "b"},
            {"type": "terminal", "terminalId": "term-1"}
        ]
    })) else {
        panic!("expected a tool_call update");
    };

    assert_eq!(event.session_id, "sess-1");
    assert_eq!(event.tool_call_id, "call-1");
    assert_eq!(event.kind, Some(ToolKind::Edit));
    assert_eq!(event.status, Some(ToolCallStatus::InProgress));
    assert_eq!(event.locations.as_ref().map(Vec::len), Some(1));
    assert_eq!(
        event.content,
        Some(vec![
            ToolCallContent::Diff {
                path: "/src/main.rs".into(),
                old_text: Some("a".into()),
                new_text: "b".into()
            },
            ToolCallContent::Terminal {
                terminal_id: "term-1".into()
            },
        ])
    );
    assert!(event.permission_request.is_none());
}

/// Updates carry the new status; `list` folds into search.
#[test]
fn tool_call_update_translates() {
    let Some(SessionUpdate::ToolCallUpdate(event)) = update(json!({
        "sessionUpdate": "tool_call_update",
        "toolCallId": "call-2",
        "kind": "list",
        "status": "completed"
    })) else {
        panic!("expected a tool_call_update");
    };
    assert_eq!(event.status, Some(ToolCallStatus::Completed));
    assert_eq!(event.kind, Some(ToolKind::Search));
}

// ── ACP session state ─────────────────────────────────────────────────────────

#[test]
fn plan_translates() {
    let Some(SessionUpdate::Plan { entries, .. }) = update(json!({
        "sessionUpdate": "plan",
        "entries": [
            {"content": "Read code", "priority": "high", "status": "completed"},
            {"content": "Write fix", "priority": "medium", "status": "pending"}
        ]
    })) else {
        panic!("expected a plan update");
    };
    let steps: Vec<&str> = entries.iter().map(|entry| entry.content.as_str()).collect();
    assert_eq!(steps, vec!["Read code", "Write fix"]);
    assert_eq!(entries[0].status, "completed");
}

#[test]
fn commands_and_mode_translate() {
    let Some(SessionUpdate::AvailableCommandsUpdate { commands, .. }) = update(json!({
        "sessionUpdate": "available_commands_update",
        "availableCommands": [
            {"name": "review", "description": "Review changes", "input": {"hint": "branch"}},
            {"name": "init", "description": "Create AGENTS.md"}
        ]
    })) else {
        panic!("expected a commands update");
    };
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].hint.as_deref(), Some("branch"));
    assert_eq!(commands[1].hint, None);

    assert_eq!(
        update(json!({"sessionUpdate": "current_mode_update", "currentModeId": "plan"})),
        Some(SessionUpdate::CurrentModeUpdate {
            session_id: "sess-1".into(),
            current_mode_id: "plan".into()
        })
    );
}

/// Malformed notifications are dropped rather than failing.
#[test]
fn malformed_notifications_dropped() {
    assert_eq!(translate_notification(json!({"update": {}})), None);
    assert_eq!(translate_notification(json!("nonsense")), None);
    assert_eq!(
        update(json!({"sessionUpdate": "tool_call", "title": "missing id"})),
        None
    );
}

// ── Codex events ──────────────────────────────────────────────────────────────

/// Complete messages and deltas both become message chunks.
#[test]
fn codex_text_events() {
    let message = CodexEvent::from_params(&json!({"msg": {"type": "agent_message", "message": "Done."}}))
        .expect("typed event");
    assert_eq!(
        message.to_update("conv"),
        Some(SessionUpdate::AgentMessageChunk {
            session_id: "conv".into(),
            text: "Done.".into()
        })
    );
    assert!(CodexEvent::from_params(&json!({"msg": {}})).is_none());
    assert!(CodexEvent::from_params(&json!({})).is_none());
}

/// Exec and patch approvals decode their payloads.
#[test]
fn codex_approval_events() {
    let exec = CodexEvent::from_params(&json!({
        "msg": {"type": "exec_approval_request", "call_id": "c1", "command": ["git", "status"], "cwd": "/repo"}
    }));
    let Some(CodexEvent::ExecApproval(exec)) = exec else {
        panic!("expected exec approval, got {exec:?}");
    };
    assert_eq!(exec.call_id, "c1");
    assert_eq!(exec.command_line().as_deref(), Some("git status"));

    let patch = CodexEvent::from_params(&json!({
        "msg": {"type": "apply_patch_approval_request", "call_id": "c2", "codex_changes": {"a.rs": {"add": {}}}}
    }));
    let Some(CodexEvent::PatchApproval(patch)) = patch else {
        panic!("expected patch approval, got {patch:?}");
    };
    assert!(patch.changes().contains_key("a.rs"));
}

/// Unknown event types decode as `Unknown` and produce no update.
#[test]
fn codex_unknown_events() {
    let event = CodexEvent::from_params(&json!({"msg": {"type": "token_count", "total": 5}}));
    assert_eq!(event, Some(CodexEvent::Unknown("token_count".into())));
    assert_eq!(event.and_then(|event| event.to_update("conv")), None);
}

/// Call ids come from the params, else from the JSON-RPC id.
#[test]
fn codex_call_ids() {
    assert_eq!(elicitation_call_id(&json!({"codex_call_id": "x1"}), &json!(4)), "x1");
    assert_eq!(elicitation_call_id(&json!({"call_id": "y2"}), &json!(4)), "y2");
    assert_eq!(elicitation_call_id(&json!({}), &json!(4)), "elicitation_4");

    assert_eq!(normalize_call_id("patch_abc"), "abc");
    assert_eq!(normalize_call_id("elicitation_7"), "7");
    assert_eq!(normalize_call_id("plain"), "plain");
}
