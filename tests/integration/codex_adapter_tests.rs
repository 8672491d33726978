//! Integration tests for the Codex adapter against an in-memory server.
//!
//! Covers:
//! - `codex/event` streaming and `session_configured`
//! - local session ids and `codex` / `codex-reply` tool calls
//! - repeated disconnect and the handshake timeout teardown
//! - exec, elicitation and patch approvals, including dedup by call id
//! - cancel aborts queued approvals
//! - prompt timeouts reach the error channel
//! - unsupported calls and requests, `ping`

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use cchub::codex::CodexAdapter;
use cchub::config::Settings;
use cchub::driver::{AgentClient, ClientEvent};
use cchub::errors::TimeoutStep;
use cchub::models::{AgentProtocol, ErrorCategory, PromptContent, SessionUpdate, ToolKind};
use cchub::AppError;

use super::test_helpers::{agent_config, next_event, wire, FakeAgent};

async fn connected() -> (CodexAdapter, mpsc::UnboundedReceiver<ClientEvent>, FakeAgent) {
    let (tx, rx) = mpsc::unbounded_channel();
    let adapter = CodexAdapter::new(Settings::default(), tx);
    let (stdout, stdin, agent) = wire();
    adapter.connection().attach_streams(stdout, stdin).await;
    adapter.set_config(agent_config("codex", AgentProtocol::Mcp));
    (adapter, rx, agent)
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> SessionUpdate {
    match next_event(rx).await {
        ClientEvent::SessionUpdate(update) => update,
        ClientEvent::Error(error) => panic!("unexpected error event: {error:?}"),
    }
}

fn event(msg: Value) -> Value {
    json!({ "msg": msg })
}

fn exec_approval(call_id: &str) -> Value {
    event(json!({"type": "exec_approval_request", "call_id": call_id, "command": ["cargo", "test"], "cwd": "/repo"}))
}

/// Answer the next client request and return its frame.
async fn answer(agent: &mut FakeAgent) -> Value {
    let frame = agent.recv().await;
    agent.respond(&frame["id"], json!({"content": []})).await;
    frame
}

/// Send a delta and wait for it, proving earlier frames were handled.
async fn sync(agent: &mut FakeAgent, events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> SessionUpdate {
    agent
        .notify("codex/event", event(json!({"type": "agent_message_delta", "delta": "."})))
        .await;
    next_update(events).await
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// Deltas become message chunks under the agent id until a session exists.
#[tokio::test]
async fn deltas_become_message_chunks() {
    let (adapter, mut events, mut agent) = connected().await;
    assert!(adapter.is_initialized());

    agent
        .notify("codex/event", event(json!({"type": "agent_message_delta", "delta": "Hel"})))
        .await;
    agent
        .notify("codex/event", event(json!({"type": "agent_reasoning_delta", "delta": "think"})))
        .await;

    assert_eq!(
        next_update(&mut events).await,
        SessionUpdate::AgentMessageChunk {
            session_id: "codex".into(),
            text: "Hel".into()
        }
    );
    assert_eq!(
        next_update(&mut events).await,
        SessionUpdate::AgentThoughtChunk {
            session_id: "codex".into(),
            text: "think".into()
        }
    );
}

/// `session_configured` replaces the session id used for updates.
#[tokio::test]
async fn session_configured_sets_session_id() {
    let (adapter, mut events, mut agent) = connected().await;

    agent
        .notify("codex/event", event(json!({"type": "session_configured", "session_id": "conv-7"})))
        .await;
    let update = sync(&mut agent, &mut events).await;

    assert_eq!(update.session_id(), "conv-7");
    assert_eq!(adapter.session_id().as_deref(), Some("conv-7"));
}

// ── Sessions and prompts ──────────────────────────────────────────────────────

/// The first prompt starts a conversation, later ones continue it.
#[tokio::test]
async fn prompts_start_then_continue_conversation() {
    let (adapter, _events, mut agent) = connected().await;

    let session = adapter
        .new_session(Path::new("/work/repo"))
        .await
        .expect("local session");
    assert!(!session.session_id.is_empty());
    assert_eq!(adapter.session_id(), Some(session.session_id.clone()));

    let (first, frame) = tokio::join!(
        adapter.send_prompt(&session.session_id, vec![PromptContent::text("fix it")]),
        answer(&mut agent)
    );
    first.expect("first prompt");
    assert_eq!(frame["method"], "tools/call");
    assert_eq!(frame["params"]["name"], "codex");
    assert_eq!(frame["params"]["arguments"]["prompt"], "fix it");
    assert_eq!(frame["params"]["arguments"]["cwd"], "/work/repo");
    assert_eq!(frame["params"]["arguments"]["sandbox"], "workspace-write");
    assert_eq!(frame["params"]["config"]["conversationId"], session.session_id.as_str());

    let (second, frame) = tokio::join!(
        adapter.send_prompt(&session.session_id, vec![PromptContent::text("and test")]),
        answer(&mut agent)
    );
    second.expect("second prompt");
    assert_eq!(frame["params"]["name"], "codex-reply");
    assert_eq!(
        frame["params"]["arguments"],
        json!({"prompt": "and test", "conversationId": session.session_id})
    );
}

/// Modes and models are not part of the Codex surface.
#[tokio::test]
async fn modes_and_models_unsupported() {
    let (adapter, _events, _agent) = connected().await;
    let err = adapter.set_session_mode("s", "plan").await.expect_err("no modes");
    assert!(matches!(err, AppError::Unsupported(_)));
    let err = adapter.set_session_model("s", "o3").await.expect_err("no models");
    assert!(matches!(err, AppError::Unsupported(_)));
    assert!(adapter.authenticate("any").await.expect("authenticate"));
}

/// A session needs a live connection.
#[tokio::test]
async fn new_session_requires_connection() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let adapter = CodexAdapter::new(Settings::default(), tx);
    let err = adapter
        .new_session(Path::new("/work"))
        .await
        .expect_err("not initialized");
    assert!(matches!(err, AppError::NotInitialized(_)), "unexpected error: {err:?}");
}

/// Disconnect is safe before initialize and can be repeated.
#[tokio::test]
async fn disconnect_twice_is_safe() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let idle = CodexAdapter::new(Settings::default(), tx);
    idle.disconnect().await.expect("disconnect before initialize");
    idle.disconnect().await.expect("and again");
    assert!(!idle.is_initialized());

    let (adapter, _events, _agent) = connected().await;
    adapter.disconnect().await.expect("disconnect");
    adapter.disconnect().await.expect("repeat");
    assert!(!adapter.is_initialized());
    assert_eq!(adapter.current_agent_id(), None);
}

/// A server that never answers `tools/list` fails the handshake and is
/// torn down.
#[cfg(unix)]
#[tokio::test]
async fn initialize_timeout_tears_down() {
    let mut settings = Settings::default();
    settings.timeouts.initialize_seconds = 1;
    let (tx, _events) = mpsc::unbounded_channel();
    let adapter = CodexAdapter::new(settings, tx);
    let mut config = agent_config("silent-codex", AgentProtocol::Mcp);
    config.command = "sleep".into();
    config.args = vec!["30".into()];
    config.working_directory = PathBuf::from("/");

    let result = adapter.initialize(config).await;

    assert!(
        matches!(
            result,
            Err(AppError::Timeout {
                step: TimeoutStep::Initialize,
                ..
            })
        ),
        "unexpected result: {result:?}"
    );
    assert!(!adapter.is_initialized());
    assert!(!adapter.connection().is_connected());
}

// ── Approvals ─────────────────────────────────────────────────────────────────

/// An exec approval waits for the user; allowing answers the original
/// request id with `approved`.
#[tokio::test]
async fn exec_approval_is_answered() {
    let (adapter, mut events, mut agent) = connected().await;

    agent.request(json!(11), "codex/event", exec_approval("c1")).await;

    let SessionUpdate::ToolCall(call) = next_update(&mut events).await else {
        panic!("expected a tool call for the approval");
    };
    assert_eq!(call.tool_call_id, "c1");
    assert_eq!(call.title.as_deref(), Some("Exec command"));
    assert_eq!(call.kind, Some(ToolKind::Execute));
    let view = call.permission_request.expect("permission view");
    let option_ids: Vec<&str> = view.options.iter().map(|option| option.option_id.as_str()).collect();
    assert_eq!(option_ids, vec!["allow_once", "reject_once"]);
    assert_eq!(adapter.connection().pending_elicitations(), 1);

    adapter
        .respond_to_permission(&view.request_id, "allow_once")
        .await
        .expect("respond");

    assert_eq!(
        agent.recv().await,
        json!({"jsonrpc": "2.0", "id": 11, "result": {"decision": "approved"}})
    );
    assert_eq!(adapter.connection().pending_elicitations(), 0);
    assert!(adapter.queued_permissions().is_empty());
}

/// The same call id is only queued once.
#[tokio::test]
async fn duplicate_approvals_are_ignored() {
    let (adapter, mut events, mut agent) = connected().await;

    agent.request(json!(1), "codex/event", exec_approval("dup")).await;
    next_update(&mut events).await;
    agent.request(json!(2), "codex/event", exec_approval("dup")).await;

    let update = sync(&mut agent, &mut events).await;
    assert!(matches!(update, SessionUpdate::AgentMessageChunk { .. }), "unexpected update: {update:?}");
    assert_eq!(adapter.queued_permissions().len(), 1);
}

/// An `elicitation/create` request is rejected with `denied`.
#[tokio::test]
async fn elicitation_is_denied() {
    let (adapter, mut events, mut agent) = connected().await;

    agent
        .request(
            json!(20),
            "elicitation/create",
            json!({"codex_call_id": "x1", "codex_elicitation": "exec-approval", "message": "Run the tests?"}),
        )
        .await;

    let SessionUpdate::ToolCall(call) = next_update(&mut events).await else {
        panic!("expected a tool call for the elicitation");
    };
    assert_eq!(call.title.as_deref(), Some("Run the tests?"));
    let view = call.permission_request.expect("permission view");

    adapter
        .respond_to_permission(&view.request_id, "reject_once")
        .await
        .expect("respond");
    assert_eq!(
        agent.recv().await,
        json!({"jsonrpc": "2.0", "id": 20, "result": {"decision": "denied"}})
    );
}

/// Patch approvals are answered with an `apply_patch_approval_response`
/// request.
#[tokio::test]
async fn patch_approval_sends_response_request() {
    let (adapter, mut events, mut agent) = connected().await;

    agent
        .request(
            json!(30),
            "codex/event",
            event(json!({"type": "apply_patch_approval_request", "call_id": "p1", "codex_changes": {"src/lib.rs": {"update": {}}}})),
        )
        .await;

    let SessionUpdate::ToolCall(call) = next_update(&mut events).await else {
        panic!("expected a tool call for the patch");
    };
    assert_eq!(call.title.as_deref(), Some("Apply patch"));
    assert_eq!(call.kind, Some(ToolKind::Edit));
    let view = call.permission_request.expect("permission view");

    let agent_side = async {
        let frame = agent.recv().await;
        agent.respond(&frame["id"], json!({})).await;
        frame
    };
    let (result, frame) = tokio::join!(
        adapter.respond_to_permission(&view.request_id, "allow_once"),
        agent_side
    );

    result.expect("respond");
    assert_eq!(frame["method"], "apply_patch_approval_response");
    assert_eq!(frame["params"]["call_id"], "p1");
    assert_eq!(frame["params"]["approved"], true);
    assert!(frame["params"]["changes"].get("src/lib.rs").is_some());
}

/// Cancel aborts every queued exec approval.
#[tokio::test]
async fn cancel_aborts_queued_approvals() {
    let (adapter, mut events, mut agent) = connected().await;

    agent.request(json!(40), "codex/event", exec_approval("c40")).await;
    next_update(&mut events).await;

    adapter.cancel("codex").await.expect("cancel");

    assert_eq!(
        agent.recv().await,
        json!({"jsonrpc": "2.0", "id": 40, "result": {"decision": "abort"}})
    );
    let cancelled = next_update(&mut events).await;
    assert!(cancelled.permission_request().is_some_and(|view| view.is_cancelled));
    assert!(adapter.queued_permissions().is_empty());
}

// ── Other requests ────────────────────────────────────────────────────────────

/// Non-approval event requests get no reply, unknown methods are
/// rejected.
#[tokio::test]
async fn event_requests_get_no_reply() {
    let (_adapter, _events, mut agent) = connected().await;

    agent
        .request(json!(50), "codex/event", event(json!({"type": "token_count"})))
        .await;
    agent.request(json!(51), "sampling/createMessage", json!({})).await;

    let reply = agent.recv().await;
    assert_eq!(reply["id"], 51, "the event request must stay unanswered: {reply}");
    assert_eq!(reply["error"]["code"], -32601);
}

/// A turn that outlives the prompt budget is reported, and the
/// conversation still counts as started.
#[tokio::test]
async fn prompt_timeout_is_reported() {
    let mut settings = Settings::default();
    settings.timeouts.prompt_seconds = 1;
    let (tx, mut events) = mpsc::unbounded_channel();
    let adapter = CodexAdapter::new(settings, tx);
    let (stdout, stdin, mut agent) = wire();
    adapter.connection().attach_streams(stdout, stdin).await;
    adapter.set_config(agent_config("codex", AgentProtocol::Mcp));
    let session = adapter.new_session(Path::new("/work")).await.expect("session");

    let (result, frame) = tokio::join!(
        adapter.send_prompt(&session.session_id, vec![PromptContent::text("slow")]),
        agent.recv()
    );
    result.expect("a turn timeout is not a prompt failure");
    assert_eq!(frame["params"]["name"], "codex");

    let ClientEvent::Error(error) = next_event(&mut events).await else {
        panic!("expected an error event for the timeout");
    };
    assert_eq!(error.category, ErrorCategory::Timeout);
    assert_eq!(error.title, "Codex Error");
    assert!(error.message.contains("tools/call"), "unexpected message: {}", error.message);
    assert!(adapter.is_initialized());

    let (second, frame) = tokio::join!(
        adapter.send_prompt(&session.session_id, vec![PromptContent::text("next")]),
        answer(&mut agent)
    );
    second.expect("second prompt");
    assert_eq!(frame["params"]["name"], "codex-reply");
}

/// `ping` succeeds when the server answers and fails once it is stopped.
#[tokio::test]
async fn ping_reports_liveness() {
    let (adapter, _events, mut agent) = connected().await;

    let agent_side = async {
        let frame = agent.recv().await;
        agent.respond(&frame["id"], json!({})).await;
        frame
    };
    let (alive, frame) = tokio::join!(adapter.connection().ping(), agent_side);
    assert!(alive);
    assert_eq!(frame["method"], "ping");

    adapter.connection().stop().await;
    assert!(!adapter.connection().ping().await);
}

/// Content-Length framed output is decoded like JSON lines.
#[tokio::test]
async fn header_framed_events_are_decoded() {
    let (_adapter, mut events, mut agent) = connected().await;

    let body = serde_json::to_vec(&json!({
        "jsonrpc": "2.0",
        "method": "codex/event",
        "params": {"msg": {"type": "agent_message", "message": "framed"}}
    }))
    .expect("encode");
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    agent.send_raw(&frame).await;

    assert_eq!(
        next_update(&mut events).await,
        SessionUpdate::AgentMessageChunk {
            session_id: "codex".into(),
            text: "framed".into()
        }
    );
}
