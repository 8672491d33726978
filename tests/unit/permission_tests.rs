//! Unit tests for the permission state machine.
//!
//! Covers:
//! - option kind normalization, including `reject_always` folding
//! - FIFO admission with exactly one active request
//! - promotion of the next request when the active one is answered
//! - duplicate and unknown responses are no-ops
//! - `cancel_all` settles every waiter as cancelled and empties the queue
//! - auto-approval resolves covered kinds without queueing or UI updates
//! - the ACP handler and Codex handler on top of the broker

use serde_json::json;
use tokio::sync::mpsc;

use cchub::acp::schema::RequestPermissionParams;
use cchub::acp::{AcpPermissionHandler, PermissionTicket};
use cchub::codex::permission::{ApprovalRoute, CodexAdmission, CodexPermissionRequest};
use cchub::codex::CodexPermissionHandler;
use cchub::driver::ClientEvent;
use cchub::models::{PermissionOption, PermissionOptionKind, PermissionRequestView, SessionUpdate};
use cchub::permission::{
    normalize_kind, normalize_options, pick_auto_option, Admission, ApprovalRequest,
    AutoApprovePolicy, PermissionBroker, PermissionOutcome, RawOption, StatusStyle,
    ToolCallSummary,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn allow_reject() -> Vec<PermissionOption> {
    normalize_options(&[
        RawOption {
            option_id: "allow".into(),
            name: "Allow".into(),
            kind: Some("allow_once".into()),
        },
        RawOption {
            option_id: "reject".into(),
            name: "Reject".into(),
            kind: Some("reject_once".into()),
        },
    ])
}

fn request(tool_call_id: &str, wire_kind: Option<&str>) -> ApprovalRequest<()> {
    ApprovalRequest {
        session_id: "s1".into(),
        tool_call_id: tool_call_id.into(),
        wire_kind: wire_kind.map(str::to_owned),
        options: allow_reject(),
        summary: ToolCallSummary::default(),
        meta: (),
    }
}

fn broker(
    policy: AutoApprovePolicy,
) -> (PermissionBroker<()>, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PermissionBroker::new(policy, StatusStyle::default(), tx), rx)
}

/// Permission views carried by every update received so far.
fn drain_views(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<(String, PermissionRequestView)> {
    let mut views = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::SessionUpdate(update) = event {
            let tool_call_id = match &update {
                SessionUpdate::ToolCall(event) | SessionUpdate::ToolCallUpdate(event) => {
                    event.tool_call_id.clone()
                }
                _ => continue,
            };
            if let Some(view) = update.permission_request() {
                views.push((tool_call_id, view.clone()));
            }
        }
    }
    views
}

fn queued(admission: Admission<()>) -> (String, bool, tokio::sync::oneshot::Receiver<PermissionOutcome>) {
    match admission {
        Admission::Queued {
            request_id,
            is_active,
            outcome,
        } => (request_id, is_active, outcome),
        Admission::AutoResolved { .. } => panic!("expected the request to be queued"),
    }
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Known kinds pass through; `reject_always` becomes `reject_once`.
#[test]
fn known_kinds_normalize() {
    assert_eq!(normalize_kind(Some("allow_once"), ""), PermissionOptionKind::AllowOnce);
    assert_eq!(normalize_kind(Some("allow_always"), ""), PermissionOptionKind::AllowAlways);
    assert_eq!(normalize_kind(Some("reject_once"), ""), PermissionOptionKind::RejectOnce);
    assert_eq!(normalize_kind(Some("reject_always"), ""), PermissionOptionKind::RejectOnce);
}

/// Unknown or missing kinds are classified by keywords.
#[test]
fn unknown_kinds_classify_by_keyword() {
    assert_eq!(normalize_kind(Some("deny_forever"), ""), PermissionOptionKind::RejectOnce);
    assert_eq!(normalize_kind(Some("approve_session"), ""), PermissionOptionKind::AllowAlways);
    assert_eq!(normalize_kind(None, "Always allow"), PermissionOptionKind::AllowAlways);
    assert_eq!(normalize_kind(None, "Reject this"), PermissionOptionKind::RejectOnce);
    assert_eq!(normalize_kind(None, "Proceed"), PermissionOptionKind::AllowOnce);
}

/// Normalization keeps ids, names and order.
#[test]
fn options_keep_order_and_labels() {
    let options = normalize_options(&[
        RawOption {
            option_id: "b".into(),
            name: "Never".into(),
            kind: Some("reject_always".into()),
        },
        RawOption {
            option_id: "a".into(),
            name: "Sure".into(),
            kind: None,
        },
    ]);
    assert_eq!(
        options,
        vec![
            PermissionOption {
                option_id: "b".into(),
                name: "Never".into(),
                kind: PermissionOptionKind::RejectOnce,
            },
            PermissionOption {
                option_id: "a".into(),
                name: "Sure".into(),
                kind: PermissionOptionKind::AllowOnce,
            },
        ]
    );
}

// ── FIFO queue ────────────────────────────────────────────────────────────────

/// Three requests: the first is active, the others wait in order.
#[test]
fn first_request_is_the_only_active_one() {
    let (broker, mut rx) = broker(AutoApprovePolicy::default());

    let (r1, r1_active, _o1) = queued(broker.admit(request("t1", Some("edit"))));
    let (r2, r2_active, _o2) = queued(broker.admit(request("t2", Some("edit"))));
    let (r3, r3_active, _o3) = queued(broker.admit(request("t3", Some("edit"))));

    assert!(r1_active);
    assert!(!r2_active);
    assert!(!r3_active);
    assert_eq!(broker.active_request_id().as_deref(), Some(r1.as_str()));
    assert_eq!(broker.queued_request_ids(), vec![r1, r2, r3]);

    let views = drain_views(&mut rx);
    let active: Vec<bool> = views.iter().map(|(_, view)| view.is_active).collect();
    assert_eq!(active, vec![true, false, false]);
}

/// Answering the active request settles it and promotes the next one.
#[tokio::test]
async fn answering_active_promotes_next() {
    let (broker, mut rx) = broker(AutoApprovePolicy::default());
    let (r1, _, o1) = queued(broker.admit(request("t1", Some("edit"))));
    let (r2, _, _o2) = queued(broker.admit(request("t2", Some("edit"))));
    drain_views(&mut rx);

    let resolved = broker.respond(&r1, "allow").expect("r1 is queued");
    assert!(resolved.is_approved());
    assert_eq!(resolved.tool_call_id, "t1");
    assert_eq!(
        o1.await.expect("outcome delivered"),
        PermissionOutcome::Selected {
            option_id: "allow".into()
        }
    );

    let views = drain_views(&mut rx);
    assert_eq!(views.len(), 2, "one resolve update and one promotion: {views:?}");
    assert_eq!(views[0].0, "t1");
    assert_eq!(views[0].1.selected_option_id.as_deref(), Some("allow"));
    assert!(!views[0].1.is_active);
    assert_eq!(views[1].0, "t2");
    assert!(views[1].1.is_active);
    assert_eq!(broker.active_request_id(), Some(r2));
}

/// Answering a waiting request keeps the head active and announces it
/// again.
#[test]
fn answering_waiting_request_reannounces_head() {
    let (broker, mut rx) = broker(AutoApprovePolicy::default());
    let (r1, _, _o1) = queued(broker.admit(request("t1", Some("edit"))));
    let (r2, _, _o2) = queued(broker.admit(request("t2", Some("edit"))));
    drain_views(&mut rx);

    let resolved = broker.respond(&r2, "reject").expect("r2 is queued");
    assert!(!resolved.is_approved());
    assert_eq!(broker.active_request_id(), Some(r1.clone()));

    let views = drain_views(&mut rx);
    assert_eq!(views.len(), 2, "one resolve update and one re-announcement: {views:?}");
    assert_eq!(views[0].0, "t2");
    assert!(!views[0].1.is_active);
    assert_eq!(views[1].0, "t1");
    assert_eq!(views[1].1.request_id, r1);
    assert!(views[1].1.is_active);
}

/// A second answer to the same request, or an unknown id, does nothing.
#[test]
fn repeated_and_unknown_responses_are_ignored() {
    let (broker, mut rx) = broker(AutoApprovePolicy::default());
    let (r1, _, _o1) = queued(broker.admit(request("t1", Some("edit"))));

    assert!(broker.respond(&r1, "allow").is_some());
    drain_views(&mut rx);

    assert!(broker.respond(&r1, "allow").is_none());
    assert!(broker.respond("no-such-request", "allow").is_none());
    assert!(drain_views(&mut rx).is_empty());
    assert_eq!(broker.pending_count(), 0);
}

/// `cancel_all` cancels every waiter and marks every request cancelled.
#[tokio::test]
async fn cancel_all_settles_everything() {
    let (broker, mut rx) = broker(AutoApprovePolicy::default());
    let (_, _, o1) = queued(broker.admit(request("t1", Some("edit"))));
    let (_, _, o2) = queued(broker.admit(request("t2", Some("execute"))));
    drain_views(&mut rx);

    assert_eq!(broker.cancel_all().len(), 2);
    assert_eq!(o1.await.expect("settled"), PermissionOutcome::Cancelled);
    assert_eq!(o2.await.expect("settled"), PermissionOutcome::Cancelled);
    assert_eq!(broker.pending_count(), 0);
    assert_eq!(broker.active_request_id(), None);

    let views = drain_views(&mut rx);
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|(_, view)| view.is_cancelled && !view.is_active));
    assert!(broker.cancel_all().is_empty(), "second cancel is a no-op");
}

// ── Auto-approval ─────────────────────────────────────────────────────────────

/// A covered kind resolves to the allow option with no queue entry and no UI
/// update.
#[test]
fn covered_kind_is_auto_approved() {
    let (broker, mut rx) = broker(AutoApprovePolicy {
        read: true,
        ..AutoApprovePolicy::default()
    });

    match broker.admit(request("t1", Some("read"))) {
        Admission::AutoResolved { outcome, .. } => assert_eq!(
            outcome,
            PermissionOutcome::Selected {
                option_id: "allow".into()
            }
        ),
        Admission::Queued { .. } => panic!("read should be auto-approved"),
    }
    assert_eq!(broker.pending_count(), 0);
    assert!(rx.try_recv().is_err(), "auto-approval must not emit updates");
}

/// Uncovered kinds, and requests without a kind, are queued.
#[test]
fn uncovered_kinds_are_queued() {
    let (broker, _rx) = broker(AutoApprovePolicy {
        read: true,
        list: true,
        execute: false,
    });
    assert!(matches!(broker.admit(request("t1", Some("execute"))), Admission::Queued { .. }));
    assert!(matches!(broker.admit(request("t2", None)), Admission::Queued { .. }));
    assert!(matches!(broker.admit(request("t3", Some("search"))), Admission::AutoResolved { .. }));
}

/// A covered request without options resolves as cancelled.
#[test]
fn auto_approval_without_options_cancels() {
    let (broker, _rx) = broker(AutoApprovePolicy {
        execute: true,
        ..AutoApprovePolicy::default()
    });
    let mut req = request("t1", Some("execute"));
    req.options.clear();
    assert!(matches!(
        broker.admit(req),
        Admission::AutoResolved {
            outcome: PermissionOutcome::Cancelled,
            ..
        }
    ));
}

/// The auto pick prefers allow kinds, then an "allow" label, then the first.
#[test]
fn auto_pick_order() {
    let reject_first = normalize_options(&[
        RawOption {
            option_id: "no".into(),
            name: "No".into(),
            kind: Some("reject_once".into()),
        },
        RawOption {
            option_id: "always".into(),
            name: "Always".into(),
            kind: Some("allow_always".into()),
        },
    ]);
    assert_eq!(pick_auto_option(&reject_first).map(|o| o.option_id.as_str()), Some("always"));

    let only_reject = normalize_options(&[RawOption {
        option_id: "no".into(),
        name: "No".into(),
        kind: Some("reject_once".into()),
    }]);
    assert_eq!(pick_auto_option(&only_reject).map(|o| o.option_id.as_str()), Some("no"));
    assert!(pick_auto_option(&[]).is_none());
}

// ── Protocol handlers ─────────────────────────────────────────────────────────

fn acp_params(tool_call_id: &str, kind: &str) -> RequestPermissionParams {
    serde_json::from_value(json!({
        "sessionId": "s1",
        "toolCall": {"toolCallId": tool_call_id, "title": "Run tests", "kind": kind},
        "options": [
            {"optionId": "allow", "name": "Allow", "kind": "allow_once"},
            {"optionId": "deny", "name": "Deny", "kind": "reject_always"}
        ]
    }))
    .expect("valid request_permission params")
}

/// The ACP handler hands out a waiting ticket that resolves on response.
#[tokio::test]
async fn acp_ticket_resolves_on_response() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = AcpPermissionHandler::new(AutoApprovePolicy::default(), tx);

    let ticket = handler.receive(acp_params("t1", "execute"));
    assert!(matches!(ticket, PermissionTicket::Waiting(_)));
    let request_id = handler.active_request_id().expect("active request");

    let views = drain_views(&mut rx);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].1.options[1].kind, PermissionOptionKind::RejectOnce);

    assert!(handler.respond(&request_id, "deny"));
    assert_eq!(
        ticket.outcome().await,
        PermissionOutcome::Selected {
            option_id: "deny".into()
        }
    );
    assert!(!handler.respond(&request_id, "deny"));
}

/// A cancelled ACP ticket reports `Cancelled`.
#[tokio::test]
async fn acp_ticket_cancelled() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let handler = AcpPermissionHandler::new(AutoApprovePolicy::default(), tx);
    let ticket = handler.receive(acp_params("t1", "edit"));

    assert_eq!(handler.cancel_all(), 1);
    assert_eq!(ticket.outcome().await, PermissionOutcome::Cancelled);
    assert!(handler.queued_request_ids().is_empty());
}

fn codex_request(call_id: &str) -> CodexPermissionRequest {
    CodexPermissionRequest {
        session_id: "conv-1".into(),
        call_id: call_id.into(),
        kind: "edit".into(),
        title: "Apply patch".into(),
        options: Vec::new(),
        route: ApprovalRoute::Elicitation,
    }
}

/// Codex requests get default options and a repeated call id is dropped.
#[test]
fn codex_requests_dedup_by_call_id() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = CodexPermissionHandler::new(AutoApprovePolicy::default(), tx);

    let first = handler.receive(codex_request("call-1"));
    assert!(matches!(first, CodexAdmission::Queued { .. }));
    assert!(matches!(handler.receive(codex_request("call-1")), CodexAdmission::Duplicate));
    assert!(matches!(handler.receive(codex_request("call-2")), CodexAdmission::Queued { .. }));
    assert_eq!(handler.pending_count(), 2);

    let views = drain_views(&mut rx);
    assert_eq!(views.len(), 2, "the duplicate must not reach the UI");
    let option_ids: Vec<&str> = views[0].1.options.iter().map(|o| o.option_id.as_str()).collect();
    assert_eq!(option_ids, vec!["allow_once", "reject_once"]);
}

/// A Codex response reports whether the chosen option approves.
#[test]
fn codex_response_carries_decision() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let handler = CodexPermissionHandler::new(AutoApprovePolicy::default(), tx);
    let CodexAdmission::Queued { request_id } = handler.receive(codex_request("call-9")) else {
        panic!("expected queued admission");
    };

    let decision = handler.respond(&request_id, "allow_once").expect("known request");
    assert!(decision.approved);
    assert_eq!(decision.approval.call_id, "call-9");
    assert!(handler.respond(&request_id, "allow_once").is_none());
}
