//! Permission-request state machine shared by both protocols.
//!
//! A [`PermissionBroker`] owns one [`PermissionQueue`] and pushes every
//! UI-visible state change (queued, promoted, resolved, cancelled) onto the
//! client event channel as a tool-call update carrying a
//! [`PermissionRequestView`].
//!
//! Request lifecycle:
//!
//! ```text
//! admit ──auto policy──▶ resolved immediately (never queued)
//!   │
//!   └──▶ queued-inactive ──head──▶ active ──respond──▶ resolved
//!                 │                   │
//!                 └─────cancel_all────┴──────────────▶ cancelled
//! ```

pub mod policy;
pub mod queue;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

pub use policy::{pick_auto_option, AutoApprovePolicy};
pub use queue::{PendingPermission, PermissionOutcome, PermissionQueue};

use crate::driver::ClientEvent;
use crate::models::{
    PermissionOption, PermissionOptionKind, PermissionRequestView, SessionUpdate, ToolCallEvent,
    ToolCallLocation, ToolCallStatus, ToolKind,
};

// ── Option normalization ──────────────────────────────────────────────────────

/// Option as received on the wire, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    /// Identifier sent back to the agent.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Wire kind, if any.
    pub kind: Option<String>,
}

/// Map a wire option kind onto the normalized vocabulary.
///
/// Known kinds pass through, with `reject_always` folded into
/// `reject_once`. Unknown kinds are classified by keyword; when the kind is
/// absent the option name is classified instead.
#[must_use]
pub fn normalize_kind(kind: Option<&str>, name: &str) -> PermissionOptionKind {
    match kind.map(str::trim).filter(|kind| !kind.is_empty()) {
        Some("allow_once") => PermissionOptionKind::AllowOnce,
        Some("allow_always") => PermissionOptionKind::AllowAlways,
        Some("reject_once" | "reject_always") => PermissionOptionKind::RejectOnce,
        Some(other) => classify_keywords(other),
        None => classify_keywords(name),
    }
}

fn classify_keywords(text: &str) -> PermissionOptionKind {
    let text = text.to_lowercase();
    if text.contains("reject") || text.contains("deny") {
        // reject_always does not survive normalization.
        PermissionOptionKind::RejectOnce
    } else if text.contains("allow") || text.contains("approve") {
        if text.contains("always") || text.contains("session") {
            PermissionOptionKind::AllowAlways
        } else {
            PermissionOptionKind::AllowOnce
        }
    } else {
        PermissionOptionKind::AllowOnce
    }
}

/// Normalize a full option list, preserving order.
#[must_use]
pub fn normalize_options(options: &[RawOption]) -> Vec<PermissionOption> {
    options
        .iter()
        .map(|option| PermissionOption {
            option_id: option.option_id.clone(),
            name: option.name.clone(),
            kind: normalize_kind(option.kind.as_deref(), &option.name),
        })
        .collect()
}

// ── Broker ────────────────────────────────────────────────────────────────────

/// Tool-call fields shown alongside a newly queued request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallSummary {
    /// Title.
    pub title: Option<String>,
    /// Normalized kind.
    pub kind: Option<ToolKind>,
    /// Status; defaults to pending.
    pub status: Option<ToolCallStatus>,
    /// Affected locations.
    pub locations: Option<Vec<ToolCallLocation>>,
}

/// An incoming approval request.
#[derive(Debug)]
pub struct ApprovalRequest<M> {
    /// Owning session.
    pub session_id: String,
    /// Gated tool call.
    pub tool_call_id: String,
    /// Wire tool kind used by the auto-approval policy.
    pub wire_kind: Option<String>,
    /// Normalized options.
    pub options: Vec<PermissionOption>,
    /// Fields for the initial tool-call update.
    pub summary: ToolCallSummary,
    /// Protocol-specific correlation data.
    pub meta: M,
}

/// What happened to an admitted request.
#[derive(Debug)]
pub enum Admission<M> {
    /// The policy resolved it without queueing.
    AutoResolved {
        /// Chosen option, or `Cancelled` when there were no options.
        outcome: PermissionOutcome,
        /// The request's correlation data.
        meta: M,
    },
    /// The request is queued.
    Queued {
        /// Generated request id.
        request_id: String,
        /// Whether it became the active request.
        is_active: bool,
        /// Resolves when the user answers or the queue is cancelled.
        outcome: oneshot::Receiver<PermissionOutcome>,
    },
}

/// A request removed by a user response.
#[derive(Debug)]
pub struct Resolved<M> {
    /// Request id.
    pub request_id: String,
    /// Owning session.
    pub session_id: String,
    /// Gated tool call.
    pub tool_call_id: String,
    /// Chosen option when it is one of the request's options.
    pub option: Option<PermissionOption>,
    /// Correlation data.
    pub meta: M,
}

impl<M> Resolved<M> {
    /// Whether the chosen option approves the tool call.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.option
            .as_ref()
            .is_some_and(|option| option.kind.is_allow())
    }
}

/// Tool-call statuses a broker attaches to its updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusStyle {
    /// Status sent when a request is answered.
    pub on_resolve: Option<ToolCallStatus>,
    /// Status sent when a request is promoted to active.
    pub on_promote: Option<ToolCallStatus>,
}

/// Single-active FIFO permission state machine.
#[derive(Debug)]
pub struct PermissionBroker<M> {
    policy: AutoApprovePolicy,
    style: StatusStyle,
    queue: Mutex<PermissionQueue<M>>,
    updates: mpsc::UnboundedSender<ClientEvent>,
}

impl<M> PermissionBroker<M> {
    /// Create a broker reporting to `updates`.
    #[must_use]
    pub fn new(
        policy: AutoApprovePolicy,
        style: StatusStyle,
        updates: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            policy,
            style,
            queue: Mutex::new(PermissionQueue::new()),
            updates,
        }
    }

    /// The auto-approval policy in effect.
    #[must_use]
    pub fn policy(&self) -> AutoApprovePolicy {
        self.policy
    }

    /// Admit a request: auto-resolve it or queue it.
    pub fn admit(&self, request: ApprovalRequest<M>) -> Admission<M> {
        if self.policy.covers(request.wire_kind.as_deref()) {
            let outcome = pick_auto_option(&request.options).map_or(
                PermissionOutcome::Cancelled,
                |option| PermissionOutcome::Selected {
                    option_id: option.option_id.clone(),
                },
            );
            info!(
                session_id = %request.session_id,
                tool_call_id = %request.tool_call_id,
                outcome = ?outcome,
                "auto-approving permission request"
            );
            return Admission::AutoResolved {
                outcome,
                meta: request.meta,
            };
        }

        let (entry, outcome) = PendingPermission::new(
            request.session_id,
            request.tool_call_id,
            request.options,
            request.meta,
        );
        let request_id = entry.request_id.clone();
        let event = ToolCallEvent {
            session_id: entry.session_id.clone(),
            tool_call_id: entry.tool_call_id.clone(),
            title: request.summary.title,
            kind: request.summary.kind,
            status: Some(request.summary.status.unwrap_or_default()),
            locations: request.summary.locations,
            ..ToolCallEvent::default()
        };

        let is_active = {
            let mut queue = self.lock();
            let view = entry.view(queue.is_empty());
            let is_active = queue.push(entry);
            self.emit(SessionUpdate::ToolCall(ToolCallEvent {
                permission_request: Some(view),
                ..event
            }));
            is_active
        };

        debug!(request_id, is_active, "permission request queued");
        Admission::Queued {
            request_id,
            is_active,
            outcome,
        }
    }

    /// Answer a request. Unknown ids are a no-op, so repeated answers are
    /// harmless.
    pub fn respond(&self, request_id: &str, option_id: &str) -> Option<Resolved<M>> {
        let mut queue = self.lock();
        let Some(mut entry) = queue.remove(request_id) else {
            debug!(request_id, "permission response for unknown request ignored");
            return None;
        };

        self.emit(SessionUpdate::ToolCallUpdate(ToolCallEvent {
            session_id: entry.session_id.clone(),
            tool_call_id: entry.tool_call_id.clone(),
            status: self.style.on_resolve,
            permission_request: Some(PermissionRequestView {
                selected_option_id: Some(option_id.to_owned()),
                ..entry.view(false)
            }),
            ..ToolCallEvent::default()
        }));

        entry.settle(PermissionOutcome::Selected {
            option_id: option_id.to_owned(),
        });

        // Re-announce the head after every response, changed or not.
        if let Some(next) = queue.active() {
            self.emit(SessionUpdate::ToolCallUpdate(ToolCallEvent {
                session_id: next.session_id.clone(),
                tool_call_id: next.tool_call_id.clone(),
                status: self.style.on_promote,
                permission_request: Some(next.view(true)),
                ..ToolCallEvent::default()
            }));
        }
        drop(queue);

        let option = entry.option(option_id).cloned();
        Some(Resolved {
            request_id: entry.request_id,
            session_id: entry.session_id,
            tool_call_id: entry.tool_call_id,
            option,
            meta: entry.meta,
        })
    }

    /// Cancel every outstanding request and empty the queue.
    pub fn cancel_all(&self) -> Vec<M> {
        let drained = self.lock().drain();
        if !drained.is_empty() {
            info!(count = drained.len(), "cancelling pending permission requests");
        }

        drained
            .into_iter()
            .map(|mut entry| {
                self.emit(SessionUpdate::ToolCallUpdate(ToolCallEvent {
                    session_id: entry.session_id.clone(),
                    tool_call_id: entry.tool_call_id.clone(),
                    status: Some(ToolCallStatus::Completed),
                    permission_request: Some(PermissionRequestView {
                        is_cancelled: true,
                        ..entry.view(false)
                    }),
                    ..ToolCallEvent::default()
                }));
                entry.settle(PermissionOutcome::Cancelled);
                entry.meta
            })
            .collect()
    }

    /// Whether any queued request satisfies `predicate`.
    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&PendingPermission<M>) -> bool,
    {
        self.lock().find(predicate).is_some()
    }

    /// Id of the active request.
    #[must_use]
    pub fn active_request_id(&self) -> Option<String> {
        self.lock().active().map(|entry| entry.request_id.clone())
    }

    /// Queued request ids in order.
    #[must_use]
    pub fn queued_request_ids(&self) -> Vec<String> {
        self.lock().request_ids()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn emit(&self, update: SessionUpdate) {
        if self.updates.send(ClientEvent::SessionUpdate(update)).is_err() {
            debug!("client event receiver dropped; permission update discarded");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PermissionQueue<M>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
