//! Codex approval requests on top of the shared permission queue.
//!
//! Codex repeats approval events more eagerly than ACP agents, so a request
//! whose call id is already queued is dropped. The answer travels back
//! over one of two routes: patches through an
//! `apply_patch_approval_response` request, everything else as the
//! response frame of the original role-reversed request.

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::driver::ClientEvent;
use crate::models::{PermissionOption, PermissionOptionKind, ToolCallStatus, ToolKind};
use crate::permission::{
    Admission, ApprovalRequest, AutoApprovePolicy, PermissionBroker, PermissionOutcome,
    StatusStyle, ToolCallSummary,
};

/// How a decision reaches Codex.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalRoute {
    /// `apply_patch_approval_response` carrying the patch's changes.
    Patch {
        /// File changes echoed back.
        changes: Map<String, Value>,
    },
    /// Response frame to the recorded elicitation request.
    Elicitation,
}

/// Correlation data kept with each queued Codex request.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexApproval {
    /// Codex call id, or the generated tool call id when Codex sent none.
    pub call_id: String,
    /// Answer route.
    pub route: ApprovalRoute,
}

/// An approval request as decoded from a Codex event.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexPermissionRequest {
    /// Session to attribute the tool call to.
    pub session_id: String,
    /// Codex call id; may be empty.
    pub call_id: String,
    /// Wire tool kind, e.g. `execute` or `edit`.
    pub kind: String,
    /// Tool call title.
    pub title: String,
    /// Options; [`default_options`] when Codex offers none.
    pub options: Vec<PermissionOption>,
    /// Answer route.
    pub route: ApprovalRoute,
}

/// A decision ready to be sent to Codex.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Correlation data of the request.
    pub approval: CodexApproval,
    /// Whether the chosen option allows the call.
    pub approved: bool,
}

/// Result of [`CodexPermissionHandler::receive`].
#[derive(Debug, Clone, PartialEq)]
pub enum CodexAdmission {
    /// Same call id already queued; ignored.
    Duplicate,
    /// Waiting for the user.
    Queued {
        /// Generated request id.
        request_id: String,
    },
    /// Decided by the auto-approval policy.
    Decided(Decision),
}

/// `Allow once` / `Reject`, offered when Codex sends no options.
#[must_use]
pub fn default_options() -> Vec<PermissionOption> {
    vec![
        PermissionOption {
            option_id: "allow_once".into(),
            name: "Allow once".into(),
            kind: PermissionOptionKind::AllowOnce,
        },
        PermissionOption {
            option_id: "reject_once".into(),
            name: "Reject".into(),
            kind: PermissionOptionKind::RejectOnce,
        },
    ]
}

/// Codex permission handler.
#[derive(Debug)]
pub struct CodexPermissionHandler {
    broker: PermissionBroker<CodexApproval>,
}

impl CodexPermissionHandler {
    /// Create a handler reporting to `updates`.
    #[must_use]
    pub fn new(policy: AutoApprovePolicy, updates: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            broker: PermissionBroker::new(
                policy,
                StatusStyle {
                    on_resolve: Some(ToolCallStatus::Completed),
                    on_promote: Some(ToolCallStatus::Pending),
                },
                updates,
            ),
        }
    }

    /// Queue or auto-decide a request.
    pub fn receive(&self, request: CodexPermissionRequest) -> CodexAdmission {
        let tool_call_id = if request.call_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            request.call_id.clone()
        };
        if !request.call_id.is_empty()
            && self.broker.any(|entry| {
                entry.meta.call_id == request.call_id && entry.tool_call_id == tool_call_id
            })
        {
            debug!(call_id = %request.call_id, "duplicate codex approval ignored");
            return CodexAdmission::Duplicate;
        }

        let options = if request.options.is_empty() {
            default_options()
        } else {
            request.options
        };
        let approval = CodexApproval {
            call_id: if request.call_id.is_empty() {
                tool_call_id.clone()
            } else {
                request.call_id
            },
            route: request.route,
        };

        let admission = self.broker.admit(ApprovalRequest {
            session_id: request.session_id,
            tool_call_id,
            summary: ToolCallSummary {
                title: Some(request.title),
                kind: Some(ToolKind::from_wire(&request.kind)),
                status: Some(ToolCallStatus::Pending),
                locations: None,
            },
            wire_kind: Some(request.kind),
            options: options.clone(),
            meta: approval,
        });

        match admission {
            Admission::AutoResolved { outcome, meta } => {
                let approved = match outcome {
                    PermissionOutcome::Selected { option_id } => options
                        .iter()
                        .any(|option| option.option_id == option_id && option.kind.is_allow()),
                    PermissionOutcome::Cancelled => false,
                };
                CodexAdmission::Decided(Decision {
                    approval: meta,
                    approved,
                })
            }
            Admission::Queued { request_id, .. } => CodexAdmission::Queued { request_id },
        }
    }

    /// Apply a user answer. `None` for unknown request ids.
    pub fn respond(&self, request_id: &str, option_id: &str) -> Option<Decision> {
        let resolved = self.broker.respond(request_id, option_id)?;
        Some(Decision {
            approved: resolved.is_approved(),
            approval: resolved.meta,
        })
    }

    /// Cancel every queued request and return their correlation data.
    pub fn cancel_all(&self) -> Vec<CodexApproval> {
        self.broker.cancel_all()
    }

    /// Queued request ids, active first.
    #[must_use]
    pub fn queued_request_ids(&self) -> Vec<String> {
        self.broker.queued_request_ids()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.broker.pending_count()
    }
}
