//! ACP `session/request_permission` handling.
//!
//! The agent blocks on a JSON-RPC request until the user answers, so each
//! queued request yields a [`PermissionTicket`] the adapter awaits before
//! writing the response frame.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use super::schema::{
    PermissionOutcomeWire, PermissionResponse, RequestPermissionParams,
};
use crate::driver::ClientEvent;
use crate::models::{ToolCallStatus, ToolKind};
use crate::permission::{
    normalize_options, Admission, ApprovalRequest, AutoApprovePolicy, PermissionBroker,
    PermissionOutcome, RawOption, StatusStyle, ToolCallSummary,
};

/// Answer to a permission request, possibly still pending.
#[derive(Debug)]
pub enum PermissionTicket {
    /// Resolved on arrival by the auto-approval policy.
    Ready(PermissionOutcome),
    /// Queued; resolves on user response or cancellation.
    Waiting(oneshot::Receiver<PermissionOutcome>),
}

impl PermissionTicket {
    /// Wait for the outcome. A dropped queue counts as cancelled.
    pub async fn outcome(self) -> PermissionOutcome {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Waiting(rx) => rx.await.unwrap_or(PermissionOutcome::Cancelled),
        }
    }
}

/// FIFO permission handler for one ACP adapter.
#[derive(Debug)]
pub struct AcpPermissionHandler {
    broker: PermissionBroker<()>,
}

impl AcpPermissionHandler {
    /// Create a handler that reports UI state to `updates`.
    #[must_use]
    pub fn new(policy: AutoApprovePolicy, updates: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            broker: PermissionBroker::new(policy, StatusStyle::default(), updates),
        }
    }

    /// Admit an agent request.
    pub fn receive(&self, params: RequestPermissionParams) -> PermissionTicket {
        let tool_call = params.tool_call;
        let tool_call_id = if tool_call.tool_call_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            tool_call.tool_call_id
        };
        let options = normalize_options(
            &params
                .options
                .into_iter()
                .map(|option| RawOption {
                    option_id: option.option_id,
                    name: option.name,
                    kind: option.kind,
                })
                .collect::<Vec<_>>(),
        );

        let request = ApprovalRequest {
            session_id: params.session_id,
            tool_call_id,
            summary: ToolCallSummary {
                title: tool_call.title,
                kind: tool_call.kind.as_deref().map(ToolKind::from_wire),
                status: Some(
                    tool_call
                        .status
                        .as_deref()
                        .map(ToolCallStatus::from_wire)
                        .unwrap_or_default(),
                ),
                locations: tool_call.locations,
            },
            wire_kind: tool_call.kind,
            options,
            meta: (),
        };

        match self.broker.admit(request) {
            Admission::AutoResolved { outcome, .. } => PermissionTicket::Ready(outcome),
            Admission::Queued {
                request_id,
                outcome,
                ..
            } => {
                debug!(request_id, "acp permission request waiting for user");
                PermissionTicket::Waiting(outcome)
            }
        }
    }

    /// Apply a user answer. Returns `false` for unknown request ids.
    pub fn respond(&self, request_id: &str, option_id: &str) -> bool {
        self.broker.respond(request_id, option_id).is_some()
    }

    /// Cancel every outstanding request; returns how many there were.
    pub fn cancel_all(&self) -> usize {
        self.broker.cancel_all().len()
    }

    /// Queued request ids, active first.
    #[must_use]
    pub fn queued_request_ids(&self) -> Vec<String> {
        self.broker.queued_request_ids()
    }

    /// Id of the active request.
    #[must_use]
    pub fn active_request_id(&self) -> Option<String> {
        self.broker.active_request_id()
    }
}

/// `session/request_permission` result for `outcome`.
#[must_use]
pub fn response_payload(outcome: PermissionOutcome) -> Value {
    let outcome = match outcome {
        PermissionOutcome::Selected { option_id } => PermissionOutcomeWire::Selected { option_id },
        PermissionOutcome::Cancelled => PermissionOutcomeWire::Cancelled,
    };
    serde_json::to_value(PermissionResponse { outcome }).unwrap_or(Value::Null)
}
