//! FIFO queue of outstanding permission requests.
//!
//! The queue head is the active request; every other entry is waiting.
//! Because activity is positional there is no flag that could drift out of
//! sync: "exactly one active request while non-empty" holds structurally.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::models::{PermissionOption, PermissionRequestView};

/// Final answer to a permission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// An option was chosen.
    Selected {
        /// The chosen option.
        option_id: String,
    },
    /// The request was withdrawn without a decision.
    Cancelled,
}

/// One queued request plus protocol-specific correlation data `M`.
#[derive(Debug)]
pub struct PendingPermission<M> {
    /// Locally generated identifier.
    pub request_id: String,
    /// Owning session.
    pub session_id: String,
    /// Tool call the request gates.
    pub tool_call_id: String,
    /// Normalized options.
    pub options: Vec<PermissionOption>,
    /// Protocol-specific data.
    pub meta: M,
    reply: Option<oneshot::Sender<PermissionOutcome>>,
}

impl<M> PendingPermission<M> {
    /// Create an entry with a fresh request id and a waiter for its outcome.
    pub fn new(
        session_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        options: Vec<PermissionOption>,
        meta: M,
    ) -> (Self, oneshot::Receiver<PermissionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let entry = Self {
            request_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            tool_call_id: tool_call_id.into(),
            options,
            meta,
            reply: Some(tx),
        };
        (entry, rx)
    }

    /// UI view of this request.
    #[must_use]
    pub fn view(&self, is_active: bool) -> PermissionRequestView {
        PermissionRequestView {
            request_id: self.request_id.clone(),
            options: self.options.clone(),
            selected_option_id: None,
            is_active,
            is_cancelled: false,
        }
    }

    /// Look up one of this request's options.
    #[must_use]
    pub fn option(&self, option_id: &str) -> Option<&PermissionOption> {
        self.options.iter().find(|option| option.option_id == option_id)
    }

    /// Deliver the outcome to whoever is waiting. A dropped waiter is fine.
    pub fn settle(&mut self, outcome: PermissionOutcome) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Ordered queue; the head is active.
#[derive(Debug)]
pub struct PermissionQueue<M> {
    entries: VecDeque<PendingPermission<M>>,
}

impl<M> Default for PermissionQueue<M> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<M> PermissionQueue<M> {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`; returns whether it became the active request.
    pub fn push(&mut self, entry: PendingPermission<M>) -> bool {
        self.entries.push_back(entry);
        self.entries.len() == 1
    }

    /// Remove a request by id.
    pub fn remove(&mut self, request_id: &str) -> Option<PendingPermission<M>> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.request_id == request_id)?;
        self.entries.remove(index)
    }

    /// The active request.
    #[must_use]
    pub fn active(&self) -> Option<&PendingPermission<M>> {
        self.entries.front()
    }

    /// Whether `request_id` is the active request.
    #[must_use]
    pub fn is_active(&self, request_id: &str) -> bool {
        self.active()
            .is_some_and(|entry| entry.request_id == request_id)
    }

    /// First request matching `predicate`.
    pub fn find<P>(&self, predicate: P) -> Option<&PendingPermission<M>>
    where
        P: Fn(&PendingPermission<M>) -> bool,
    {
        self.entries.iter().find(|entry| predicate(entry))
    }

    /// Remove every request, in queue order.
    pub fn drain(&mut self) -> Vec<PendingPermission<M>> {
        self.entries.drain(..).collect()
    }

    /// Request ids in queue order.
    #[must_use]
    pub fn request_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.request_id.clone())
            .collect()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
