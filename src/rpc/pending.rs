//! Outstanding request table keyed by locally generated ids.
//!
//! Ids are strictly increasing and never reused for the lifetime of the
//! table. Each id maps to at most one waiter. Dropping an entry's sender
//! (through [`PendingRequests::fail_all`]) wakes its waiter with a closed
//! channel, which callers surface as "connection closed".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::RpcError;

/// What a waiter receives when its response arrives.
pub type Reply = Result<Value, RpcError>;

/// Correlation table for in-flight requests.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
}

impl PendingRequests {
    /// Create an empty table whose first id is `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and register a waiter for it.
    pub fn register(&self) -> (u64, oneshot::Receiver<Reply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver a response. Returns `false` when the id is unknown, which
    /// happens for late answers to timed-out requests.
    pub fn resolve(&self, id: &Value, reply: Reply) -> bool {
        let Some(key) = id_key(id) else {
            debug!(%id, "response with non-numeric id dropped");
            return false;
        };
        let Some(tx) = self.lock().remove(&key) else {
            debug!(id = key, "response for unknown id dropped");
            return false;
        };
        // The waiter may have given up already; nothing to do then.
        let _ = tx.send(reply);
        true
    }

    /// Remove a single entry without resolving it.
    pub fn forget(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Drop every entry so that all waiters observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accept numeric ids and numeric strings; peers echo ids back verbatim
/// but some stringify them.
fn id_key(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
