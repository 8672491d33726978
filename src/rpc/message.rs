//! JSON-RPC 2.0 envelopes shared by both agent protocols.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol version string carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// `Method not found`.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// `Invalid params`.
pub const INVALID_PARAMS: i64 = -32602;

/// `Internal error`.
pub const INTERNAL_ERROR: i64 = -32603;

/// Substrings of `data.details` that mark an internal error as benign.
///
/// The list is a best-effort allowlist, not an exhaustive one.
const IGNORABLE_DETAILS: &[&str] = &["empty response text", "user aborted"];

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32601` for a method the client does not implement.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// `-32602` for malformed request parameters.
    #[must_use]
    pub fn invalid_params(detail: impl Display) -> Self {
        Self::new(INVALID_PARAMS, format!("invalid params: {detail}"))
    }

    /// `-32603` with a message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// Whether a prompt failing with this error should be swallowed.
    ///
    /// Matches an internal error whose `data.details` string mentions an
    /// empty response or a user abort.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        if self.code != INTERNAL_ERROR {
            return false;
        }
        self.data
            .as_ref()
            .and_then(|data| data.get("details"))
            .and_then(Value::as_str)
            .is_some_and(|details| IGNORABLE_DETAILS.iter().any(|needle| details.contains(needle)))
    }
}

impl Display for RpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests.
    Response {
        /// Correlation id as sent on the wire.
        id: Value,
        /// `result` or `error`.
        outcome: Result<Value, RpcError>,
    },
    /// Peer-initiated request expecting a response frame.
    Request {
        /// Peer's id, echoed back in the response.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// Fire-and-forget message.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
}

/// Classify a parsed frame. Returns `None` for values that are not
/// JSON-RPC objects.
#[must_use]
pub fn classify(mut frame: Value) -> Option<Incoming> {
    let object = frame.as_object_mut()?;
    let has_outcome = object.contains_key("result") || object.contains_key("error");

    if has_outcome {
        let id = object.remove("id")?;
        let outcome = match object.remove("error").filter(|e| !e.is_null()) {
            Some(error) => Err(serde_json::from_value(error.clone())
                .unwrap_or_else(|_| RpcError::internal(error.to_string()))),
            None => Ok(object.remove("result").unwrap_or(Value::Null)),
        };
        return Some(Incoming::Response { id, outcome });
    }

    let method = object.remove("method")?.as_str()?.to_owned();
    let params = object.remove("params").unwrap_or(Value::Null);
    match object.remove("id").filter(|id| !id.is_null()) {
        Some(id) => Some(Incoming::Request { id, method, params }),
        None => Some(Incoming::Notification { method, params }),
    }
}

/// `{jsonrpc, id, method, params}` request frame.
#[must_use]
pub fn request_frame(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "method": method, "params": params })
}

/// `{jsonrpc, method, params}` notification frame.
#[must_use]
pub fn notification_frame(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params })
}

/// Response frame answering a peer request.
#[must_use]
pub fn response_frame(id: &Value, outcome: Result<Value, RpcError>) -> Value {
    match outcome {
        Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error }),
    }
}
