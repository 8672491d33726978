//! Codex MCP server support.
//!
//! Codex is driven through its MCP server mode rather than ACP: a
//! conversation is a `tools/call` of the `codex` tool followed by
//! `codex-reply` calls, progress arrives as `codex/event` envelopes, and
//! approvals are role-reversed requests.

pub mod adapter;
pub mod connection;
pub mod events;
pub mod framer;
pub mod permission;

pub use adapter::CodexAdapter;
pub use connection::{CodexConnection, ElicitationDecision};
pub use events::CodexEvent;
pub use framer::CodexFramer;
pub use permission::CodexPermissionHandler;
