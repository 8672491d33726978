//! Agent Client Protocol (ACP) support.
//!
//! ACP agents speak newline-delimited JSON-RPC 2.0 over stdio. The agent
//! drives most of the conversation: it streams `session/update`
//! notifications and calls back into the client for permissions and
//! terminals.
//!
//! - `codec`: NDJSON framing.
//! - `schema`: typed wire payloads.
//! - `connection`: process lifecycle and the `initialize` handshake.
//! - `translator`: `session/update` → [`SessionUpdate`](crate::models::SessionUpdate).
//! - `permission`: `session/request_permission` queueing.
//! - `adapter`: the [`AgentClient`](crate::driver::AgentClient) façade.

pub mod adapter;
pub mod codec;
pub mod connection;
pub mod permission;
pub mod schema;
pub mod translator;

pub use adapter::AcpAdapter;
pub use codec::{AcpCodec, AcpFrameDecoder};
pub use connection::AcpConnection;
pub use permission::{AcpPermissionHandler, PermissionTicket};
