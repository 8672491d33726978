//! Domain model module declarations.

pub mod agent;
pub mod error;
pub mod session_update;

pub use agent::{
    AgentConfig, AgentProtocol, AuthMethod, InitializeResult, NewSessionResult,
    PromptCapabilities, PromptContent, SessionMode, SessionModeState, SessionModel,
    SessionModelState,
};
pub use error::{AgentError, ErrorCategory, Severity};
pub use session_update::{
    PermissionOption, PermissionOptionKind, PermissionRequestView, PlanEntry, SessionUpdate,
    SlashCommand, ToolCallContent, ToolCallEvent, ToolCallLocation, ToolCallStatus, ToolKind,
};
