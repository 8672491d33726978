#![forbid(unsafe_code)]

//! `cchub`: agent protocol core for editor-embedded coding agents.
//!
//! Launches agent CLIs (Claude Code, Gemini CLI, Codex, ...) as child
//! processes, speaks ACP or the Codex MCP variant with them over stdio, and
//! turns their traffic into [`models::SessionUpdate`]s and permission
//! requests delivered over a channel.

pub mod acp;
pub mod agents;
pub mod codex;
pub mod config;
pub mod driver;
pub mod errors;
pub mod models;
pub mod permission;
pub mod platform;
pub mod process;
pub mod rpc;
pub mod terminal;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
