//! Built-in agent module definitions.
//!
//! A module describes how to launch one family of agent CLIs: which
//! protocol it speaks, which executables to look for, which arguments it
//! needs to enter agent mode and where an API key goes.

use std::time::Duration;

use crate::models::AgentProtocol;

/// Where required arguments go relative to configured ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsPlacement {
    /// Required args first, duplicates removed from the configured ones.
    Prepend,
    /// Missing required args added at the end.
    Append,
}

/// Handshake budgets a module needs beyond the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutProfile {
    /// Readiness check budget.
    pub initialize: Duration,
    /// Session creation budget.
    pub new_session: Duration,
}

/// Launch recipe for one agent CLI family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentModule {
    /// Module id, e.g. `acp:gemini`.
    pub id: &'static str,
    /// Wire protocol.
    pub protocol: AgentProtocol,
    /// Display name.
    pub label: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Executables tried in order when no command is configured.
    pub command_candidates: &'static [&'static str],
    /// Arguments the CLI needs to speak the protocol.
    pub required_args: &'static [&'static str],
    /// Placement of [`required_args`](Self::required_args).
    pub args_placement: ArgsPlacement,
    /// Environment variable receiving the profile's API key.
    pub api_key_env: Option<&'static str>,
    /// Setup advice for the settings screen.
    pub setup_hint: Option<&'static str>,
    /// Longer handshake budgets, if the CLI is slow to start.
    pub timeouts: Option<TimeoutProfile>,
    /// Environment applied before the profile's own variables.
    pub default_env: &'static [(&'static str, &'static str)],
}

const BASE: AgentModule = AgentModule {
    id: "acp:custom",
    protocol: AgentProtocol::Acp,
    label: "Custom ACP",
    description: "User-configured ACP agent.",
    command_candidates: &[],
    required_args: &[],
    args_placement: ArgsPlacement::Append,
    api_key_env: None,
    setup_hint: None,
    timeouts: None,
    default_env: &[],
};

/// Module used for profiles with a missing or unknown module id.
pub const FALLBACK_MODULE: AgentModule = BASE;

static MODULES: [AgentModule; 11] = [
    AgentModule {
        id: "acp:claude",
        label: "Claude Code",
        description: "Claude Code CLI via ACP.",
        command_candidates: &["claude-code-acp", "claude"],
        api_key_env: Some("ANTHROPIC_API_KEY"),
        setup_hint: Some("Claude Code uses claude-code-acp (or claude) as the ACP command."),
        ..BASE
    },
    AgentModule {
        id: "acp:gemini",
        label: "Gemini CLI",
        description: "Gemini CLI via ACP.",
        command_candidates: &["gemini"],
        required_args: &["--experimental-acp"],
        api_key_env: Some("GOOGLE_API_KEY"),
        setup_hint: Some("Gemini CLI requires --experimental-acp to enable ACP."),
        ..BASE
    },
    AgentModule {
        id: "acp:codex",
        label: "Codex (ACP)",
        description: "Codex CLI in ACP mode.",
        command_candidates: &["codex-acp"],
        api_key_env: Some("OPENAI_API_KEY"),
        setup_hint: Some("Codex ACP typically uses the codex-acp binary."),
        ..BASE
    },
    AgentModule {
        id: "mcp:codex",
        protocol: AgentProtocol::Mcp,
        label: "Codex (MCP)",
        description: "Codex CLI MCP server.",
        command_candidates: &["codex"],
        api_key_env: Some("OPENAI_API_KEY"),
        setup_hint: Some("Codex MCP uses the codex command."),
        timeouts: Some(TimeoutProfile {
            initialize: Duration::from_secs(60),
            new_session: Duration::from_secs(120),
        }),
        ..BASE
    },
    AgentModule {
        id: "acp:qwen",
        label: "Qwen Code",
        description: "Qwen Code CLI via ACP.",
        command_candidates: &["qwen"],
        required_args: &["--experimental-acp"],
        setup_hint: Some("Qwen Code typically needs --experimental-acp to enable ACP."),
        ..BASE
    },
    AgentModule {
        id: "acp:iflow",
        label: "iFlow CLI",
        description: "iFlow CLI via ACP.",
        command_candidates: &["iflow"],
        required_args: &["--experimental-acp"],
        ..BASE
    },
    AgentModule {
        id: "acp:goose",
        label: "Goose",
        description: "Goose CLI (acp subcommand).",
        command_candidates: &["goose"],
        required_args: &["acp"],
        args_placement: ArgsPlacement::Prepend,
        setup_hint: Some("Goose starts via the goose acp subcommand."),
        ..BASE
    },
    AgentModule {
        id: "acp:auggie",
        label: "Augment Code",
        description: "Augment Code CLI.",
        command_candidates: &["auggie"],
        required_args: &["--acp"],
        setup_hint: Some("Augment Code starts with --acp."),
        ..BASE
    },
    AgentModule {
        id: "acp:kimi",
        label: "Kimi CLI",
        description: "Kimi CLI via ACP.",
        command_candidates: &["kimi"],
        required_args: &["--acp"],
        ..BASE
    },
    AgentModule {
        id: "acp:opencode",
        label: "OpenCode",
        description: "OpenCode CLI (acp subcommand).",
        command_candidates: &["opencode"],
        required_args: &["acp"],
        args_placement: ArgsPlacement::Prepend,
        ..BASE
    },
    AgentModule {
        setup_hint: Some("Provide a command path or executable name."),
        ..BASE
    },
];

/// All built-in modules.
#[must_use]
pub fn modules() -> &'static [AgentModule] {
    &MODULES
}

/// Built-in module by id.
#[must_use]
pub fn module_by_id(id: &str) -> Option<&'static AgentModule> {
    MODULES.iter().find(|module| module.id == id)
}

/// Module for an optional id, falling back to [`FALLBACK_MODULE`].
#[must_use]
pub fn module_or_fallback(id: Option<&str>) -> AgentModule {
    id.and_then(module_by_id).copied().unwrap_or(FALLBACK_MODULE)
}
