//! Global configuration parsing, validation, and credential loading.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::permission::AutoApprovePolicy;
use crate::platform::env::resolve_command_directory;
use crate::platform::{HostPlatform, LaunchOptions};
use crate::{AppError, Result};

/// Keychain service under which agent API keys are stored.
const KEYRING_SERVICE: &str = "cchub";

/// Configurable timeout values (seconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// ACP `initialize` handshake.
    pub initialize_seconds: u64,
    /// ACP `session/new`.
    pub new_session_seconds: u64,
    /// Codex readiness check (`tools/list`).
    pub codex_initialize_seconds: u64,
    /// Codex session setup.
    pub codex_new_session_seconds: u64,
    /// Default budget of a single JSON-RPC request.
    pub request_seconds: u64,
    /// Budget of a prompt turn before it is treated as still streaming.
    pub prompt_seconds: u64,
    /// Delay between releasing a terminal and discarding its output.
    pub terminal_release_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            initialize_seconds: 20,
            new_session_seconds: 10,
            codex_initialize_seconds: 60,
            codex_new_session_seconds: 120,
            request_seconds: 60,
            prompt_seconds: 600,
            terminal_release_grace_seconds: 30,
        }
    }
}

/// Budgets of the two handshake steps for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTimeouts {
    /// Protocol readiness check.
    pub initialize: Duration,
    /// Session creation.
    pub new_session: Duration,
}

impl TimeoutConfig {
    /// Handshake budgets; Codex agents start slower and get longer ones.
    #[must_use]
    pub fn handshake(&self, codex: bool) -> HandshakeTimeouts {
        if codex {
            HandshakeTimeouts {
                initialize: Duration::from_secs(self.codex_initialize_seconds),
                new_session: Duration::from_secs(self.codex_new_session_seconds),
            }
        } else {
            HandshakeTimeouts {
                initialize: Duration::from_secs(self.initialize_seconds),
                new_session: Duration::from_secs(self.new_session_seconds),
            }
        }
    }

    /// Default request budget.
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_seconds)
    }

    /// Prompt turn budget.
    #[must_use]
    pub fn prompt(&self) -> Duration {
        Duration::from_secs(self.prompt_seconds)
    }

    /// Terminal release grace period.
    #[must_use]
    pub fn terminal_release_grace(&self) -> Duration {
        Duration::from_secs(self.terminal_release_grace_seconds)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("initialize_seconds", self.initialize_seconds),
            ("new_session_seconds", self.new_session_seconds),
            ("codex_initialize_seconds", self.codex_initialize_seconds),
            ("codex_new_session_seconds", self.codex_new_session_seconds),
            ("request_seconds", self.request_seconds),
            ("prompt_seconds", self.prompt_seconds),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(AppError::Config(format!(
                "timeouts.{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

/// One configured agent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentProfile {
    /// Unique agent identifier.
    pub id: String,
    /// Display name; defaults to the module's name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Module identifier such as `acp:claude`; unknown ids use `acp:custom`.
    #[serde(default)]
    pub module_id: Option<String>,
    /// Whether the agent is selectable.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit command; detected from `PATH` when absent.
    #[serde(default)]
    pub command: Option<String>,
    /// Explicit arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// API key injected under the module's key variable.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_codex_agent_id() -> String {
    "codex".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Node.js executable or directory prepended to `PATH`.
    #[serde(default)]
    pub node_path: Option<String>,
    /// Route agents through WSL on Windows.
    #[serde(default)]
    pub windows_wsl_mode: bool,
    /// WSL distribution; the default one when absent.
    #[serde(default)]
    pub windows_wsl_distribution: Option<String>,
    /// Auto-approve `read` tool calls.
    #[serde(default)]
    pub auto_approve_read: bool,
    /// Auto-approve `list` and `search` tool calls.
    #[serde(default)]
    pub auto_approve_list: bool,
    /// Auto-approve `execute` tool calls.
    #[serde(default)]
    pub auto_approve_execute: bool,
    /// Agent id the router sends to the Codex adapter.
    #[serde(default = "default_codex_agent_id")]
    pub codex_agent_id: String,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Configured agents.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
    /// Agent selected when none is requested.
    #[serde(default)]
    pub default_agent: Option<String>,
    /// Working directory for sessions; the process cwd when absent.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            node_path: None,
            windows_wsl_mode: false,
            windows_wsl_distribution: None,
            auto_approve_read: false,
            auto_approve_list: false,
            auto_approve_execute: false,
            codex_agent_id: default_codex_agent_id(),
            timeouts: TimeoutConfig::default(),
            agents: Vec::new(),
            default_agent: None,
            working_directory: None,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Immutable snapshot consumed by the adapters and the router.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            launch: LaunchOptions {
                platform: HostPlatform::current(),
                wsl_mode: self.windows_wsl_mode,
                wsl_distribution: self
                    .windows_wsl_distribution
                    .clone()
                    .filter(|distro| !distro.trim().is_empty()),
                node_dir: self
                    .node_path
                    .as_deref()
                    .and_then(resolve_command_directory),
            },
            auto_approve: AutoApprovePolicy {
                read: self.auto_approve_read,
                list: self.auto_approve_list,
                execute: self.auto_approve_execute,
            },
            timeouts: self.timeouts.clone(),
            codex_agent_id: self.codex_agent_id.clone(),
        }
    }

    /// Enabled agent profile by id.
    #[must_use]
    pub fn agent(&self, id: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|agent| agent.enabled && agent.id == id)
    }

    /// The requested agent, else `default_agent`, else the first enabled one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when nothing matches.
    pub fn select_agent(&self, requested: Option<&str>) -> Result<&AgentProfile> {
        let wanted = requested.or(self.default_agent.as_deref());
        let found = match wanted {
            Some(id) => self.agent(id),
            None => self.agents.iter().find(|agent| agent.enabled),
        };
        found.ok_or_else(|| {
            AppError::NotFound(match wanted {
                Some(id) => format!("no enabled agent with id '{id}'"),
                None => "no enabled agents configured".into(),
            })
        })
    }

    /// Session working directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither a configured directory nor the
    /// process cwd is available.
    pub fn working_directory(&self) -> Result<PathBuf> {
        match &self.working_directory {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir()
                .map_err(|err| AppError::Config(format!("cannot determine cwd: {err}"))),
        }
    }

    /// Fill missing API keys from the OS keychain.
    ///
    /// Keys are stored under the `cchub` service as `<agent id>_api_key`.
    /// A missing entry is not an error; the agent may authenticate some
    /// other way.
    pub async fn load_credentials(&mut self) {
        for agent in self.agents.iter_mut().filter(|agent| agent.api_key.is_none()) {
            agent.api_key = load_credential(&format!("{}_api_key", agent.id)).await;
        }
    }

    fn validate(&self) -> Result<()> {
        self.timeouts.validate()?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(AppError::Config("agent id must not be empty".into()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }

        if let Some(default) = &self.default_agent {
            if !seen.contains(default.as_str()) {
                return Err(AppError::Config(format!(
                    "default_agent '{default}' is not a configured agent"
                )));
            }
        }

        if self.codex_agent_id.trim().is_empty() {
            return Err(AppError::Config("codex_agent_id must not be empty".into()));
        }

        Ok(())
    }
}

/// Settings snapshot read by the protocol core; never mutated by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Platform wrapping and Node.js `PATH` override.
    pub launch: LaunchOptions,
    /// Auto-approval flags.
    pub auto_approve: AutoApprovePolicy,
    /// Timeout budgets.
    pub timeouts: TimeoutConfig,
    /// Agent id routed to the Codex adapter.
    pub codex_agent_id: String,
}

impl Settings {
    /// Whether `agent_id` is the designated Codex agent.
    #[must_use]
    pub fn is_codex_agent(&self, agent_id: &str) -> bool {
        agent_id == self.codex_agent_id
    }

    /// Handshake budgets for `agent_id`.
    #[must_use]
    pub fn handshake_for(&self, agent_id: &str) -> HandshakeTimeouts {
        self.timeouts.handshake(self.is_codex_agent(agent_id))
    }
}

impl Default for Settings {
    fn default() -> Self {
        GlobalConfig::default().settings()
    }
}

/// Load a single credential from the OS keychain.
async fn load_credential(key: &str) -> Option<String> {
    let owned = key.to_owned();

    // keyring is synchronous I/O.
    let lookup = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &owned).and_then(|entry| entry.get_password())
    })
    .await;

    match lookup {
        Ok(Ok(value)) if !value.is_empty() => Some(value),
        Ok(Ok(_)) => {
            warn!(key, "keychain entry is empty");
            None
        }
        Ok(Err(keyring::Error::NoEntry)) => {
            debug!(key, "no keychain entry");
            None
        }
        Ok(Err(err)) => {
            warn!(key, ?err, "keychain lookup failed");
            None
        }
        Err(err) => {
            warn!(key, %err, "keychain task panicked");
            None
        }
    }
}
