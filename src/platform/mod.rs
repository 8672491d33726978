//! Host-platform helpers for launching agent processes.
//!
//! Everything here is a pure transformation of in-memory inputs except
//! [`detector`], which searches the file system and memoizes the result.
//!
//! - `detector`: resolves bare command names against `PATH`.
//! - `command`: login-shell, WSL and shell-syntax wrapping.
//! - `env`: merged environment blocks for child processes.
//! - `wsl`: Windows → WSL path and command translation.

pub mod command;
pub mod detector;
pub mod env;
pub mod wsl;

use std::collections::BTreeMap;
use std::path::Path;

pub use command::{wrap_command_for_platform, CommandSpec, WrapOptions};
pub use detector::{CliDetector, DetectedCommand};
pub use env::build_process_env;

/// Operating system family the crate is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    MacOs,
    /// Linux and other Unix-likes.
    Linux,
}

impl HostPlatform {
    /// Platform of the running binary.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Whether this is Windows.
    #[must_use]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Login shell used to inherit the user's environment.
    #[must_use]
    pub fn login_shell(self) -> &'static str {
        match self {
            Self::MacOs => "/bin/zsh",
            Self::Linux | Self::Windows => "/bin/bash",
        }
    }

    /// `PATH` list separator.
    #[must_use]
    pub fn path_separator(self) -> char {
        if self.is_windows() {
            ';'
        } else {
            ':'
        }
    }
}

/// Launch-related settings shared by the agent connections and the
/// terminal manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Host platform to wrap commands for.
    pub platform: HostPlatform,
    /// Route commands through WSL (Windows only).
    pub wsl_mode: bool,
    /// WSL distribution; `None` uses the default one.
    pub wsl_distribution: Option<String>,
    /// Directory of the configured Node.js binary, prepended to `PATH`.
    pub node_dir: Option<String>,
}

impl LaunchOptions {
    /// Options for the running platform with no WSL and no Node override.
    #[must_use]
    pub fn native() -> Self {
        Self {
            platform: HostPlatform::current(),
            wsl_mode: false,
            wsl_distribution: None,
            node_dir: None,
        }
    }

    /// Whether WSL routing is in effect.
    #[must_use]
    pub fn uses_wsl(&self) -> bool {
        self.platform.is_windows() && self.wsl_mode
    }

    /// Whether the spawned command must go through the native Windows shell.
    #[must_use]
    pub fn needs_native_shell(&self) -> bool {
        self.platform.is_windows() && !self.wsl_mode
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::native()
    }
}

/// Spawn-ready command line plus its complete environment block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    /// Wrapped command line.
    pub spec: CommandSpec,
    /// Inherited environment overlaid with `custom` and the Node.js `PATH`.
    pub env: BTreeMap<String, String>,
}

/// Wrap `command` for the host platform and build its environment.
#[must_use]
pub fn prepare_command(
    command: &str,
    args: &[String],
    cwd: &Path,
    custom_env: &BTreeMap<String, String>,
    launch: &LaunchOptions,
) -> PreparedCommand {
    let spec = wrap_command_for_platform(WrapOptions {
        command,
        args,
        cwd,
        launch,
    });
    let env = build_process_env(
        env::inherited_env(),
        custom_env,
        launch.node_dir.as_deref(),
        launch.platform,
    );
    PreparedCommand { spec, env }
}
