//! Spawn-ready command lines.
//!
//! GUI-launched editors do not inherit the user's shell environment, so on
//! macOS and Linux every agent is started through a login shell
//! (`-l -c "<quoted argv>"`). On Windows the command either goes through
//! WSL or is passed through unchanged for the native shell.

use std::path::Path;

use super::{wsl, HostPlatform, LaunchOptions};

/// A program and its arguments, ready for [`tokio::process::Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
}

/// Inputs for [`wrap_command_for_platform`].
#[derive(Debug, Clone, Copy)]
pub struct WrapOptions<'a> {
    /// Target command.
    pub command: &'a str,
    /// Target arguments.
    pub args: &'a [String],
    /// Working directory; only used for WSL translation.
    pub cwd: &'a Path,
    /// Platform settings.
    pub launch: &'a LaunchOptions,
}

/// Wrap `command` for the host platform.
///
/// - Windows + WSL: `wsl.exe [-d <distro>] --cd <cwd> -- sh -lc "<argv>"`.
/// - macOS/Linux: `<login shell> -l -c "<argv>"`, with an optional
///   `export PATH='<node dir>':"$PATH";` prefix.
/// - Native Windows: unchanged.
#[must_use]
pub fn wrap_command_for_platform(options: WrapOptions<'_>) -> CommandSpec {
    let launch = options.launch;

    if launch.uses_wsl() {
        return wsl::wrap_command_for_wsl(
            options.command,
            options.args,
            options.cwd,
            launch.wsl_distribution.as_deref(),
            launch.node_dir.as_deref(),
        );
    }

    if launch.platform.is_windows() {
        return CommandSpec {
            command: options.command.to_owned(),
            args: options.args.to_vec(),
        };
    }

    wrap_in_login_shell(
        options.command,
        options.args,
        launch.node_dir.as_deref(),
        launch.platform,
    )
}

/// Wrap `command` in the platform login shell.
#[must_use]
pub fn wrap_in_login_shell(
    command: &str,
    args: &[String],
    node_dir: Option<&str>,
    platform: HostPlatform,
) -> CommandSpec {
    let command_line = quote_argv(command, args);
    let full = match node_dir {
        Some(dir) => format!("export PATH={}:\"$PATH\"; {command_line}", shell_quote(dir)),
        None => command_line,
    };

    CommandSpec {
        command: platform.login_shell().to_owned(),
        args: vec!["-l".to_owned(), "-c".to_owned(), full],
    }
}

/// Single-quote `arg` for a POSIX shell, escaping embedded quotes as `'\''`.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quote a full argv into one shell command string.
#[must_use]
pub fn quote_argv(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a command line uses shell syntax (pipes, redirects, quoting…).
#[must_use]
pub fn has_shell_syntax(command: &str) -> bool {
    command.contains(['|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '"'])
}

/// Split a bare command line, or hand it to a shell when it needs one.
#[must_use]
pub fn wrap_in_shell_if_needed(command: &str, platform: HostPlatform) -> CommandSpec {
    if !has_shell_syntax(command) {
        let mut parts = command.split(' ').filter(|part| !part.is_empty());
        let program = parts.next().unwrap_or(command).to_owned();
        return CommandSpec {
            command: program,
            args: parts.map(str::to_owned).collect(),
        };
    }

    if platform.is_windows() {
        CommandSpec {
            command: "cmd.exe".to_owned(),
            args: vec!["/c".to_owned(), command.to_owned()],
        }
    } else {
        CommandSpec {
            command: "/bin/sh".to_owned(),
            args: vec!["-c".to_owned(), command.to_owned()],
        }
    }
}
