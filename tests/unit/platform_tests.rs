//! Unit tests for platform command preparation.
//!
//! Covers:
//! - login-shell wrapping on macOS/Linux, pass-through on native Windows
//! - WSL wrapping and Windows-to-WSL path conversion
//! - shell-syntax detection for terminal command lines
//! - environment merging with a Node.js `PATH` override
//! - Node.js directory resolution

use std::collections::BTreeMap;
use std::path::Path;

use cchub::platform::command::{has_shell_syntax, shell_quote, wrap_in_shell_if_needed};
use cchub::platform::env::resolve_command_directory;
use cchub::platform::wsl::convert_windows_path_to_wsl;
use cchub::platform::{
    build_process_env, wrap_command_for_platform, HostPlatform, LaunchOptions, WrapOptions,
};

fn launch(platform: HostPlatform, wsl_mode: bool) -> LaunchOptions {
    LaunchOptions {
        platform,
        wsl_mode,
        wsl_distribution: None,
        node_dir: None,
    }
}

fn wrap(launch: &LaunchOptions, command: &str, args: &[&str]) -> (String, Vec<String>) {
    let args: Vec<String> = args.iter().map(|arg| (*arg).to_owned()).collect();
    let spec = wrap_command_for_platform(WrapOptions {
        command,
        args: &args,
        cwd: Path::new(r"C:\Users\me\repo"),
        launch,
    });
    (spec.command, spec.args)
}

// ── Command wrapping ──────────────────────────────────────────────────────────

/// macOS uses zsh and Linux bash, both as login shells with quoted argv.
#[test]
fn unix_commands_run_in_login_shell() {
    let (command, args) = wrap(&launch(HostPlatform::MacOs, false), "claude", &["--flag"]);
    assert_eq!(command, "/bin/zsh");
    assert_eq!(args, vec!["-l", "-c", "'claude' '--flag'"]);

    let (command, _) = wrap(&launch(HostPlatform::Linux, false), "claude", &[]);
    assert_eq!(command, "/bin/bash");
}

/// The Node.js directory is exported ahead of the command.
#[test]
fn node_dir_is_exported_in_login_shell() {
    let mut options = launch(HostPlatform::Linux, false);
    options.node_dir = Some("/opt/node/bin".into());
    let (_, args) = wrap(&options, "npx", &["agent"]);
    assert_eq!(args[2], "export PATH='/opt/node/bin':\"$PATH\"; 'npx' 'agent'");
}

/// Native Windows passes the command through untouched.
#[test]
fn native_windows_is_passthrough() {
    let options = launch(HostPlatform::Windows, false);
    assert!(options.needs_native_shell());
    let (command, args) = wrap(&options, "gemini.cmd", &["--experimental-acp"]);
    assert_eq!(command, "gemini.cmd");
    assert_eq!(args, vec!["--experimental-acp"]);
}

/// WSL mode routes through `wsl.exe` with the converted working directory.
#[test]
fn wsl_mode_wraps_in_wsl() {
    let mut options = launch(HostPlatform::Windows, true);
    options.wsl_distribution = Some("Ubuntu".into());
    assert!(options.uses_wsl());
    assert!(!options.needs_native_shell());

    let (command, args) = wrap(&options, "claude", &[]);
    assert_eq!(command, "wsl.exe");
    assert_eq!(args[..4], ["-d", "Ubuntu", "--cd", "/mnt/c/Users/me/repo"]);
    assert_eq!(args.last().map(String::as_str), Some("'claude'"));
}

/// WSL mode is ignored off Windows.
#[test]
fn wsl_mode_requires_windows() {
    let options = launch(HostPlatform::Linux, true);
    assert!(!options.uses_wsl());
    let (command, _) = wrap(&options, "claude", &[]);
    assert_eq!(command, "/bin/bash");
}

#[test]
fn windows_paths_convert_to_wsl_mounts() {
    assert_eq!(convert_windows_path_to_wsl(r"D:\src\app"), "/mnt/d/src/app");
    assert_eq!(convert_windows_path_to_wsl("c:/tmp"), "/mnt/c/tmp");
    assert_eq!(convert_windows_path_to_wsl(r"relative\dir"), "relative/dir");
}

#[test]
fn single_quotes_are_escaped() {
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
}

// ── Shell syntax ──────────────────────────────────────────────────────────────

/// Pipes, redirects, substitutions and quotes need a shell; plain words do not.
#[test]
fn shell_syntax_detection() {
    for line in ["ls | wc -l", "make && make test", "echo $HOME", "cat < in", "echo \"hi\"", "a; b"] {
        assert!(has_shell_syntax(line), "{line} needs a shell");
    }
    for line in ["cargo test", "npm run build", "ls -la src/"] {
        assert!(!has_shell_syntax(line), "{line} does not need a shell");
    }
}

/// Plain lines are split into program and args; others go to `sh -c`.
#[test]
fn shell_wrapping_for_terminal_lines() {
    let plain = wrap_in_shell_if_needed("cargo  test --lib", HostPlatform::Linux);
    assert_eq!(plain.command, "cargo");
    assert_eq!(plain.args, vec!["test", "--lib"]);

    let piped = wrap_in_shell_if_needed("ls | wc -l", HostPlatform::Linux);
    assert_eq!(piped.command, "/bin/sh");
    assert_eq!(piped.args, vec!["-c", "ls | wc -l"]);

    let windows = wrap_in_shell_if_needed("dir > out.txt", HostPlatform::Windows);
    assert_eq!(windows.command, "cmd.exe");
    assert_eq!(windows.args, vec!["/c", "dir > out.txt"]);
}

// ── Environment ───────────────────────────────────────────────────────────────

/// Custom variables win and the Node.js directory is prepended to `PATH`.
#[test]
fn env_merges_custom_and_node_path() {
    let base = vec![
        ("PATH".to_owned(), "/usr/bin".to_owned()),
        ("HOME".to_owned(), "/home/me".to_owned()),
    ];
    let custom = BTreeMap::from([("HOME".to_owned(), "/tmp/home".to_owned())]);

    let env = build_process_env(base, &custom, Some("/opt/node/bin"), HostPlatform::Linux);
    assert_eq!(env.get("PATH").map(String::as_str), Some("/opt/node/bin:/usr/bin"));
    assert_eq!(env.get("HOME").map(String::as_str), Some("/tmp/home"));
}

/// On Windows the existing `Path` key is reused with `;` as separator.
#[test]
fn windows_env_reuses_path_key() {
    let base = vec![("Path".to_owned(), r"C:\Windows".to_owned())];
    let env = build_process_env(base, &BTreeMap::new(), Some(r"C:\node"), HostPlatform::Windows);
    assert_eq!(env.get("Path").map(String::as_str), Some(r"C:\node;C:\Windows"));
    assert!(!env.contains_key("PATH"));
}

/// A node executable path resolves to its directory; bare names do not.
#[test]
fn node_directory_resolution() {
    assert_eq!(
        resolve_command_directory("/opt/node-v20/bin/node").as_deref(),
        Some("/opt/node-v20/bin")
    );
    assert_eq!(resolve_command_directory("node"), None);
    assert_eq!(resolve_command_directory("  "), None);

    let dir = tempfile::tempdir().expect("temp dir");
    let as_dir = format!("{}/", dir.path().display());
    assert_eq!(
        resolve_command_directory(&as_dir).as_deref(),
        Some(dir.path().to_string_lossy().as_ref())
    );
}
