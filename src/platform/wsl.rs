//! Windows Subsystem for Linux helpers.

use std::path::Path;

use super::command::{quote_argv, shell_quote, CommandSpec};

/// Convert a Windows path to its WSL mount path.
///
/// `C:\Users\me\repo` becomes `/mnt/c/Users/me/repo`. Paths without a
/// drive letter only get their separators flipped.
#[must_use]
pub fn convert_windows_path_to_wsl(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = char::from(bytes[0]).to_ascii_lowercase();
        let rest = path[2..].replace('\\', "/");
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return format!("/mnt/{drive}");
        }
        return format!("/mnt/{drive}/{rest}");
    }
    path.replace('\\', "/")
}

/// Wrap a command so it runs inside WSL.
///
/// Produces `wsl.exe [-d <distro>] --cd <cwd> -- sh -lc "<argv>"`, with the
/// command path translated when it is a Windows path and an optional
/// `PATH` export for a Node.js directory.
#[must_use]
pub fn wrap_command_for_wsl(
    command: &str,
    args: &[String],
    cwd: &Path,
    distribution: Option<&str>,
    node_dir: Option<&str>,
) -> CommandSpec {
    let command = convert_windows_path_to_wsl(command);
    let mut script = quote_argv(&command, args);
    if let Some(dir) = node_dir {
        script = format!(
            "export PATH={}:\"$PATH\"; {script}",
            shell_quote(&convert_windows_path_to_wsl(dir))
        );
    }

    let mut wsl_args = Vec::with_capacity(8);
    if let Some(distro) = distribution.map(str::trim).filter(|d| !d.is_empty()) {
        wsl_args.push("-d".to_owned());
        wsl_args.push(distro.to_owned());
    }
    wsl_args.push("--cd".to_owned());
    wsl_args.push(convert_windows_path_to_wsl(&cwd.to_string_lossy()));
    wsl_args.push("--".to_owned());
    wsl_args.push("sh".to_owned());
    wsl_args.push("-lc".to_owned());
    wsl_args.push(script);

    CommandSpec {
        command: "wsl.exe".to_owned(),
        args: wsl_args,
    }
}
