//! Environment blocks for spawned agent and terminal processes.

use std::collections::BTreeMap;
use std::path::Path;

use super::HostPlatform;

/// Merge the inherited environment, agent-specific variables and an
/// optional Node.js directory into one environment block.
///
/// Custom variables win over inherited ones. When `node_dir` is set it is
/// prepended to the existing `PATH` entry, matching the key
/// case-insensitively on Windows (`Path` vs `PATH`).
#[must_use]
pub fn build_process_env<I>(
    base: I,
    custom: &BTreeMap<String, String>,
    node_dir: Option<&str>,
    platform: HostPlatform,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base.into_iter().collect();
    env.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));

    if let Some(dir) = node_dir.map(str::trim).filter(|dir| !dir.is_empty()) {
        let key = path_key(&env, platform);
        let separator = platform.path_separator();
        let value = match env.get(&key) {
            Some(existing) if !existing.is_empty() => format!("{dir}{separator}{existing}"),
            _ => dir.to_owned(),
        };
        env.insert(key, value);
    }

    env
}

/// Inherited environment of the current process, skipping non-UTF-8 entries.
#[must_use]
pub fn inherited_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Directory to put on `PATH` for a configured Node.js location.
///
/// Accepts either the `node` executable or its directory. Returns `None`
/// for empty input or a bare command name without any directory part.
#[must_use]
pub fn resolve_command_directory(node_path: &str) -> Option<String> {
    let trimmed = node_path.trim();
    if trimmed.is_empty() {
        return None;
    }

    let path = Path::new(trimmed);
    if path.is_dir() {
        return Some(trimmed.trim_end_matches(['/', '\\']).to_owned());
    }

    let cut = trimmed.rfind(['/', '\\'])?;
    let dir = &trimmed[..cut];
    if dir.is_empty() {
        Some(trimmed[..=cut].to_owned())
    } else {
        Some(dir.to_owned())
    }
}

fn path_key(env: &BTreeMap<String, String>, platform: HostPlatform) -> String {
    if platform.is_windows() {
        if let Some(existing) = env.keys().find(|k| k.eq_ignore_ascii_case("path")) {
            return existing.clone();
        }
    }
    "PATH".to_owned()
}
