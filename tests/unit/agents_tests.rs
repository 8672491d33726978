//! Unit tests for the agent module registry and runtime config building.
//!
//! Covers:
//! - module lookup and the `acp:custom` fallback
//! - required-argument merging for both placements
//! - command resolution: configured, detected and unresolved
//! - environment precedence and display-name defaults

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use cchub::agents::modules::FALLBACK_MODULE;
use cchub::agents::{
    build_agent_config, merge_args, module_by_id, module_or_fallback, modules, resolve_agent_command,
    ArgsPlacement, CommandSource,
};
use cchub::config::AgentProfile;
use cchub::models::AgentProtocol;
use cchub::platform::CliDetector;

fn profile(id: &str, module_id: Option<&str>) -> AgentProfile {
    AgentProfile {
        id: id.into(),
        display_name: None,
        module_id: module_id.map(str::to_owned),
        enabled: true,
        command: None,
        args: Vec::new(),
        env: BTreeMap::new(),
        api_key: None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_owned()).collect()
}

/// A detector whose search path contains nothing.
fn empty_detector() -> (tempfile::TempDir, CliDetector) {
    let dir = tempfile::tempdir().expect("temp dir");
    let detector = CliDetector::with_search_path(dir.path());
    (dir, detector)
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Module ids are unique and every module except the fallback has a
/// candidate to detect.
#[test]
fn registry_is_consistent() {
    let all = modules();
    for (index, module) in all.iter().enumerate() {
        assert!(
            all[index + 1..].iter().all(|other| other.id != module.id),
            "duplicate module id {}",
            module.id
        );
        if module.id != FALLBACK_MODULE.id {
            assert!(!module.command_candidates.is_empty(), "{} has no candidates", module.id);
        }
    }
}

/// Unknown and missing ids fall back to the custom ACP module.
#[test]
fn unknown_module_falls_back() {
    assert_eq!(module_or_fallback(None).id, "acp:custom");
    assert_eq!(module_or_fallback(Some("acp:nope")).id, "acp:custom");
    assert_eq!(module_or_fallback(Some("acp:gemini")).id, "acp:gemini");
}

/// The Codex MCP module speaks MCP and carries the long handshake budgets.
#[test]
fn codex_module_profile() {
    let codex = module_by_id("mcp:codex").expect("mcp:codex is built in");
    assert_eq!(codex.protocol, AgentProtocol::Mcp);
    let timeouts = codex.timeouts.expect("codex has a timeout profile");
    assert_eq!(timeouts.initialize, Duration::from_secs(60));
    assert_eq!(timeouts.new_session, Duration::from_secs(120));

    let bridge = module_by_id("acp:codex").expect("acp:codex is built in");
    assert_eq!(bridge.protocol, AgentProtocol::Acp);
}

// ── Argument merging ──────────────────────────────────────────────────────────

/// Append adds only the missing required args at the end.
#[test]
fn append_adds_missing_args() {
    let merged = merge_args(&strings(&["--model", "pro"]), &["--experimental-acp"], ArgsPlacement::Append);
    assert_eq!(merged, strings(&["--model", "pro", "--experimental-acp"]));

    let already = merge_args(&strings(&["--experimental-acp"]), &["--experimental-acp"], ArgsPlacement::Append);
    assert_eq!(already, strings(&["--experimental-acp"]));
}

/// Prepend puts required args first and drops their duplicates.
#[test]
fn prepend_moves_required_args_first() {
    let merged = merge_args(&strings(&["--verbose", "acp"]), &["acp"], ArgsPlacement::Prepend);
    assert_eq!(merged, strings(&["acp", "--verbose"]));
}

// ── Command resolution ────────────────────────────────────────────────────────

/// A configured command wins and module args are still merged in.
#[test]
fn configured_command_wins() {
    let (_dir, detector) = empty_detector();
    let mut gemini = profile("gemini", Some("acp:gemini"));
    gemini.command = Some("  /usr/local/bin/gemini  ".into());

    let module = module_or_fallback(gemini.module_id.as_deref());
    let resolved = resolve_agent_command(&gemini, &module, &detector);
    assert_eq!(resolved.source, CommandSource::Settings);
    assert_eq!(resolved.command, "/usr/local/bin/gemini");
    assert_eq!(resolved.args, strings(&["--experimental-acp"]));
    assert_eq!(resolved.detection_summary(), None);
}

/// Without a command the module candidates are detected on the search path.
#[cfg(unix)]
#[test]
fn missing_command_is_detected() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("temp dir");
    let goose = dir.path().join("goose");
    std::fs::write(&goose, "#!/bin/sh\n").expect("write");
    std::fs::set_permissions(&goose, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    let detector = CliDetector::with_search_path(dir.path());

    let resolved = resolve_agent_command(
        &profile("goose", Some("acp:goose")),
        &module_or_fallback(Some("acp:goose")),
        &detector,
    );
    assert_eq!(resolved.source, CommandSource::Detected);
    assert!(resolved.command.ends_with("goose"));
    assert_eq!(resolved.args, strings(&["acp"]));
    let summary = resolved.detection_summary().expect("detected commands have a summary");
    assert!(summary.ends_with("(from goose)"), "{summary}");
}

/// Nothing configured and nothing found is reported as unresolved.
#[test]
fn undetectable_command_is_unresolved() {
    let (_dir, detector) = empty_detector();
    let resolved = resolve_agent_command(
        &profile("qwen", Some("acp:qwen")),
        &module_or_fallback(Some("acp:qwen")),
        &detector,
    );
    assert_eq!(resolved.source, CommandSource::Unresolved);
    assert!(resolved.command.is_empty());
}

// ── Runtime config ────────────────────────────────────────────────────────────

/// Profile env overrides module defaults and the API key overrides both.
#[test]
fn env_precedence() {
    let (_dir, detector) = empty_detector();
    let mut claude = profile("claude", Some("acp:claude"));
    claude.command = Some("claude-code-acp".into());
    claude.env.insert("ANTHROPIC_API_KEY".into(), "from-env".into());
    claude.env.insert("DEBUG".into(), "1".into());
    claude.api_key = Some("from-keychain".into());

    let runtime = build_agent_config(&claude, Path::new("/work"), &detector);
    let env = &runtime.config.env;
    assert_eq!(env.get("ANTHROPIC_API_KEY").map(String::as_str), Some("from-keychain"));
    assert_eq!(env.get("DEBUG").map(String::as_str), Some("1"));
    assert_eq!(runtime.config.working_directory, Path::new("/work"));
    assert_eq!(runtime.config.module_id, "acp:claude");
}

/// The display name defaults to the module label; blank names count as unset.
#[test]
fn display_name_defaults_to_module_label() {
    let (_dir, detector) = empty_detector();
    let mut gemini = profile("gemini", Some("acp:gemini"));
    gemini.command = Some("gemini".into());
    gemini.display_name = Some("   ".into());
    let runtime = build_agent_config(&gemini, Path::new("/work"), &detector);
    assert_eq!(runtime.config.display_name, runtime.module.label);

    gemini.display_name = Some("My Gemini".into());
    let runtime = build_agent_config(&gemini, Path::new("/work"), &detector);
    assert_eq!(runtime.config.display_name, "My Gemini");
}

/// A profile routed to the Codex MCP module carries the MCP protocol.
#[test]
fn codex_profile_uses_mcp() {
    let (_dir, detector) = empty_detector();
    let mut codex = profile("codex", Some("mcp:codex"));
    codex.command = Some("codex".into());
    let runtime = build_agent_config(&codex, Path::new("/work"), &detector);
    assert_eq!(runtime.config.protocol, AgentProtocol::Mcp);
    assert_eq!(runtime.config.command, "codex");
}
