//! Unit tests for configuration parsing and validation.
//!
//! Covers:
//! - defaults of an empty file
//! - agent profiles, auto-approval flags and timeouts round into `Settings`
//! - agent selection by id, `default_agent` and first enabled
//! - validation of ids, `default_agent`, `codex_agent_id` and zero timeouts
//! - loading from a file on disk

use std::io::Write as _;
use std::time::Duration;

use cchub::config::{GlobalConfig, TimeoutConfig};
use cchub::AppError;

const SAMPLE: &str = r#"
auto_approve_read = true
auto_approve_list = true
codex_agent_id = "openai-codex"
default_agent = "gemini"

[timeouts]
initialize_seconds = 5
codex_initialize_seconds = 90
prompt_seconds = 30

[[agents]]
id = "claude"
module_id = "acp:claude"

[[agents]]
id = "gemini"
module_id = "acp:gemini"
command = "/opt/gemini/bin/gemini"
args = ["--model", "pro"]
env = { GEMINI_DEBUG = "1" }

[[agents]]
id = "disabled"
enabled = false
command = "whatever"
"#;

fn assert_config_error(raw: &str, needle: &str) {
    match GlobalConfig::from_toml_str(raw) {
        Err(AppError::Config(msg)) => assert!(msg.contains(needle), "'{msg}' should mention '{needle}'"),
        other => panic!("expected config error mentioning '{needle}', got {other:?}"),
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// An empty document yields the documented defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.codex_agent_id, "codex");
    assert!(config.agents.is_empty());

    let timeouts = TimeoutConfig::default();
    assert_eq!(timeouts.handshake(false).initialize, Duration::from_secs(20));
    assert_eq!(timeouts.handshake(false).new_session, Duration::from_secs(10));
    assert_eq!(timeouts.handshake(true).initialize, Duration::from_secs(60));
    assert_eq!(timeouts.handshake(true).new_session, Duration::from_secs(120));
}

/// Profiles and flags parse; unset timeout fields keep their defaults.
#[test]
fn sample_config_parses() {
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("sample config is valid");

    assert_eq!(config.agents.len(), 3);
    let gemini = config.agent("gemini").expect("gemini profile");
    assert_eq!(gemini.command.as_deref(), Some("/opt/gemini/bin/gemini"));
    assert_eq!(gemini.args, vec!["--model", "pro"]);
    assert_eq!(gemini.env.get("GEMINI_DEBUG").map(String::as_str), Some("1"));
    assert!(gemini.enabled);

    assert_eq!(config.timeouts.initialize_seconds, 5);
    assert_eq!(config.timeouts.new_session_seconds, 10);
    assert_eq!(config.timeouts.prompt(), Duration::from_secs(30));
}

/// `Settings` carries the policy and picks Codex budgets for the Codex id.
#[test]
fn settings_snapshot() {
    let settings = GlobalConfig::from_toml_str(SAMPLE).expect("valid").settings();

    assert!(settings.auto_approve.read);
    assert!(settings.auto_approve.list);
    assert!(!settings.auto_approve.execute);
    assert!(settings.is_codex_agent("openai-codex"));
    assert!(!settings.is_codex_agent("codex"));
    assert_eq!(settings.handshake_for("openai-codex").initialize, Duration::from_secs(90));
    assert_eq!(settings.handshake_for("claude").initialize, Duration::from_secs(5));
}

// ── Agent selection ───────────────────────────────────────────────────────────

/// An explicit id wins, then `default_agent`; disabled agents are invisible.
#[test]
fn agent_selection() {
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("valid");

    assert_eq!(config.select_agent(Some("claude")).expect("claude").id, "claude");
    assert_eq!(config.select_agent(None).expect("default").id, "gemini");
    assert!(config.agent("disabled").is_none());
    assert!(matches!(
        config.select_agent(Some("disabled")),
        Err(AppError::NotFound(_))
    ));
}

/// Without `default_agent` the first enabled profile is used.
#[test]
fn first_enabled_agent_is_default() {
    let config = GlobalConfig::from_toml_str(
        r#"
        [[agents]]
        id = "off"
        enabled = false

        [[agents]]
        id = "on"
        "#,
    )
    .expect("valid");
    assert_eq!(config.select_agent(None).expect("first enabled").id, "on");

    let empty = GlobalConfig::default();
    assert!(matches!(empty.select_agent(None), Err(AppError::NotFound(_))));
}

// ── Validation ────────────────────────────────────────────────────────────────

#[test]
fn duplicate_agent_ids_rejected() {
    assert_config_error(
        "[[agents]]\nid = \"a\"\n[[agents]]\nid = \"a\"\n",
        "duplicate agent id",
    );
}

#[test]
fn empty_agent_id_rejected() {
    assert_config_error("[[agents]]\nid = \"  \"\n", "must not be empty");
}

#[test]
fn unknown_default_agent_rejected() {
    assert_config_error("default_agent = \"ghost\"\n", "default_agent 'ghost'");
}

#[test]
fn empty_codex_agent_id_rejected() {
    assert_config_error("codex_agent_id = \"\"\n", "codex_agent_id");
}

#[test]
fn zero_timeout_rejected() {
    assert_config_error("[timeouts]\nrequest_seconds = 0\n", "timeouts.request_seconds");
}

/// Invalid TOML surfaces as a configuration error.
#[test]
fn malformed_toml_rejected() {
    assert!(matches!(
        GlobalConfig::from_toml_str("agents = ["),
        Err(AppError::Config(_))
    ));
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// A config file on disk loads like the string form; a missing file errors.
#[test]
fn load_from_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SAMPLE.as_bytes()).expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.default_agent.as_deref(), Some("gemini"));

    let missing = file.path().with_extension("missing");
    assert!(matches!(
        GlobalConfig::load_from_path(missing),
        Err(AppError::Config(_))
    ));
}
