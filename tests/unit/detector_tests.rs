//! Unit tests for agent CLI detection.
//!
//! Covers:
//! - the first resolvable candidate wins, in order
//! - path-like candidates must be executable files
//! - bare names with spaces never resolve
//! - results are memoized until `clear_cache`

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cchub::platform::CliDetector;

fn write_script(dir: &Path, name: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
    path
}

/// Candidates are tried in order; misses are skipped.
#[test]
fn first_resolvable_candidate_wins() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_script(dir.path(), "claude-code-acp", 0o755);
    write_script(dir.path(), "claude", 0o755);
    let detector = CliDetector::with_search_path(dir.path());

    let detected = detector
        .detect(&["not-installed", "claude-code-acp", "claude"])
        .expect("a candidate resolves");
    assert_eq!(detected.detected_from, "claude-code-acp");
    assert!(detected.command.ends_with("claude-code-acp"));
    assert!(detected.command.is_absolute());
}

/// No candidate on the search path means unresolved, not an error.
#[test]
fn nothing_found_is_none() {
    let dir = tempfile::tempdir().expect("temp dir");
    let detector = CliDetector::with_search_path(dir.path());
    assert!(detector.detect(&["gemini", "qwen"]).is_none());
    assert!(detector.detect::<&str>(&[]).is_none());
}

/// Explicit paths resolve only when they point at an executable file.
#[test]
fn path_candidates_need_exec_bit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let runnable = write_script(dir.path(), "runnable", 0o755);
    let plain = write_script(dir.path(), "plain", 0o644);
    let detector = CliDetector::with_search_path("");

    assert_eq!(detector.resolve(&runnable.to_string_lossy()), Some(runnable.clone()));
    assert_eq!(detector.resolve(&plain.to_string_lossy()), None);
    assert_eq!(detector.resolve(&dir.path().to_string_lossy()), None, "directories are not executables");
}

/// A bare name with spaces is a command line and never resolves.
#[test]
fn names_with_spaces_do_not_resolve() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_script(dir.path(), "npx", 0o755);
    let detector = CliDetector::with_search_path(dir.path());

    assert!(detector.resolve("npx").is_some());
    assert!(detector.resolve("npx @zed-industries/claude-code-acp").is_none());
    assert!(detector.resolve("   ").is_none());
}

/// Lookups are cached, including after the binary disappears, until the
/// cache is cleared.
#[test]
fn results_are_memoized() {
    let dir = tempfile::tempdir().expect("temp dir");
    let script = write_script(dir.path(), "goose", 0o755);
    let detector = CliDetector::with_search_path(dir.path());

    assert!(detector.resolve("goose").is_some());
    fs::remove_file(&script).expect("remove script");
    assert!(detector.resolve("goose").is_some(), "cached hit survives removal");

    detector.clear_cache();
    assert!(detector.resolve("goose").is_none());
}
