//! Command resolution for agent profiles.

use tracing::{debug, warn};

use super::modules::{AgentModule, ArgsPlacement};
use crate::config::AgentProfile;
use crate::platform::CliDetector;

/// Where the resolved command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// Configured explicitly.
    Settings,
    /// Found on `PATH` from the module's candidates.
    Detected,
    /// Nothing configured and nothing found.
    Unresolved,
}

/// A profile's command after detection and argument merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Command; empty when unresolved.
    pub command: String,
    /// Arguments including the module's required ones.
    pub args: Vec<String>,
    /// Provenance.
    pub source: CommandSource,
    /// Candidate that produced a detected command.
    pub detected_from: Option<String>,
}

impl ResolvedCommand {
    /// `<command> (from <candidate>)` for detected commands.
    #[must_use]
    pub fn detection_summary(&self) -> Option<String> {
        self.detected_from
            .as_ref()
            .map(|from| format!("{} (from {from})", self.command))
    }
}

/// Resolve the command and arguments for `profile` under `module`.
///
/// A configured command always wins. Without one, the module's candidates
/// are tried in order.
#[must_use]
pub fn resolve_agent_command(
    profile: &AgentProfile,
    module: &AgentModule,
    detector: &CliDetector,
) -> ResolvedCommand {
    let mut resolved = ResolvedCommand {
        command: profile
            .command
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_owned(),
        args: profile.args.clone(),
        source: CommandSource::Settings,
        detected_from: None,
    };

    if resolved.command.is_empty() && !module.command_candidates.is_empty() {
        match detector.detect(module.command_candidates) {
            Some(detected) => {
                debug!(agent = %profile.id, command = %detected.command.display(), from = %detected.detected_from, "agent command detected");
                resolved.command = detected.command.to_string_lossy().into_owned();
                resolved.detected_from = Some(detected.detected_from);
                resolved.source = CommandSource::Detected;
            }
            None => {
                warn!(agent = %profile.id, candidates = ?module.command_candidates, "no agent command configured or found on PATH");
                resolved.source = CommandSource::Unresolved;
            }
        }
    }

    if !module.required_args.is_empty() {
        resolved.args = merge_args(&resolved.args, module.required_args, module.args_placement);
    }
    resolved
}

/// Combine configured and required arguments.
#[must_use]
pub fn merge_args(existing: &[String], required: &[&str], placement: ArgsPlacement) -> Vec<String> {
    match placement {
        ArgsPlacement::Prepend => required
            .iter()
            .map(|arg| (*arg).to_owned())
            .chain(
                existing
                    .iter()
                    .filter(|arg| !required.contains(&arg.as_str()))
                    .cloned(),
            )
            .collect(),
        ArgsPlacement::Append => {
            let mut merged = existing.to_vec();
            for arg in required {
                if !merged.iter().any(|existing| existing == arg) {
                    merged.push((*arg).to_owned());
                }
            }
            merged
        }
    }
}
