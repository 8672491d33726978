//! Agent registry: turns a configured [`AgentProfile`] into the
//! [`AgentConfig`] an adapter launches.

pub mod modules;
pub mod resolver;

use std::collections::BTreeMap;
use std::path::Path;

pub use modules::{module_by_id, module_or_fallback, modules, AgentModule, ArgsPlacement};
pub use resolver::{merge_args, resolve_agent_command, CommandSource, ResolvedCommand};

use crate::config::AgentProfile;
use crate::models::AgentConfig;
use crate::platform::CliDetector;

/// A launchable config together with how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Config handed to `initialize`.
    pub config: AgentConfig,
    /// Module the profile maps to.
    pub module: AgentModule,
    /// Command resolution result.
    pub command: ResolvedCommand,
}

/// Build the runtime config for `profile`.
///
/// Environment layers, later ones winning: module defaults, the profile's
/// `env`, then the API key under the module's key variable.
#[must_use]
pub fn build_agent_config(
    profile: &AgentProfile,
    working_directory: &Path,
    detector: &CliDetector,
) -> RuntimeConfig {
    let module = module_or_fallback(profile.module_id.as_deref());
    let command = resolve_agent_command(profile, &module, detector);

    let mut env: BTreeMap<String, String> = module
        .default_env
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect();
    env.extend(profile.env.clone());
    if let (Some(key), Some(api_key)) = (module.api_key_env, profile.api_key.as_ref()) {
        env.insert(key.to_owned(), api_key.clone());
    }

    let config = AgentConfig {
        id: profile.id.clone(),
        display_name: profile
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| module.label.to_owned()),
        command: command.command.clone(),
        args: command.args.clone(),
        env,
        working_directory: working_directory.to_path_buf(),
        protocol: module.protocol,
        module_id: module.id.to_owned(),
    };

    RuntimeConfig {
        config,
        module,
        command,
    }
}
