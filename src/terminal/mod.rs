//! Terminals run on behalf of an ACP agent (`terminal/*` requests).

pub mod manager;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

pub use manager::TerminalManager;

/// How a terminal process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatus {
    /// Exit code; `127` when the command could not be started.
    pub exit_code: Option<i32>,
    /// Terminating signal name.
    pub signal: Option<String>,
}

impl ExitStatus {
    /// Status reported when the process could not be spawned.
    #[must_use]
    pub fn spawn_failed() -> Self {
        Self {
            exit_code: Some(127),
            signal: None,
        }
    }
}

/// Snapshot returned by `terminal/output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutput {
    /// Retained output, stdout and stderr interleaved.
    pub output: String,
    /// Whether the retained output reached the byte limit.
    pub truncated: bool,
    /// Exit status once the process ended.
    pub exit_status: Option<ExitStatus>,
}

/// What to run in a new terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalRequest {
    /// Program, or a whole command line when `args` is empty.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Retained output limit in bytes.
    pub output_byte_limit: Option<usize>,
}

/// Output buffer that keeps only the newest `limit` bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    text: String,
    limit: Option<usize>,
}

impl OutputBuffer {
    /// Empty buffer with an optional byte limit.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            text: String::new(),
            limit: limit.filter(|limit| *limit > 0),
        }
    }

    /// Append `chunk`, dropping the oldest bytes beyond the limit. The cut
    /// moves forward to the next character boundary.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        let Some(limit) = self.limit else {
            return;
        };
        if self.text.len() > limit {
            let mut cut = self.text.len() - limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    /// Retained text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the retained text has reached the limit.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.limit.is_some_and(|limit| self.text.len() >= limit)
    }
}
