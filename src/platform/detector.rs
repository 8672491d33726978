//! Resolve bare agent command names to absolute executables.
//!
//! [`CliDetector::detect`] walks an ordered candidate list and returns the
//! first one that resolves. Path-like candidates are checked directly;
//! bare names are searched on `PATH` (with `PATHEXT` on Windows) through
//! [`which::which_in`]. Results, including misses, are memoized for the
//! lifetime of the detector.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// A candidate that resolved to an executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCommand {
    /// Absolute path of the executable.
    pub command: PathBuf,
    /// Candidate string that produced the hit.
    pub detected_from: String,
}

/// Memoizing `PATH` lookup for agent CLIs.
#[derive(Debug)]
pub struct CliDetector {
    search_path: Option<OsString>,
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl CliDetector {
    /// Detector searching the current process `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Detector searching an explicit `PATH`-style list.
    #[must_use]
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the first candidate that resolves, or `None`.
    ///
    /// `None` means "unresolved" and is not an error.
    pub fn detect<S: AsRef<str>>(&self, candidates: &[S]) -> Option<DetectedCommand> {
        candidates.iter().find_map(|candidate| {
            let candidate = candidate.as_ref();
            self.resolve(candidate).map(|command| DetectedCommand {
                command,
                detected_from: candidate.to_owned(),
            })
        })
    }

    /// Resolve a single candidate, consulting the cache first.
    pub fn resolve(&self, candidate: &str) -> Option<PathBuf> {
        let key = candidate.trim();
        if key.is_empty() {
            return None;
        }

        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return hit.clone();
        }

        let resolved = self.lookup(key);
        debug!(candidate = key, resolved = ?resolved, "cli detector lookup");
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), resolved.clone());
        resolved
    }

    /// Drop all memoized results.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lookup(&self, candidate: &str) -> Option<PathBuf> {
        if candidate.contains(['/', '\\']) {
            let path = Path::new(candidate);
            return is_executable(path).then(|| path.to_path_buf());
        }

        // A bare name with spaces is a command line, not a binary.
        if candidate.contains(' ') {
            return None;
        }

        let search_path = self.search_path.as_ref()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(candidate, Some(search_path), cwd).ok()
    }
}

impl Default for CliDetector {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
