//! Child-process exit supervision.

use std::fmt::{Display, Formatter};

use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Generation of the connection slot the process belonged to.
    pub generation: u64,
    /// OS process id.
    pub pid: Option<u32>,
    /// Exit code, absent when terminated by a signal.
    pub code: Option<i32>,
    /// Terminating signal number (Unix).
    pub signal: Option<i32>,
    /// Whether the exit was requested through the kill token.
    pub killed: bool,
}

impl ProcessExit {
    /// Exit code 127: the shell could not find the command.
    #[must_use]
    pub fn is_command_not_found(&self) -> bool {
        self.code == Some(127)
    }

    /// Whether the exit should be reported as a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.killed && self.code != Some(0)
    }
}

impl Display for ProcessExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "process exited with code {code}"),
            (None, Some(signal)) => write!(f, "process was killed by signal {signal}"),
            (None, None) => f.write_str("process terminated"),
        }
    }
}

/// Own `child` until it exits or `kill` fires, then report how it ended.
///
/// Cancelling `kill` terminates the process and still yields a
/// [`ProcessExit`] (with `killed: true`) so that the owner can decide
/// whether the exit is stale.
pub async fn supervise(label: &str, generation: u64, mut child: Child, kill: CancellationToken) -> ProcessExit {
    let pid = child.id();

    let (status, killed) = tokio::select! {
        status = child.wait() => (status, false),
        () = kill.cancelled() => {
            info!(agent = label, pid, "killing agent process");
            if let Err(err) = child.kill().await {
                warn!(agent = label, pid, %err, "failed to kill agent process");
            }
            (child.wait().await, true)
        }
    };

    let (code, signal) = match status {
        Ok(status) => (status.code(), exit_signal(&status)),
        Err(err) => {
            warn!(agent = label, pid, %err, "error waiting for agent process");
            (None, None)
        }
    };

    info!(agent = label, pid, code, signal, killed, "agent process exited");
    ProcessExit {
        generation,
        pid,
        code,
        signal,
        killed,
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
