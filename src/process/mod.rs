//! Agent child-process lifecycle.
//!
//! A connection owns at most one live transport at a time. Every transport
//! is tagged with a generation number taken from its [`ProcessSlot`]; exit
//! and end-of-stream reports carry that generation, and only the current
//! generation may clear connection state. A process that exits after a
//! newer one was started is therefore ignored.

pub mod monitor;
pub mod spawner;

use tokio_util::sync::CancellationToken;

pub use monitor::{supervise, ProcessExit};
pub use spawner::{spawn_process, spawn_stderr_logger, SpawnRequest, SpawnedProcess, StderrTail};

/// The transport a connection is currently bound to.
#[derive(Debug)]
pub struct TrackedProcess {
    /// Slot generation.
    pub generation: u64,
    /// OS process id; `None` for in-memory streams.
    pub pid: Option<u32>,
    shutdown: CancellationToken,
}

impl TrackedProcess {
    /// Stop the reader and kill the process, if any.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Generation-tagged holder for a connection's current transport.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    generation: u64,
    current: Option<TrackedProcess>,
}

impl ProcessSlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the generation for the next transport.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Track a transport, returning the one it replaces.
    pub fn install(
        &mut self,
        generation: u64,
        pid: Option<u32>,
        shutdown: CancellationToken,
    ) -> Option<TrackedProcess> {
        self.current.replace(TrackedProcess {
            generation,
            pid,
            shutdown,
        })
    }

    /// Stop tracking the current transport and return it.
    pub fn take(&mut self) -> Option<TrackedProcess> {
        self.current.take()
    }

    /// Whether `generation` is the tracked one.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|tracked| tracked.generation == generation)
    }

    /// Clear the slot only when `generation` is still current.
    pub fn clear_if_current(&mut self, generation: u64) -> bool {
        if self.is_current(generation) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Process id of the tracked transport.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        self.current.as_ref().and_then(|tracked| tracked.pid)
    }

    /// Whether a transport is tracked.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.current.is_some()
    }
}
