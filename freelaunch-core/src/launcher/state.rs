//! Observable lifecycle state

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Snapshot of the launcher's lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    /// A node process is alive
    pub is_running: bool,
    /// Web interface port reported by the current run
    pub known_port: Option<u16>,
    /// A stop is in progress
    pub is_stopping: bool,
    /// The launcher is shutting down for good
    pub is_shutting_down: bool,
}

/// Coarse phase derived from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Stopping,
}

impl LifecycleState {
    pub fn phase(&self) -> Phase {
        if self.is_stopping {
            Phase::Stopping
        } else if self.is_running {
            Phase::Running
        } else {
            Phase::Idle
        }
    }
}

/// Single-writer, many-reader holder of the lifecycle state
///
/// Readers get whole snapshots; only the launcher can write.
#[derive(Debug)]
pub struct StateStore {
    tx: watch::Sender<LifecycleState>,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::default());
        Self { tx }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Apply `f` atomically; subscribers are only woken if something changed
    pub(crate) fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut LifecycleState),
    {
        self.tx.send_if_modified(|state| {
            let before = *state;
            f(state);
            before != *state
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
