//! Staged shutdown of a process and its descendants
//!
//! The descendant set is captured once, up front. Each stage only targets
//! processes that are still alive, so a process that exits during one wait
//! window is never signalled again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::table::{ProcessTable, Signal};
use crate::config::TerminationTimeouts;

/// The root of the tree being terminated
pub trait RootProcess: Send + Sync {
    fn pid(&self) -> u32;

    fn is_alive(&self) -> bool;

    /// Kill the root through its own handle, bypassing the process table
    fn force_kill(&self);
}

/// How termination is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStrategy {
    /// SIGINT, then SIGTERM, then SIGKILL to each surviving target
    Signals,
    /// Non-forceful then forceful tree kill of the root
    TreeKill,
}

impl Default for TerminationStrategy {
    fn default() -> Self {
        if cfg!(windows) {
            Self::TreeKill
        } else {
            Self::Signals
        }
    }
}

/// One escalation step that was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Signal(Signal),
    TreeKill { force: bool },
}

/// What a termination run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Root followed by the descendant snapshot
    pub targets: Vec<u32>,
    /// Each stage with the PIDs it was applied to
    pub stages: Vec<(Stage, Vec<u32>)>,
    /// Targets still alive at the end
    pub survivors: Vec<u32>,
    /// Whether the root had to be killed through its handle
    pub forced_root: bool,
}

impl TerminationReport {
    /// PIDs that received `signal`
    pub fn signalled(&self, signal: Signal) -> &[u32] {
        self.stages
            .iter()
            .find(|(stage, _)| *stage == Stage::Signal(signal))
            .map(|(_, pids)| pids.as_slice())
            .unwrap_or(&[])
    }
}

/// Terminates a process tree with bounded, staged escalation
#[derive(Clone)]
pub struct ProcessTreeTerminator {
    table: Arc<dyn ProcessTable>,
    timeouts: TerminationTimeouts,
    strategy: TerminationStrategy,
}

impl ProcessTreeTerminator {
    pub fn new(table: Arc<dyn ProcessTable>, timeouts: TerminationTimeouts) -> Self {
        Self {
            table,
            timeouts,
            strategy: TerminationStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: TerminationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Terminate `root` and everything it had spawned when this was called
    pub async fn terminate(&self, root: &dyn RootProcess) -> TerminationReport {
        let root_pid = root.pid();
        let mut targets = vec![root_pid];
        targets.extend(
            self.table
                .descendants_of(root_pid)
                .await
                .into_iter()
                .filter(|&pid| pid != root_pid),
        );
        info!(
            pid = root_pid,
            descendants = targets.len() - 1,
            strategy = ?self.strategy,
            "Terminating process tree"
        );

        let mut report = TerminationReport {
            targets: targets.clone(),
            ..TerminationReport::default()
        };

        match self.strategy {
            TerminationStrategy::Signals => self.escalate_signals(root, &targets, &mut report).await,
            TerminationStrategy::TreeKill => self.escalate_tree_kill(root, &mut report).await,
        }

        if root.is_alive() {
            warn!(pid = root_pid, "Process survived escalation, killing it directly");
            root.force_kill();
            report.forced_root = true;
        }

        // A force-killed root is reaped by its owner, not counted here
        let remaining = self.alive_subset(root, &targets).await;
        report.survivors = remaining
            .into_iter()
            .filter(|&pid| !(report.forced_root && pid == root_pid))
            .collect();
        if !report.survivors.is_empty() {
            warn!(survivors = ?report.survivors, "Some processes outlived termination");
        }
        report
    }

    async fn escalate_signals(
        &self,
        root: &dyn RootProcess,
        targets: &[u32],
        report: &mut TerminationReport,
    ) {
        let stages = [
            (Signal::Interrupt, self.timeouts.interrupt),
            (Signal::Terminate, self.timeouts.terminate),
            (Signal::Kill, self.timeouts.kill),
        ];

        for (signal, wait) in stages {
            let alive = self.alive_subset(root, targets).await;
            if alive.is_empty() {
                return;
            }

            debug!(%signal, pids = ?alive, "Sending signal");
            for &pid in &alive {
                if let Err(e) = self.table.signal(pid, signal) {
                    debug!(pid, %signal, error = %e, "Signal failed");
                }
            }
            report.stages.push((Stage::Signal(signal), alive.clone()));

            if self.wait_until_dead(root, &alive, wait).await {
                return;
            }
        }
    }

    async fn escalate_tree_kill(&self, root: &dyn RootProcess, report: &mut TerminationReport) {
        let root_pid = root.pid();
        let stages = [
            (false, self.timeouts.tree_kill_graceful),
            (true, self.timeouts.tree_kill_force),
        ];

        for (force, wait) in stages {
            if !root.is_alive() {
                return;
            }

            debug!(pid = root_pid, force, "Running tree kill");
            if let Err(e) = self.table.tree_kill(root_pid, force).await {
                debug!(pid = root_pid, force, error = %e, "Tree kill failed");
            }
            report.stages.push((Stage::TreeKill { force }, vec![root_pid]));

            if self.wait_until_dead(root, &[root_pid], wait).await {
                return;
            }
        }
    }

    /// Poll until every pid is gone or `timeout` elapses; true if all are gone
    async fn wait_until_dead(&self, root: &dyn RootProcess, pids: &[u32], timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.alive_subset(root, pids).await.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.timeouts.poll_interval).await;
        }
    }

    async fn alive_subset(&self, root: &dyn RootProcess, pids: &[u32]) -> Vec<u32> {
        let mut alive = Vec::with_capacity(pids.len());
        for &pid in pids {
            let live = if pid == root.pid() {
                root.is_alive()
            } else {
                self.table.is_alive(pid).await
            };
            if live {
                alive.push(pid);
            }
        }
        alive
    }
}
