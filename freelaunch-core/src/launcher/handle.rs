//! Ownership of the live node process

use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::process::RootProcess;

/// Shared view of one spawned node process
///
/// The `Child` itself is owned by the matching [`Supervisor`]; the handle
/// only observes exit and can ask for a hard kill.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    exited: watch::Receiver<bool>,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        !*self.exited.borrow()
    }

    /// Ask the supervisor to kill the process outright
    pub fn kill(&self) {
        // Supervisor gone means the process is already reaped
        let _ = self.kill_tx.send(());
    }

    /// Resolves once the process has exited and been reaped
    pub async fn wait(&self) {
        let mut exited = self.exited.clone();
        let _ = exited.wait_for(|exited| *exited).await;
    }
}

impl RootProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&self) -> bool {
        ProcessHandle::is_alive(self)
    }

    fn force_kill(&self) {
        self.kill();
    }
}

/// Owns the `Child` and drives it to exit
///
/// Dropping the supervisor marks the handle as exited, so whatever the
/// owner does after `wait` returns happens before observers see the exit.
pub struct Supervisor {
    child: Child,
    pid: u32,
    kill_rx: mpsc::UnboundedReceiver<()>,
    exited: watch::Sender<bool>,
}

impl Supervisor {
    /// Wait for exit, honouring kill requests from the handle meanwhile
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        loop {
            tokio::select! {
                status = self.child.wait() => return status,
                Some(()) = self.kill_rx.recv() => {
                    debug!(pid = self.pid, "Killing node process");
                    if let Err(e) = self.child.start_kill() {
                        debug!(pid = self.pid, error = %e, "Kill failed");
                    }
                }
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.exited.send_replace(true);
    }
}

/// Split a freshly spawned child into a handle and its supervisor
pub fn supervise(child: Child, pid: u32) -> (Arc<ProcessHandle>, Supervisor) {
    let (exited_tx, exited_rx) = watch::channel(false);
    let (kill_tx, kill_rx) = mpsc::unbounded_channel();
    let handle = Arc::new(ProcessHandle {
        pid,
        exited: exited_rx,
        kill_tx,
    });
    let supervisor = Supervisor {
        child,
        pid,
        kill_rx,
        exited: exited_tx,
    };
    (handle, supervisor)
}
