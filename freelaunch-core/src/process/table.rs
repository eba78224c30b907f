//! OS process table access: tree enumeration, liveness and signals

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

/// Termination signals used during escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Interrupt,
    Terminate,
    Kill,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Access to the process table
///
/// Every operation is best effort. Implementations without support for an
/// operation report nothing (no descendants) or an error the caller ignores.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// PIDs descended from `pid`, parents before children
    async fn descendants_of(&self, pid: u32) -> Vec<u32>;

    /// Whether `pid` names a live (non-zombie) process
    async fn is_alive(&self, pid: u32) -> bool;

    /// Deliver `signal` to `pid`
    fn signal(&self, pid: u32, signal: Signal) -> std::io::Result<()>;

    /// Kill `pid` and its tree with the platform tree-kill tool
    async fn tree_kill(&self, pid: u32, force: bool) -> std::io::Result<()>;
}

/// Process table backed by the running OS
#[derive(Clone)]
pub struct SystemProcessTable {
    system: Arc<Mutex<System>>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessTable for SystemProcessTable {
    async fn descendants_of(&self, pid: u32) -> Vec<u32> {
        let system = Arc::clone(&self.system);
        let walk = tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(|e| e.into_inner());
            system.refresh_processes(ProcessesToUpdate::All, true);
            let edges = system
                .processes()
                .iter()
                .filter_map(|(child, process)| {
                    process.parent().map(|parent| (parent.as_u32(), child.as_u32()))
                });
            descendants_from_edges(pid, edges)
        });

        match walk.await {
            Ok(pids) => pids,
            Err(e) => {
                debug!(pid, error = %e, "Process tree snapshot failed");
                Vec::new()
            }
        }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 || !pid_exists(pid) {
            return false;
        }

        let system = Arc::clone(&self.system);
        let check = tokio::task::spawn_blocking(move || {
            let mut system = system.lock().unwrap_or_else(|e| e.into_inner());
            let sys_pid = Pid::from_u32(pid);
            system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
            match system.process(sys_pid) {
                Some(process) => {
                    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
                }
                // Present per the OS but not listed: trust the OS
                None => cfg!(unix),
            }
        });

        match check.await {
            Ok(alive) => alive,
            Err(e) => {
                debug!(pid, error = %e, "Liveness check failed");
                true
            }
        }
    }

    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: Signal) -> std::io::Result<()> {
        let raw_pid = libc::pid_t::try_from(pid)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
        if raw_pid <= 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "refusing to signal a process group",
            ));
        }
        // SAFETY: kill() only delivers a signal to a single positive pid
        if unsafe { libc::kill(raw_pid, signal.as_raw()) } == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _pid: u32, _signal: Signal) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "signals are not supported on this platform",
        ))
    }

    #[cfg(windows)]
    async fn tree_kill(&self, pid: u32, force: bool) -> std::io::Result<()> {
        use std::process::Stdio;

        let pid = pid.to_string();
        let mut cmd = tokio::process::Command::new("taskkill");
        cmd.args(["/PID", pid.as_str(), "/T"]);
        if force {
            cmd.arg("/F");
        }
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!("taskkill exited with {status}")))
        }
    }

    #[cfg(not(windows))]
    async fn tree_kill(&self, _pid: u32, _force: bool) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "tree kill is only available on Windows",
        ))
    }
}

/// Check if a process exists
///
/// Uses kill(pid, 0) on Unix; EPERM still means the process exists.
#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence, nothing is delivered
    if unsafe { libc::kill(raw_pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_exists(_pid: u32) -> bool {
    true
}

/// Breadth-first walk of `(parent, child)` edges starting below `root`
pub(crate) fn descendants_from_edges<I>(root: u32, edges: I) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (parent, child) in edges {
        if parent != child {
            children.entry(parent).or_default().push(child);
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut out = Vec::new();
    while let Some(pid) = queue.pop_front() {
        for &child in children.get(&pid).into_iter().flatten() {
            if seen.insert(child) {
                out.push(child);
                queue.push_back(child);
            }
        }
    }
    out
}
