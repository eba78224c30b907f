//! The node process launcher
//!
//! [`ProcessLauncher`] owns at most one node process at a time. Starting
//! spawns the process with piped output, watches its stdout/stderr for the
//! readiness line and tails the wrapper log file. Stopping hands the process
//! to a [`ProcessTreeTerminator`] in a detached task, so concurrent stop and
//! shutdown requests all join the same termination run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::browser::{BrowserOpener, SystemBrowser};
use super::handle::{ProcessHandle, Supervisor, supervise};
use super::output::{OutputReader, merged_lines};
use super::readiness::{FproxyProbe, ReadinessProbe, browse_url};
use super::resolve::{ExecutableResolver, InstallDirResolver};
use super::state::{LifecycleState, StateStore};
use crate::config::LauncherConfig;
use crate::error::LaunchError;
use crate::logs::{LogSink, LogSource, LogTailer};
use crate::process::{ProcessTable, ProcessTreeTerminator, SystemProcessTable, TerminationStrategy};
use crate::wrapper::{CONSOLE_FLUSH_KEY, auxiliary_log_path, patch_file};

/// How long a finished termination waits for the root to be reaped
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Builder for [`ProcessLauncher`]
pub struct LauncherBuilder {
    config: LauncherConfig,
    resolver: Option<Arc<dyn ExecutableResolver>>,
    probe: Arc<dyn ReadinessProbe>,
    browser: Arc<dyn BrowserOpener>,
    table: Option<Arc<dyn ProcessTable>>,
    strategy: TerminationStrategy,
    logs: LogSink,
}

impl LauncherBuilder {
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            resolver: None,
            probe: Arc::new(FproxyProbe),
            browser: Arc::new(SystemBrowser),
            table: None,
            strategy: TerminationStrategy::default(),
            logs: LogSink::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ExecutableResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_strategy(mut self, strategy: TerminationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share an existing sink instead of creating a fresh one
    pub fn with_logs(mut self, logs: LogSink) -> Self {
        self.logs = logs;
        self
    }

    pub fn build(self) -> ProcessLauncher {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(InstallDirResolver::from_config(&self.config)));
        let table = self
            .table
            .unwrap_or_else(|| Arc::new(SystemProcessTable::new()));
        let terminator = ProcessTreeTerminator::new(table, self.config.termination)
            .with_strategy(self.strategy);

        ProcessLauncher {
            inner: Arc::new(Inner {
                config: self.config,
                resolver,
                probe: self.probe,
                browser: self.browser,
                terminator,
                state: StateStore::new(),
                logs: self.logs,
                current: Mutex::new(None),
                termination: Mutex::new(None),
                next_run: AtomicU64::new(1),
            }),
        }
    }
}

/// Supervises a single node process
///
/// Cheap to clone; clones share the same process and state.
#[derive(Clone)]
pub struct ProcessLauncher {
    inner: Arc<Inner>,
}

/// One spawned process and the id that tells it apart from later runs
struct Run {
    id: u64,
    handle: Arc<ProcessHandle>,
}

struct Inner {
    config: LauncherConfig,
    resolver: Arc<dyn ExecutableResolver>,
    probe: Arc<dyn ReadinessProbe>,
    browser: Arc<dyn BrowserOpener>,
    terminator: ProcessTreeTerminator,
    state: StateStore,
    logs: LogSink,
    current: Mutex<Option<Run>>,
    /// Completion flag of the latest termination run
    termination: Mutex<Option<watch::Receiver<bool>>>,
    next_run: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessLauncher {
    /// Launcher with the default resolver, probe, browser and process table
    pub fn new(config: LauncherConfig) -> Self {
        LauncherBuilder::new(config).build()
    }

    pub fn builder(config: LauncherConfig) -> LauncherBuilder {
        LauncherBuilder::new(config)
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.inner.config
    }

    /// Current lifecycle snapshot
    pub fn state(&self) -> LifecycleState {
        self.inner.state.snapshot()
    }

    /// Receiver that sees every lifecycle change
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    /// The sink carrying process output, wrapper log lines and launcher notices
    pub fn logs(&self) -> &LogSink {
        &self.inner.logs
    }

    /// PID of the live node process, if any
    pub fn pid(&self) -> Option<u32> {
        lock(&self.inner.current)
            .as_ref()
            .filter(|run| run.handle.is_alive())
            .map(|run| run.handle.pid())
    }

    /// Start the node unless it is already running.
    ///
    /// Does nothing once shutdown has begun. Fails without touching the
    /// state when no executable can be resolved or the spawn fails.
    pub async fn start(&self) -> Result<(), LaunchError> {
        let inner = &self.inner;
        if inner.state.snapshot().is_shutting_down {
            info!("Ignoring start request during shutdown");
            inner
                .logs
                .emit(LogSource::Launcher, "Not starting: launcher is shutting down");
            return Ok(());
        }
        if self.pid().is_some() {
            debug!("Node already running");
            return Ok(());
        }

        let executable = inner.resolver.resolve().inspect_err(|e| {
            error!(error = %e, "Cannot start node");
            inner
                .logs
                .emit(LogSource::Launcher, format!("Cannot start node: {e}"));
        })?;

        inner.patch_wrapper_config().await;

        let Some((run_id, handle, supervisor, output)) = inner.spawn(&executable)? else {
            return Ok(());
        };

        info!(pid = handle.pid(), executable = %executable.display(), "Node started");
        inner.logs.emit(
            LogSource::Launcher,
            format!("Started {} (pid {})", executable.display(), handle.pid()),
        );

        tokio::spawn(Inner::watch_liveness(Arc::clone(inner), run_id, supervisor));
        tokio::spawn(Inner::read_output(Arc::clone(inner), run_id, output));
        if let Some(path) = inner.auxiliary_log().await {
            let tailer = LogTailer::new(path, inner.logs.clone());
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { tailer.run_until(async move { handle.wait().await }).await });
        }

        Ok(())
    }

    /// Stop the node and wait until its process tree is gone.
    ///
    /// Joins a termination that is already running. With no live process
    /// this only resynchronizes the state.
    pub async fn stop(&self) {
        if let Some(done) = self.inner.begin_termination() {
            wait_done(done).await;
        }
    }

    /// Begin final shutdown without waiting for it to finish.
    ///
    /// Idempotent. Later calls to [`start`](Self::start) are ignored.
    /// Must be called from within a Tokio runtime.
    pub fn shutdown(&self) {
        self.inner.mark_shutting_down();
        self.inner.begin_termination();
    }

    /// Begin final shutdown and wait for the process tree to be gone
    pub async fn shutdown_and_wait(&self) {
        self.inner.mark_shutting_down();
        if let Some(done) = self.inner.begin_termination() {
            wait_done(done).await;
        }
    }

    /// Open the web interface if the node has reported its port
    pub fn launch_browser(&self) {
        match self.inner.state.snapshot().known_port {
            Some(port) => self.inner.open_browser(port),
            None => debug!("No known port to browse to"),
        }
    }

    /// Resolves once no node process is running
    pub async fn wait_for_exit(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| !state.is_running).await;
    }
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    let _ = done.wait_for(|done| *done).await;
}

type Spawned = (u64, Arc<ProcessHandle>, Supervisor, super::output::LineStream);

impl Inner {
    fn command(&self, executable: &Path) -> Command {
        let mut command = Command::new(executable);
        command
            .args(&self.config.args)
            .current_dir(self.config.effective_working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Spawn under the process slot lock so two starts cannot both spawn.
    ///
    /// Returns `None` when a live process appeared in the meantime or
    /// shutdown began while the executable was being resolved. Shutdown
    /// marks the state before taking this lock to look for a process, so
    /// one of the two always sees the other.
    fn spawn(&self, executable: &Path) -> Result<Option<Spawned>, LaunchError> {
        let mut current = lock(&self.current);
        if self.state.snapshot().is_shutting_down {
            info!("Shutdown began before spawn, not starting node");
            self.logs
                .emit(LogSource::Launcher, "Not starting: launcher is shutting down");
            return Ok(None);
        }
        if current.as_ref().is_some_and(|run| run.handle.is_alive()) {
            return Ok(None);
        }

        let mut child = self.command(executable).spawn().map_err(|e| {
            error!(executable = %executable.display(), error = %e, "Failed to spawn node");
            self.logs
                .emit(LogSource::Launcher, format!("Failed to start node: {e}"));
            LaunchError::Spawn(e)
        })?;
        let Some(pid) = child.id() else {
            return Err(LaunchError::Spawn(std::io::Error::other(
                "spawned process has no pid",
            )));
        };

        let output = merged_lines(child.stdout.take(), child.stderr.take());
        let (handle, supervisor) = supervise(child, pid);
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        *current = Some(Run {
            id: run_id,
            handle: Arc::clone(&handle),
        });
        self.state.update(|s| {
            s.is_running = true;
            s.known_port = None;
        });

        Ok(Some((run_id, handle, supervisor, output)))
    }

    async fn patch_wrapper_config(&self) {
        let path = self.config.wrapper_config_path();
        let target = path.clone();
        let patched =
            tokio::task::spawn_blocking(move || patch_file(&target, CONSOLE_FLUSH_KEY, "TRUE")).await;
        match patched {
            Ok(Ok(true)) => debug!(path = %path.display(), "Enabled console flushing"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => debug!(path = %path.display(), error = %e, "Skipping wrapper config patch"),
            Err(e) => warn!(error = %e, "Wrapper config patch task failed"),
        }
    }

    /// Wrapper log file to tail, if the wrapper config names one
    async fn auxiliary_log(&self) -> Option<PathBuf> {
        let config_path = self.config.wrapper_config_path();
        let working_dir = self.config.working_dir.clone();
        tokio::task::spawn_blocking(move || auxiliary_log_path(&config_path, working_dir.as_deref()))
            .await
            .ok()
            .flatten()
    }

    async fn watch_liveness(self: Arc<Self>, run_id: u64, mut supervisor: Supervisor) {
        match supervisor.wait().await {
            Ok(status) => {
                info!(%status, "Node exited");
                self.logs
                    .emit(LogSource::Launcher, format!("Node exited ({status})"));
            }
            Err(e) => warn!(error = %e, "Lost track of node process"),
        }

        {
            let mut current = lock(&self.current);
            if current.as_ref().is_some_and(|run| run.id == run_id) {
                *current = None;
                self.state.update(|s| {
                    s.is_running = false;
                    s.known_port = None;
                });
            }
        }
        drop(supervisor);
    }

    async fn read_output(self: Arc<Self>, run_id: u64, lines: super::output::LineStream) {
        let reader = OutputReader::new(self.logs.clone(), Arc::clone(&self.probe));
        reader
            .run(lines, |port, first| {
                {
                    // Held across the update so an exit cannot slip in between
                    let current = lock(&self.current);
                    if !current.as_ref().is_some_and(|run| run.id == run_id) {
                        return;
                    }
                    self.state.update(|s| s.known_port = Some(port));
                }
                if first && self.config.auto_browse {
                    self.open_browser(port);
                }
            })
            .await;
    }

    fn open_browser(&self, port: u16) {
        let url = browse_url(port);
        info!(%url, "Opening browser");
        self.logs
            .emit(LogSource::Launcher, format!("Opening {url}"));
        if let Err(e) = self.browser.open(&url) {
            warn!(%url, error = %e, "Failed to open browser");
            self.logs
                .emit(LogSource::Launcher, format!("Could not open browser: {e}"));
        }
    }

    fn mark_shutting_down(&self) {
        if self.state.update(|s| s.is_shutting_down = true) {
            info!("Launcher shutting down");
        }
    }

    /// Join the running termination or start a new one.
    ///
    /// Returns `None` when there is no live process to terminate.
    fn begin_termination(self: &Arc<Self>) -> Option<watch::Receiver<bool>> {
        let mut termination = lock(&self.termination);
        if let Some(done) = termination.as_ref()
            && !*done.borrow()
        {
            debug!("Joining termination in progress");
            return Some(done.clone());
        }

        let handle = lock(&self.current)
            .as_ref()
            .filter(|run| run.handle.is_alive())
            .map(|run| Arc::clone(&run.handle));
        let Some(handle) = handle else {
            self.state.update(|s| {
                s.is_running = false;
                s.known_port = None;
            });
            return None;
        };

        let (done_tx, done_rx) = watch::channel(false);
        *termination = Some(done_rx.clone());
        self.state.update(|s| s.is_stopping = true);
        self.logs
            .emit(LogSource::Launcher, format!("Stopping node (pid {})", handle.pid()));

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _finished = TerminationGuard {
                inner: Arc::clone(&inner),
                done: done_tx,
            };
            let report = inner.terminator.terminate(handle.as_ref()).await;
            if report.survivors.is_empty() {
                info!(targets = report.targets.len(), "Node process tree terminated");
            } else {
                warn!(survivors = ?report.survivors, "Processes survived termination");
            }
            if tokio::time::timeout(REAP_GRACE, handle.wait()).await.is_err() {
                warn!(pid = handle.pid(), "Node process not reaped after termination");
            }
        });

        Some(done_rx)
    }
}

/// Clears the stopping flag and signals completion, even if termination panics
struct TerminationGuard {
    inner: Arc<Inner>,
    done: watch::Sender<bool>,
}

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.inner.state.update(|s| s.is_stopping = false);
        self.done.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::process::Signal;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct FailingResolver;

    impl ExecutableResolver for FailingResolver {
        fn resolve(&self) -> Result<PathBuf, ResolveError> {
            Err(ResolveError::NoCandidate(PathBuf::from("/nowhere")))
        }
    }

    struct FixedResolver(PathBuf);

    impl ExecutableResolver for FixedResolver {
        fn resolve(&self) -> Result<PathBuf, ResolveError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingBrowser {
        opened: AtomicUsize,
    }

    impl BrowserOpener for CountingBrowser {
        fn open(&self, _url: &str) -> std::io::Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Records every call so tests can assert nothing touched the OS
    #[derive(Default)]
    struct RecordingTable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProcessTable for RecordingTable {
        async fn descendants_of(&self, _pid: u32) -> Vec<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }

        async fn is_alive(&self, _pid: u32) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn signal(&self, _pid: u32, _signal: Signal) -> std::io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn tree_kill(&self, _pid: u32, _force: bool) -> std::io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(dir: &TempDir) -> LauncherConfig {
        LauncherConfig::for_install_dir(dir.path())
    }

    #[tokio::test]
    async fn resolution_failure_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::builder(config(&dir))
            .with_resolver(Arc::new(FailingResolver))
            .build();

        let err = launcher.start().await.unwrap_err();

        assert!(matches!(err, LaunchError::Resolution(_)));
        assert_eq!(launcher.state(), LifecycleState::default());
        assert!(
            launcher
                .logs()
                .history()
                .iter()
                .any(|line| line.source == LogSource::Launcher && line.text.contains("/nowhere"))
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // A directory passes no exec check
        let launcher = ProcessLauncher::builder(config(&dir))
            .with_resolver(Arc::new(FixedResolver(dir.path().to_path_buf())))
            .build();

        let err = launcher.start().await.unwrap_err();

        assert!(matches!(err, LaunchError::Spawn(_)));
        assert!(!launcher.state().is_running);
        assert!(launcher.pid().is_none());
    }

    #[tokio::test]
    async fn stop_when_idle_does_nothing() {
        let dir = TempDir::new().unwrap();
        let table = Arc::new(RecordingTable::default());
        let launcher = ProcessLauncher::builder(config(&dir))
            .with_resolver(Arc::new(FailingResolver))
            .with_process_table(table.clone())
            .build();
        let rx = launcher.subscribe_state();

        launcher.stop().await;

        assert_eq!(table.calls.load(Ordering::SeqCst), 0);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(launcher.state(), LifecycleState::default());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_blocks_start() {
        let dir = TempDir::new().unwrap();
        let resolver_calls = Arc::new(AtomicUsize::new(0));

        struct CountingResolver(Arc<AtomicUsize>);
        impl ExecutableResolver for CountingResolver {
            fn resolve(&self) -> Result<PathBuf, ResolveError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(ResolveError::NoCandidate(PathBuf::from("/nowhere")))
            }
        }

        let launcher = ProcessLauncher::builder(config(&dir))
            .with_resolver(Arc::new(CountingResolver(resolver_calls.clone())))
            .build();

        launcher.shutdown();
        launcher.shutdown_and_wait().await;
        assert!(launcher.state().is_shutting_down);
        assert!(!launcher.state().is_stopping);

        launcher.start().await.unwrap();
        assert_eq!(resolver_calls.load(Ordering::SeqCst), 0);
        assert!(!launcher.state().is_running);
    }

    /// Resolves to `/bin/sh`, shutting the launcher down while resolving
    #[cfg(unix)]
    struct ShutdownDuringResolve(Arc<std::sync::OnceLock<ProcessLauncher>>);

    #[cfg(unix)]
    impl ExecutableResolver for ShutdownDuringResolve {
        fn resolve(&self) -> Result<PathBuf, ResolveError> {
            if let Some(launcher) = self.0.get() {
                launcher.shutdown();
            }
            Ok(PathBuf::from("/bin/sh"))
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_during_resolution_prevents_spawn() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let slot = Arc::new(std::sync::OnceLock::new());
        let launcher = ProcessLauncher::builder(cfg)
            .with_resolver(Arc::new(ShutdownDuringResolve(slot.clone())))
            .build();
        assert!(slot.set(launcher.clone()).is_ok());

        launcher.start().await.unwrap();
        launcher.shutdown_and_wait().await;

        let state = launcher.state();
        assert!(state.is_shutting_down);
        assert!(!state.is_running);
        assert!(launcher.pid().is_none());
        assert!(
            launcher
                .logs()
                .history()
                .iter()
                .any(|line| line.text.contains("shutting down"))
        );
    }

    #[tokio::test]
    async fn launch_browser_without_port_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let browser = Arc::new(CountingBrowser::default());
        let launcher = ProcessLauncher::builder(config(&dir))
            .with_browser(browser.clone())
            .build();

        launcher.launch_browser();

        assert_eq!(browser.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wait_for_exit_returns_when_idle() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(config(&dir));
        tokio::time::timeout(Duration::from_secs(1), launcher.wait_for_exit())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn natural_exit_returns_to_idle() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("node.sh");
        std::fs::write(&script, "echo 'Starting FProxy on 127.0.0.1:8888'\n").unwrap();

        let mut cfg = config(&dir);
        cfg.executable = Some(PathBuf::from("/bin/sh"));
        cfg.args = vec![script.to_string_lossy().into_owned()];
        let launcher = ProcessLauncher::builder(cfg)
            .with_browser(Arc::new(CountingBrowser::default()))
            .build();

        launcher.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), launcher.wait_for_exit())
            .await
            .unwrap();

        let state = launcher.state();
        assert!(!state.is_running);
        assert_eq!(state.known_port, None);
        assert!(launcher.pid().is_none());
    }
}
