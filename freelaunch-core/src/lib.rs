//! freelaunch-core: supervision of a Freenet node and its process tree
//!
//! This crate provides the pieces a launcher frontend needs:
//!
//! - **Launcher** - [`ProcessLauncher`] starts the node, tracks readiness and stops it
//! - **Termination** - [`ProcessTreeTerminator`] takes down the node and every descendant
//! - **Logs** - [`LogSink`] merges process output, the wrapper log and launcher notices
//! - **Wrapper integration** - [`wrapper`] patches `wrapper.conf` and finds the wrapper log
//!
//! # Quick Start
//!
//! ```no_run
//! use freelaunch_core::{LauncherConfig, ProcessLauncher};
//!
//! async fn example() -> Result<(), freelaunch_core::LaunchError> {
//!     let launcher = ProcessLauncher::new(LauncherConfig::for_install_dir("/opt/freenet"));
//!     let mut logs = launcher.logs().subscribe();
//!
//!     launcher.start().await?;
//!     while let Ok(line) = logs.recv().await {
//!         println!("{}", line.text);
//!     }
//!
//!     launcher.shutdown_and_wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//!                      ProcessLauncher
//!   OutputReader (stdout/stderr) ──┐
//!   LogTailer (wrapper.log) ───────┼──► LogSink
//!   liveness watcher (owns Child) ─┴──► StateStore
//!   stop / shutdown ──► ProcessTreeTerminator ──► ProcessTable
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod logs;
pub mod process;
pub mod wrapper;

pub use config::{LauncherConfig, TerminationTimeouts, WRAPPER_CONFIG_FILE};
pub use error::{LaunchError, ResolveError, WrapperConfigError};
pub use launcher::{
    BrowserOpener, ExecutableResolver, LauncherBuilder, LifecycleState, Phase, ProcessLauncher,
    ReadinessProbe,
};
pub use logs::{LogLine, LogSink, LogSource, LogTailer};
pub use process::{
    ProcessTable, ProcessTreeTerminator, RootProcess, Signal, SystemProcessTable,
    TerminationReport, TerminationStrategy,
};
