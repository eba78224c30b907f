//! Plain foreground start of the node
//!
//! Resolves the launch script, enables console flushing in the wrapper
//! config and runs the node with both output streams copied to our stdout.
//! The process exits with the node's exit code.

use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use freelaunch_core::launcher::output::merged_lines;
use freelaunch_core::launcher::{ExecutableResolver, InstallDirResolver};
use freelaunch_core::wrapper::{CONSOLE_FLUSH_KEY, patch_file};
use freelaunch_core::LauncherConfig;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// How long output is drained after the node exits
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Run the start command
pub async fn run(config: LauncherConfig) -> Result<()> {
    let executable = InstallDirResolver::from_config(&config).resolve()?;

    let wrapper_config = config.wrapper_config_path();
    let patched =
        tokio::task::spawn_blocking(move || patch_file(&wrapper_config, CONSOLE_FLUSH_KEY, "TRUE"))
            .await?;
    if let Err(e) = patched {
        debug!(error = %e, "Skipping wrapper config patch");
    }

    info!("Starting {}", executable.display());
    let mut child = Command::new(&executable)
        .args(&config.args)
        .current_dir(config.effective_working_dir())
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {}", executable.display()))?;

    let mut lines = merged_lines(child.stdout.take(), child.stderr.take());
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(Ok(line)) = lines.next().await {
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();
    });

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            // The node shares our process group and sees the interrupt too
            _ = tokio::signal::ctrl_c() => info!("Interrupted, waiting for the node to exit"),
        }
    };

    if tokio::time::timeout(DRAIN_GRACE, printer).await.is_err() {
        debug!("Output still open after exit, not waiting for it");
    }
    let _ = std::io::stdout().flush();

    let code = exit_code(status);
    info!(code, "Node exited");
    std::process::exit(code);
}

/// Shell-style exit code for a finished process
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_code_passes_through() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_exit_code_for_signal() {
        // Raw wait status of a process killed by SIGTERM
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }
}
