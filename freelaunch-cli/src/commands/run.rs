//! Supervised foreground run
//!
//! Starts the node under a [`ProcessLauncher`], prints its log stream and
//! takes the whole process tree down on Ctrl-C.

use anyhow::Result;
use clap::Args;
use freelaunch_core::{LauncherConfig, LogLine, LogSource, ProcessLauncher};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Do not open the web interface in a browser
    #[arg(long)]
    pub no_browser: bool,
}

/// Run the node until it exits or we are interrupted
pub async fn run(args: RunArgs, mut config: LauncherConfig) -> Result<()> {
    if args.no_browser {
        config.auto_browse = false;
    }

    let launcher = ProcessLauncher::new(config);
    let mut logs = launcher.logs().subscribe();

    launcher.start().await?;

    let exited = launcher.wait_for_exit();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(exited, interrupted);

    loop {
        tokio::select! {
            line = logs.recv() => match line {
                Ok(line) => print_line(&line),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Log output fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut exited => {
                info!("Node exited");
                break;
            }
            _ = &mut interrupted => {
                info!("Interrupted, stopping node");
                launcher.shutdown_and_wait().await;
                break;
            }
        }
    }

    // Whatever was published before we stopped listening
    loop {
        match logs.try_recv() {
            Ok(line) => print_line(&line),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    Ok(())
}

fn print_line(line: &LogLine) {
    println!("{}", format_line(line));
}

fn format_line(line: &LogLine) -> String {
    match line.source {
        LogSource::Process => line.text.clone(),
        LogSource::LogFile => format!("[wrapper] {}", line.text),
        LogSource::Launcher => format!("[freelaunch] {}", line.text),
    }
}
