use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "freelaunch", about = "Start, watch and stop a Freenet node")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Freenet install directory (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Run the node under supervision until it exits or Ctrl-C
    Run(commands::run::RunArgs),
    /// Start the node in the foreground and exit with its exit code
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let install_dir = cli.install_dir;
    match cli.command {
        Commands::Config(args) => {
            commands::config::run(args, || commands::load_config(install_dir))
        }
        Commands::Run(args) => commands::run::run(args, commands::load_config(install_dir)?).await,
        Commands::Start => commands::start::run(commands::load_config(install_dir)?).await,
    }
}
