use crate::config::ConfigLoader;
use anyhow::Result;
use clap::{Args, Subcommand};
use freelaunch_core::LauncherConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (merged)
    Show,
    /// Show configuration file paths
    Path,
}

pub fn run(args: ConfigArgs, config: impl FnOnce() -> Result<LauncherConfig>) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(config()?),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config(config: LauncherConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{}", toml_str);
    Ok(())
}

fn show_paths() -> Result<()> {
    println!(
        "User config:    {}",
        ConfigLoader::user_config_path().display()
    );
    println!(
        "Project config: {}",
        ConfigLoader::project_config_path().display()
    );
    Ok(())
}
