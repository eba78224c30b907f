pub mod config;
pub mod run;
pub mod start;

use std::path::PathBuf;

use anyhow::{Context, Result};
use freelaunch_core::LauncherConfig;

use crate::config::ConfigLoader;

/// Load the merged config and apply command-line overrides
pub fn load_config(install_dir: Option<PathBuf>) -> Result<LauncherConfig> {
    let mut config = ConfigLoader::load()?;
    if let Some(dir) = install_dir {
        config.install_dir = std::path::absolute(&dir)
            .with_context(|| format!("Invalid install directory {}", dir.display()))?;
    }
    Ok(config)
}
