use super::types::{RawConfig, RawTerminationConfig};
use anyhow::{Context, Result};
use freelaunch_core::{LauncherConfig, TerminationTimeouts};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of both the user and the project config
pub const CONFIG_FILE: &str = "config.toml";

/// Env var that relocates the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "FREELAUNCH_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<LauncherConfig> {
        let mut raw = RawConfig::default();

        // Layer 1: User config
        if let Some(user_config) = Self::read_raw(&Self::user_config_path())? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(&Self::project_config_path())? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    /// Load a single config file, falling back to defaults if it is missing
    pub fn load_from_path(path: &Path) -> Result<LauncherConfig> {
        let raw = Self::read_raw(path)?.unwrap_or_default();
        Ok(Self::finalize(raw))
    }

    /// User config path (`~/.config/freelaunch/config.toml` or `$XDG_CONFIG_HOME`)
    pub fn user_config_path() -> PathBuf {
        freelaunch_paths::config_dir().join(CONFIG_FILE)
    }

    /// Get project config path
    /// Can be overridden with FREELAUNCH_PROJECT_CONFIG_DIR (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        match std::env::var(PROJECT_CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir).join(CONFIG_FILE),
            Err(_) => PathBuf::from(".freelaunch").join(CONFIG_FILE),
        }
    }

    fn read_raw(path: &Path) -> Result<Option<RawConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawConfig, overlay: RawConfig) -> RawConfig {
        RawConfig {
            install_dir: overlay.install_dir.or(base.install_dir),
            executable: overlay.executable.or(base.executable),
            args: overlay.args.or(base.args),
            wrapper_config: overlay.wrapper_config.or(base.wrapper_config),
            working_dir: overlay.working_dir.or(base.working_dir),
            auto_browse: overlay.auto_browse.or(base.auto_browse),
            termination: RawTerminationConfig {
                poll_interval_ms: overlay
                    .termination
                    .poll_interval_ms
                    .or(base.termination.poll_interval_ms),
                interrupt_ms: overlay
                    .termination
                    .interrupt_ms
                    .or(base.termination.interrupt_ms),
                terminate_ms: overlay
                    .termination
                    .terminate_ms
                    .or(base.termination.terminate_ms),
                kill_ms: overlay.termination.kill_ms.or(base.termination.kill_ms),
                tree_kill_graceful_ms: overlay
                    .termination
                    .tree_kill_graceful_ms
                    .or(base.termination.tree_kill_graceful_ms),
                tree_kill_force_ms: overlay
                    .termination
                    .tree_kill_force_ms
                    .or(base.termination.tree_kill_force_ms),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawConfig) -> LauncherConfig {
        let defaults = LauncherConfig::default();
        let timeouts = TerminationTimeouts::default();
        let ms = |value: Option<u64>, default: Duration| value.map(Duration::from_millis).unwrap_or(default);

        LauncherConfig {
            install_dir: raw.install_dir.unwrap_or(defaults.install_dir),
            executable: raw.executable,
            args: raw.args.unwrap_or(defaults.args),
            wrapper_config: raw.wrapper_config,
            working_dir: raw.working_dir,
            auto_browse: raw.auto_browse.unwrap_or(defaults.auto_browse),
            termination: TerminationTimeouts {
                poll_interval: ms(raw.termination.poll_interval_ms, timeouts.poll_interval),
                interrupt: ms(raw.termination.interrupt_ms, timeouts.interrupt),
                terminate: ms(raw.termination.terminate_ms, timeouts.terminate),
                kill: ms(raw.termination.kill_ms, timeouts.kill),
                tree_kill_graceful: ms(
                    raw.termination.tree_kill_graceful_ms,
                    timeouts.tree_kill_graceful,
                ),
                tree_kill_force: ms(raw.termination.tree_kill_force_ms, timeouts.tree_kill_force),
            },
        }
    }
}
