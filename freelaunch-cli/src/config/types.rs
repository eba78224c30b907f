use serde::Deserialize;
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
///
/// Mirrors the layout `config show` prints for the final config.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    /// Freenet install directory
    pub install_dir: Option<PathBuf>,

    /// Explicit executable instead of the launch script search
    pub executable: Option<PathBuf>,

    /// Arguments passed to the executable
    pub args: Option<Vec<String>>,

    /// Wrapper configuration file
    pub wrapper_config: Option<PathBuf>,

    /// Working directory for the node
    pub working_dir: Option<PathBuf>,

    /// Open the web interface once the node is up
    pub auto_browse: Option<bool>,

    #[serde(default)]
    pub termination: RawTerminationConfig,
}

/// Termination timeouts as stored in TOML, in milliseconds
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTerminationConfig {
    pub poll_interval_ms: Option<u64>,
    pub interrupt_ms: Option<u64>,
    pub terminate_ms: Option<u64>,
    pub kill_ms: Option<u64>,
    pub tree_kill_graceful_ms: Option<u64>,
    pub tree_kill_force_ms: Option<u64>,
}
