//! Launcher configuration types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the wrapper configuration file inside the install directory
pub const WRAPPER_CONFIG_FILE: &str = "wrapper.conf";

/// Configuration for the process launcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Directory the node is installed in
    pub install_dir: PathBuf,

    /// Explicit executable, bypassing the launch script search
    pub executable: Option<PathBuf>,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Wrapper configuration file (defaults to `<install_dir>/wrapper.conf`)
    pub wrapper_config: Option<PathBuf>,

    /// Working directory for the node process (defaults to the install dir)
    pub working_dir: Option<PathBuf>,

    /// Open the web interface once the node reports its port
    pub auto_browse: bool,

    /// Shutdown escalation timeouts
    pub termination: TerminationTimeouts,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            install_dir: freelaunch_paths::default_install_dir(),
            executable: None,
            args: vec!["console".to_string()],
            wrapper_config: None,
            working_dir: None,
            auto_browse: true,
            termination: TerminationTimeouts::default(),
        }
    }
}

impl LauncherConfig {
    /// Create a config for a node installed in `install_dir`
    pub fn for_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            ..Self::default()
        }
    }

    /// Path of the wrapper configuration file
    pub fn wrapper_config_path(&self) -> PathBuf {
        match &self.wrapper_config {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.install_dir.join(path),
            None => self.install_dir.join(WRAPPER_CONFIG_FILE),
        }
    }

    /// Directory the node process runs in
    pub fn effective_working_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(&self.install_dir)
    }
}

/// Timeouts for each stage of process tree termination
///
/// Serialized as millisecond integers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TerminationTimeouts {
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Wait after SIGINT
    #[serde(rename = "interrupt_ms", with = "millis")]
    pub interrupt: Duration,

    /// Wait after SIGTERM
    #[serde(rename = "terminate_ms", with = "millis")]
    pub terminate: Duration,

    /// Wait after SIGKILL
    #[serde(rename = "kill_ms", with = "millis")]
    pub kill: Duration,

    /// Wait after a non-forceful tree kill (Windows)
    #[serde(rename = "tree_kill_graceful_ms", with = "millis")]
    pub tree_kill_graceful: Duration,

    /// Wait after a forceful tree kill (Windows)
    #[serde(rename = "tree_kill_force_ms", with = "millis")]
    pub tree_kill_force: Duration,
}

impl Default for TerminationTimeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            interrupt: Duration::from_secs(20),
            terminate: Duration::from_secs(5),
            kill: Duration::from_secs(2),
            tree_kill_graceful: Duration::from_secs(20),
            tree_kill_force: Duration::from_secs(5),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_escalation_budget() {
        let t = TerminationTimeouts::default();
        assert_eq!(t.poll_interval, Duration::from_millis(200));
        assert_eq!(t.interrupt + t.terminate + t.kill, Duration::from_secs(27));
        assert_eq!(t.tree_kill_graceful + t.tree_kill_force, Duration::from_secs(25));
    }

    #[test]
    fn default_config_runs_console_mode_with_browser() {
        let config = LauncherConfig::for_install_dir("/opt/freenet");
        assert_eq!(config.args, vec!["console".to_string()]);
        assert!(config.auto_browse);
        assert!(config.executable.is_none());
    }

    #[test]
    fn wrapper_config_path_defaults_to_install_dir() {
        let config = LauncherConfig::for_install_dir("/opt/freenet");
        assert_eq!(
            config.wrapper_config_path(),
            PathBuf::from("/opt/freenet/wrapper.conf")
        );
    }

    #[test]
    fn wrapper_config_path_relative_override_joins_install_dir() {
        let config = LauncherConfig {
            wrapper_config: Some(PathBuf::from("conf/wrapper.conf")),
            ..LauncherConfig::for_install_dir("/opt/freenet")
        };
        assert_eq!(
            config.wrapper_config_path(),
            PathBuf::from("/opt/freenet/conf/wrapper.conf")
        );
    }

    #[test]
    fn effective_working_dir_prefers_override() {
        let mut config = LauncherConfig::for_install_dir("/opt/freenet");
        assert_eq!(config.effective_working_dir(), Path::new("/opt/freenet"));
        config.working_dir = Some(PathBuf::from("/var/lib/freenet"));
        assert_eq!(config.effective_working_dir(), Path::new("/var/lib/freenet"));
    }

    #[test]
    fn timeouts_toml_uses_millisecond_fields() {
        let toml_str = r#"
interrupt_ms = 1500
kill_ms = 100
"#;
        let parsed: TerminationTimeouts = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.interrupt, Duration::from_millis(1500));
        assert_eq!(parsed.kill, Duration::from_millis(100));
        assert_eq!(parsed.terminate, Duration::from_secs(5));
    }

    #[test]
    fn launcher_config_toml_roundtrip() {
        let config = LauncherConfig {
            executable: Some(PathBuf::from("/opt/freenet/run.sh")),
            auto_browse: false,
            ..LauncherConfig::for_install_dir("/opt/freenet")
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("interrupt_ms = 20000"));
        let parsed: LauncherConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
