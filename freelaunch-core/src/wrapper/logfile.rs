//! Location of the wrapper's own log file

use std::path::{Component, Path, PathBuf};

use super::config::WrapperConfig;

/// Wrapper setting naming the log file
pub const LOGFILE_KEY: &str = "wrapper.logfile";

/// Log file used when the setting is blank or absent
pub const DEFAULT_LOGFILE: &str = "wrapper.log";

/// Resolve a `wrapper.logfile` value to a path.
///
/// Absolute values are returned unchanged. Relative values, including the
/// default used for a blank or missing value, are joined onto `working_dir`
/// when given and onto `config_dir` otherwise, then normalized.
pub fn resolve_log_path(value: Option<&str>, config_dir: &Path, working_dir: Option<&Path>) -> PathBuf {
    let value = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LOGFILE);

    let path = Path::new(value);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let base = working_dir.unwrap_or(config_dir);
    normalize(&base.join(path))
}

/// Log file named by the wrapper config at `config_path`.
///
/// Returns `None` when the config cannot be read.
pub fn auxiliary_log_path(config_path: &Path, working_dir: Option<&Path>) -> Option<PathBuf> {
    let config = WrapperConfig::load(config_path).ok()?;
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    Some(resolve_log_path(
        config.get(LOGFILE_KEY),
        config_dir,
        working_dir,
    ))
}

/// Lexically remove `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
