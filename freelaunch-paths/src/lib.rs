//! XDG Base Directory paths for freelaunch.
//!
//! The launcher keeps its own settings under XDG paths on every platform,
//! while the node it supervises lives in a separate install directory.

use std::path::PathBuf;

/// Environment variable overriding the node install directory.
pub const HOME_ENV: &str = "FREELAUNCH_HOME";

/// Get the freelaunch config directory.
///
/// Returns `$XDG_CONFIG_HOME/freelaunch` if set, otherwise `~/.config/freelaunch`.
///
/// # Examples
///
/// ```
/// use freelaunch_paths::config_dir;
///
/// let config = config_dir();
/// let user_config = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config").join(APP_DIR)
}

const APP_DIR: &str = "freelaunch";

/// `$<var>` if set, else `~/<fallback>`, else `<fallback>` relative to the cwd
fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    match std::env::var_os(var) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .map(|home| home.join(fallback))
            .unwrap_or_else(|| PathBuf::from(fallback)),
    }
}

/// Get the directory the node is installed in.
///
/// Returns `$FREELAUNCH_HOME` if set, otherwise `~/Freenet`, which is where
/// the node installer puts it by default.
pub fn default_install_dir() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.trim().is_empty()
    {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join("Freenet")
    } else {
        PathBuf::from("Freenet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_freelaunch() {
        let path = config_dir();
        assert!(
            path.ends_with("freelaunch"),
            "config_dir should end with 'freelaunch'"
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-config/freelaunch"));
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_config_dir_ignores_empty_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "");
        }
        let path = config_dir();
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        assert!(path.ends_with(".config/freelaunch"));
    }

    #[test]
    #[serial]
    fn test_install_dir_respects_home_env() {
        unsafe {
            std::env::set_var(HOME_ENV, "/opt/freenet");
        }
        assert_eq!(default_install_dir(), PathBuf::from("/opt/freenet"));
        unsafe {
            std::env::remove_var(HOME_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_install_dir_ignores_blank_home_env() {
        unsafe {
            std::env::set_var(HOME_ENV, "  ");
        }
        assert!(default_install_dir().ends_with("Freenet"));
        unsafe {
            std::env::remove_var(HOME_ENV);
        }
    }
}
