//! Locating the executable that starts the node

use std::path::{Path, PathBuf};

use crate::config::LauncherConfig;
use crate::error::ResolveError;

/// Supplies the absolute path of the executable to launch
pub trait ExecutableResolver: Send + Sync {
    fn resolve(&self) -> Result<PathBuf, ResolveError>;
}

/// Launch scripts searched for inside the install directory, in order
#[cfg(windows)]
pub const CANDIDATES: &[&str] = &["freenet.exe", "bin\\freenet.exe"];

/// Launch scripts searched for inside the install directory, in order
#[cfg(not(windows))]
pub const CANDIDATES: &[&str] = &["run.sh", "bin/freenet"];

/// Check that `path` is an absolute path to a regular, executable file
pub fn validate_executable(path: &Path) -> Result<(), ResolveError> {
    if !path.is_absolute() {
        return Err(ResolveError::NotAbsolute(path.to_path_buf()));
    }
    let meta = std::fs::metadata(path).map_err(|_| ResolveError::NotFound(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(ResolveError::NotAFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(ResolveError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Resolves the launch script of a node install directory
#[derive(Debug, Clone)]
pub struct InstallDirResolver {
    install_dir: PathBuf,
    explicit: Option<PathBuf>,
}

impl InstallDirResolver {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            explicit: None,
        }
    }

    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            install_dir: config.install_dir.clone(),
            explicit: config.executable.clone(),
        }
    }

    /// Use `executable` instead of searching for a launch script
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.explicit = Some(executable.into());
        self
    }

    /// The install dir anchored at the current directory if relative
    fn absolute_install_dir(&self) -> PathBuf {
        std::path::absolute(&self.install_dir).unwrap_or_else(|_| self.install_dir.clone())
    }
}

impl ExecutableResolver for InstallDirResolver {
    fn resolve(&self) -> Result<PathBuf, ResolveError> {
        let install_dir = self.absolute_install_dir();
        if let Some(explicit) = &self.explicit {
            let path = if explicit.is_absolute() {
                explicit.clone()
            } else {
                install_dir.join(explicit)
            };
            validate_executable(&path)?;
            return Ok(path);
        }

        CANDIDATES
            .iter()
            .map(|candidate| install_dir.join(candidate))
            .find(|path| validate_executable(path).is_ok())
            .ok_or(ResolveError::NoCandidate(install_dir))
    }
}
