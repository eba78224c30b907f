//! Error types for freelaunch-core

use std::path::PathBuf;

use thiserror::Error;

/// Errors from starting the supervised node
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Cannot resolve node executable: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Failed to spawn node process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors from locating the executable to launch
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Executable path is not absolute: {}", .0.display())]
    NotAbsolute(PathBuf),

    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("File is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    #[error("No launch script found in {}", .0.display())]
    NoCandidate(PathBuf),
}

/// Errors from reading or patching the wrapper configuration
#[derive(Error, Debug)]
pub enum WrapperConfigError {
    #[error("Wrapper config I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
