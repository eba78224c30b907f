//! Service wrapper integration: config patching and log file discovery

pub mod config;
pub mod logfile;

pub use config::{CONSOLE_FLUSH_KEY, WrapperConfig, patch_file};
pub use logfile::{DEFAULT_LOGFILE, LOGFILE_KEY, auxiliary_log_path, normalize, resolve_log_path};
