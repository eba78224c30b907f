//! Starting, observing and stopping the node process

pub mod browser;
pub mod handle;
pub mod manager;
pub mod output;
pub mod readiness;
pub mod resolve;
pub mod state;

pub use browser::{BrowserOpener, SystemBrowser};
pub use handle::ProcessHandle;
pub use manager::{LauncherBuilder, ProcessLauncher};
pub use output::OutputReader;
pub use readiness::{FproxyProbe, PatternProbe, ReadinessProbe, browse_url, parse_fproxy_port};
pub use resolve::{CANDIDATES, ExecutableResolver, InstallDirResolver, validate_executable};
pub use state::{LifecycleState, Phase, StateStore};
