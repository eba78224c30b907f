//! Hand-off to the desktop's default browser

use std::process::{Command, Stdio};

use tracing::debug;

/// Opens a URL for the user
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    /// Build the platform command for opening `url`
    pub fn command(url: &str) -> Command {
        let mut cmd = if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let mut child = Self::command(url).spawn()?;
        debug!(url, pid = child.id(), "Launched browser");
        // Reap the opener so it does not linger as a zombie
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_passes_url_last() {
        let cmd = SystemBrowser::command("http://localhost:8888/");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args.last().unwrap().to_str(), Some("http://localhost:8888/"));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn command_uses_xdg_open_on_linux() {
        let cmd = SystemBrowser::command("http://localhost:8888/");
        assert_eq!(cmd.get_program(), "xdg-open");
    }
}
