//! Readiness detection in node output

use std::sync::LazyLock;

use regex::Regex;

/// Decides whether a log line announces the node's web interface port
pub trait ReadinessProbe: Send + Sync {
    fn detect_port(&self, line: &str) -> Option<u16>;
}

static FPROXY_STARTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Starting FProxy on .*:(\d{2,5})").expect("FProxy pattern is valid")
});

static TRAILING_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d{2,5})\b\s*$").expect("trailing port pattern is valid"));

/// Probe for the node's "Starting FProxy on host:port" line
#[derive(Debug, Clone, Copy, Default)]
pub struct FproxyProbe;

impl ReadinessProbe for FproxyProbe {
    fn detect_port(&self, line: &str) -> Option<u16> {
        parse_fproxy_port(line)
    }
}

/// Extract the FProxy port from a log line
///
/// Falls back to a looser match (mentions "starting" and "fproxy" and ends
/// with `:<port>`) for reworded messages.
pub fn parse_fproxy_port(line: &str) -> Option<u16> {
    let digits = FPROXY_STARTED
        .captures(line)
        .and_then(|c| c.get(1))
        .or_else(|| {
            let lower = line.to_ascii_lowercase();
            if lower.contains("starting") && lower.contains("fproxy") {
                TRAILING_PORT.captures(line).and_then(|c| c.get(1))
            } else {
                None
            }
        })?;

    digits.as_str().parse::<u16>().ok().filter(|&port| port != 0)
}

/// Readiness probe built from a caller-supplied pattern
///
/// The first capture group must hold the port.
#[derive(Debug, Clone)]
pub struct PatternProbe {
    pattern: Regex,
}

impl PatternProbe {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl ReadinessProbe for PatternProbe {
    fn detect_port(&self, line: &str) -> Option<u16> {
        self.pattern
            .captures(line)?
            .get(1)?
            .as_str()
            .parse::<u16>()
            .ok()
            .filter(|&port| port != 0)
    }
}

/// Web interface address for `port`
pub fn browse_url(port: u16) -> String {
    format!("http://localhost:{port}/")
}
