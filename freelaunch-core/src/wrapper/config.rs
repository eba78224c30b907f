//! Line-preserving editor for the service wrapper's `key=value` config

use std::path::Path;

use tracing::debug;

use crate::error::WrapperConfigError;

/// Key that makes the wrapper flush console output after every line
pub const CONSOLE_FLUSH_KEY: &str = "wrapper.console.flush";

/// Wrapper configuration held as raw lines
///
/// Only the value of an upserted key is ever rewritten; comments, blank
/// lines and ordering survive untouched. Lines are rendered with the
/// terminator of the first line read, so CRLF files stay CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperConfig {
    lines: Vec<String>,
    newline: &'static str,
    trailing_newline: bool,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self::from_lines(Vec::<String>::new())
    }
}

impl WrapperConfig {
    /// Parse file contents into lines
    pub fn parse(contents: &str) -> Self {
        let newline = match contents.find('\n') {
            Some(end) if contents[..end].ends_with('\r') => "\r\n",
            _ => "\n",
        };
        Self {
            lines: contents.lines().map(str::to_string).collect(),
            newline,
            trailing_newline: contents.is_empty() || contents.ends_with('\n'),
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            newline: "\n",
            trailing_newline: true,
        }
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self, WrapperConfigError> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Value of the first line setting `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|line| split_entry(line).filter(|(k, _)| *k == key).map(|(_, v)| v))
    }

    /// Set `key` to `value`.
    ///
    /// Replaces the first line setting `key`, or appends one. Returns whether
    /// anything changed.
    pub fn upsert(&mut self, key: &str, value: &str) -> bool {
        let wanted = format!("{key}={value}");
        let existing = self
            .lines
            .iter()
            .position(|line| split_entry(line).is_some_and(|(k, _)| k == key));

        match existing {
            Some(index) if self.lines[index] == wanted => false,
            Some(index) => {
                self.lines[index] = wanted;
                true
            }
            None => {
                self.lines.push(wanted);
                true
            }
        }
    }

    /// Render back to file contents
    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.newline);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.newline);
        }
        out
    }
}

/// Split a `key=value` line, skipping comments and blanks
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Upsert one key into the config file at `path`.
///
/// The file is only rewritten when the value actually changes. Returns
/// whether it was rewritten.
pub fn patch_file(path: &Path, key: &str, value: &str) -> Result<bool, WrapperConfigError> {
    let mut config = WrapperConfig::load(path)?;
    if !config.upsert(key, value) {
        debug!(path = %path.display(), key, "Wrapper config already up to date");
        return Ok(false);
    }
    std::fs::write(path, config.render())?;
    debug!(path = %path.display(), key, value, "Patched wrapper config");
    Ok(true)
}
