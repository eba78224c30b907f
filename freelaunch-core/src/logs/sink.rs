//! Log sink shared by every producer of user-visible output
//!
//! Lines are broadcast to live subscribers and kept in a bounded history so
//! a frontend attaching late can replay what it missed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of lines kept for replay
pub const DEFAULT_HISTORY: usize = 1000;

/// Where a log line came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// The node's stdout/stderr
    Process,
    /// The tailed wrapper log file
    LogFile,
    /// The launcher itself
    Launcher,
}

/// A single line of output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub source: LogSource,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Multicast log sink with replay history
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct LogSink {
    tx: broadcast::Sender<LogLine>,
    history: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl LogSink {
    /// Create a sink keeping up to `capacity` lines of history
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Publish a line
    pub fn emit(&self, source: LogSource, text: impl Into<String>) {
        let line = LogLine {
            source,
            text: text.into(),
            at: Utc::now(),
        };

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if self.capacity > 0 {
                if history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(line.clone());
            }
        }

        // No receivers is fine
        let _ = self.tx.send(line);
    }

    /// Subscribe to lines published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.tx.subscribe()
    }

    /// Snapshot of the retained history, oldest first
    pub fn history(&self) -> Vec<LogLine> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}
