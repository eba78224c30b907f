//! Log plumbing: the shared sink and the wrapper log file tailer

pub mod sink;
pub mod tail;

pub use sink::{DEFAULT_HISTORY, LogLine, LogSink, LogSource};
pub use tail::{LogCursor, LogTailer, TAIL_INTERVAL};
