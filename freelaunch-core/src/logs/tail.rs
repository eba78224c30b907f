//! Polling tailer for the wrapper's on-disk log file

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::sink::{LogSink, LogSource};

/// Interval between file polls
pub const TAIL_INTERVAL: Duration = Duration::from_millis(200);

/// Read position within a tailed file plus any unterminated trailing line
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogCursor {
    position: u64,
    partial: Vec<u8>,
}

impl LogCursor {
    /// Cursor starting at `position`
    pub fn at(position: u64) -> Self {
        Self {
            position,
            partial: Vec::new(),
        }
    }

    /// Byte offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes of a line that has not seen its newline yet
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Record the file's current length.
    ///
    /// A length below the cursor means the file was rotated or truncated; the
    /// cursor restarts from 0 and the stale partial line is dropped. Returns
    /// whether that happened.
    pub fn observe_len(&mut self, len: u64) -> bool {
        if len < self.position {
            self.position = 0;
            self.partial.clear();
            true
        } else {
            false
        }
    }

    /// Consume newly read bytes and return every completed line
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.position += chunk.len() as u64;
        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect()
    }
}

/// Decode one line without its terminator, replacing invalid UTF-8
pub(crate) fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Follows a log file and forwards appended lines to the sink
pub struct LogTailer {
    path: PathBuf,
    sink: LogSink,
    interval: Duration,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>, sink: LogSink) -> Self {
        Self {
            path: path.into(),
            sink,
            interval: TAIL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the file until `stopped` resolves.
    ///
    /// Content already in the file when tailing begins is skipped. After
    /// `stopped` resolves one last poll picks up lines written just before exit.
    pub async fn run_until<F>(self, stopped: F)
    where
        F: Future<Output = ()>,
    {
        let mut cursor = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => LogCursor::at(meta.len()),
            Err(_) => LogCursor::default(),
        };
        debug!(path = %self.path.display(), position = cursor.position(), "Tailing log file");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {}
            }
            self.poll_logged(&mut cursor).await;
        }

        self.poll_logged(&mut cursor).await;
        debug!(path = %self.path.display(), "Stopped tailing log file");
    }

    async fn poll_logged(&self, cursor: &mut LogCursor) {
        if let Err(e) = self.poll(cursor).await {
            debug!(path = %self.path.display(), error = %e, "Log tail poll failed");
        }
    }

    /// Read whatever was appended since the last poll
    async fn poll(&self, cursor: &mut LogCursor) -> std::io::Result<()> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if cursor.observe_len(len) {
            debug!(path = %self.path.display(), "Log file shrank, rereading from start");
        }
        if len <= cursor.position() {
            return Ok(());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(cursor.position())).await?;
        let mut chunk = Vec::new();
        file.take(len - cursor.position())
            .read_to_end(&mut chunk)
            .await?;

        for line in cursor.feed(&chunk) {
            self.sink.emit(LogSource::LogFile, line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn feed_emits_complete_lines_only() {
        let mut cursor = LogCursor::default();
        let lines = cursor.feed(b"one\ntwo\nthr");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(cursor.pending(), b"thr");
        assert_eq!(cursor.position(), 11);
    }

    #[test]
    fn feed_reassembles_partial_line_across_reads() {
        let mut cursor = LogCursor::default();
        assert!(cursor.feed(b"hel").is_empty());
        assert_eq!(cursor.feed(b"lo\n"), vec!["hello"]);
        assert!(cursor.pending().is_empty());
    }

    #[test]
    fn feed_strips_carriage_returns() {
        let mut cursor = LogCursor::default();
        assert_eq!(cursor.feed(b"a\r\nb\r\n"), vec!["a", "b"]);
    }

    #[test]
    fn feed_keeps_blank_lines() {
        let mut cursor = LogCursor::default();
        assert_eq!(cursor.feed(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn observe_len_resets_on_shrink() {
        let mut cursor = LogCursor::default();
        cursor.feed(b"0123456789partial");
        assert!(cursor.observe_len(4));
        assert_eq!(cursor.position(), 0);
        assert!(cursor.pending().is_empty());
    }

    #[test]
    fn observe_len_keeps_position_while_growing() {
        let mut cursor = LogCursor::at(10);
        assert!(!cursor.observe_len(10));
        assert!(!cursor.observe_len(25));
        assert_eq!(cursor.position(), 10);
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn collect_lines(sink: &LogSink) -> Vec<String> {
        sink.history()
            .into_iter()
            .filter(|l| l.source == LogSource::LogFile)
            .map(|l| l.text)
            .collect()
    }

    #[tokio::test]
    async fn tailer_skips_existing_content_and_follows_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrapper.log");
        append(&path, "old line\n");

        let sink = LogSink::default();
        let tailer = LogTailer::new(&path, sink.clone()).with_interval(Duration::from_millis(10));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(tailer.run_until(async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, "new line\npart");
        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, "ial\n");
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(collect_lines(&sink), vec!["new line", "partial"]);
    }

    #[tokio::test]
    async fn tailer_waits_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("later.log");

        let sink = LogSink::default();
        let tailer = LogTailer::new(&path, sink.clone()).with_interval(Duration::from_millis(10));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(tailer.run_until(async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(40)).await;
        append(&path, "created\n");
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(collect_lines(&sink), vec!["created"]);
    }

    #[tokio::test]
    async fn tailer_rereads_after_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrapper.log");
        std::fs::write(&path, "").unwrap();

        let sink = LogSink::default();
        let tailer = LogTailer::new(&path, sink.clone()).with_interval(Duration::from_millis(10));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(tailer.run_until(async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        append(&path, "a fairly long first line\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "rotated\n").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(
            collect_lines(&sink),
            vec!["a fairly long first line", "rotated"]
        );
    }

    #[tokio::test]
    async fn tailer_drains_once_after_stop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrapper.log");
        std::fs::write(&path, "").unwrap();

        let sink = LogSink::default();
        // Long interval: only the final drain can pick the line up
        let tailer = LogTailer::new(&path, sink.clone()).with_interval(Duration::from_secs(60));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(tailer.run_until(async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        append(&path, "last words\n");
        stop_tx.send(()).unwrap();
        task.await.unwrap();

        assert_eq!(collect_lines(&sink), vec!["last words"]);
    }
}
