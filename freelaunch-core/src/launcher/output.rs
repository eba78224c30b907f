//! Streaming of the node's stdout/stderr into the log sink

use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use super::readiness::ReadinessProbe;
use crate::logs::tail::decode_line;
use crate::logs::{LogSink, LogSource};

/// Boxed stream of output lines
pub type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<String>> + Send>>;

/// Lines of a single pipe, or nothing if the pipe was not captured.
///
/// Bytes that are not valid UTF-8 are replaced rather than dropping the line.
/// The stream ends after the first read error.
pub fn lines_of<R>(reader: Option<R>) -> LineStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else {
        return Box::pin(tokio_stream::empty());
    };

    let start = Some((BufReader::new(reader), Vec::new()));
    Box::pin(stream::unfold(start, |state| async move {
        let Some((mut reader, mut buf)) = state else {
            return None;
        };
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(decode_line(&buf)), Some((reader, buf)))),
            Err(e) => Some((Err(e), None)),
        }
    }))
}

/// Interleave stdout and stderr lines as they arrive
pub fn merged_lines<O, E>(stdout: Option<O>, stderr: Option<E>) -> LineStream
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(lines_of(stdout).merge(lines_of(stderr)))
}

/// Forwards output lines and watches them for the readiness marker
pub struct OutputReader {
    sink: LogSink,
    probe: Arc<dyn ReadinessProbe>,
}

impl OutputReader {
    pub fn new(sink: LogSink, probe: Arc<dyn ReadinessProbe>) -> Self {
        Self { sink, probe }
    }

    /// Read until the stream closes.
    ///
    /// `on_port` is called for every readiness match with the port and
    /// whether it is the first match of this stream.
    pub async fn run<S, F>(self, mut lines: S, mut on_port: F)
    where
        S: Stream<Item = std::io::Result<String>> + Unpin,
        F: FnMut(u16, bool),
    {
        let mut announced = false;
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!(error = %e, "Output stream failed");
                    break;
                }
            };

            let port = self.probe.detect_port(&line);
            self.sink.emit(LogSource::Process, line);
            if let Some(port) = port {
                if !announced {
                    info!(port, "Node web interface is up");
                }
                on_port(port, !announced);
                announced = true;
            }
        }
        debug!("Output stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::readiness::FproxyProbe;

    fn stream_of(lines: &[&str]) -> LineStream {
        let owned: Vec<std::io::Result<String>> =
            lines.iter().map(|l| Ok(l.to_string())).collect();
        Box::pin(tokio_stream::iter(owned))
    }

    #[tokio::test]
    async fn forwards_every_line_in_order() {
        let sink = LogSink::default();
        let reader = OutputReader::new(sink.clone(), Arc::new(FproxyProbe));

        reader.run(stream_of(&["a", "b", "c"]), |_, _| {}).await;

        let texts: Vec<_> = sink.history().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn only_first_match_is_flagged_first() {
        let sink = LogSink::default();
        let reader = OutputReader::new(sink, Arc::new(FproxyProbe));
        let mut seen = Vec::new();

        reader
            .run(
                stream_of(&[
                    "booting",
                    "Starting FProxy on 127.0.0.1:8888",
                    "Starting FProxy on 127.0.0.1:8888",
                    "Starting FProxy on 127.0.0.1:9999",
                ]),
                |port, first| seen.push((port, first)),
            )
            .await;

        assert_eq!(seen, vec![(8888, true), (8888, false), (9999, false)]);
    }

    #[tokio::test]
    async fn undecodable_bytes_keep_the_line() {
        let sink = LogSink::default();
        let reader = OutputReader::new(sink.clone(), Arc::new(FproxyProbe));
        let (mut w, r) = tokio::io::duplex(128);
        use tokio::io::AsyncWriteExt;
        w.write_all(b"Caf\xe9 Starting FProxy on 127.0.0.1:8888\r\nnext\n")
            .await
            .unwrap();
        drop(w);
        let mut ports = Vec::new();

        reader
            .run(lines_of(Some(r)), |port, _| ports.push(port))
            .await;

        let texts: Vec<_> = sink.history().into_iter().map(|l| l.text).collect();
        assert_eq!(
            texts,
            vec!["Caf\u{fffd} Starting FProxy on 127.0.0.1:8888", "next"]
        );
        assert_eq!(ports, vec![8888]);
    }

    #[tokio::test]
    async fn readiness_line_is_logged_before_callback() {
        let sink = LogSink::default();
        let reader = OutputReader::new(sink.clone(), Arc::new(FproxyProbe));
        let observer = sink.clone();
        let mut seen_before = Vec::new();

        reader
            .run(stream_of(&["Starting FProxy on 127.0.0.1:8888"]), |_, _| {
                seen_before = observer.history().into_iter().map(|l| l.text).collect();
                observer.emit(LogSource::Launcher, "Opening http://localhost:8888/");
            })
            .await;

        assert_eq!(seen_before, vec!["Starting FProxy on 127.0.0.1:8888"]);
        let sources: Vec<_> = sink.history().into_iter().map(|l| l.source).collect();
        assert_eq!(sources, vec![LogSource::Process, LogSource::Launcher]);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_kept() {
        let (mut w, r) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        w.write_all(b"first\nunterminated").await.unwrap();
        drop(w);

        let lines: Vec<String> = lines_of(Some(r)).map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["first", "unterminated"]);
    }

    #[tokio::test]
    async fn merged_lines_reads_both_pipes() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let (mut err_w, err_r) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        out_w.write_all(b"to stdout\n").await.unwrap();
        err_w.write_all(b"to stderr\n").await.unwrap();
        drop(out_w);
        drop(err_w);

        let mut lines: Vec<String> = merged_lines(Some(out_r), Some(err_r))
            .map(|l| l.unwrap())
            .collect()
            .await;
        lines.sort();
        assert_eq!(lines, vec!["to stderr", "to stdout"]);
    }

    #[tokio::test]
    async fn missing_pipe_yields_nothing() {
        let lines: Vec<_> = lines_of(None::<tokio::io::DuplexStream>).collect().await;
        assert!(lines.is_empty());
    }
}
