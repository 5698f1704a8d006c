//! Line sources feeding the ingestion pipeline

use maptail_core::{InputSource, Pipeline, SourcedLine};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// Log targets never fed back into the pipeline. Their records describe
/// pipeline work on an address or delivery to viewers, and re-ingesting
/// them would trigger the same work again.
pub const SELF_INGEST_EXCLUDED_TARGETS: &[&str] = &[
    "maptail_core::pipeline",
    "maptail_core::registry",
    "maptail_core::hub",
];

pub fn is_self_ingestible(target: &str) -> bool {
    !SELF_INGEST_EXCLUDED_TARGETS
        .iter()
        .any(|excluded| target.starts_with(excluded))
}

/// Longest stdin line kept; the rest of a longer line is discarded
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Reads newline-delimited lines until EOF and forwards them in order.
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_lines<R>(reader: R, sender: mpsc::Sender<SourcedLine>) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    read_lines_capped(reader, sender, MAX_LINE_BYTES).await
}

async fn read_lines_capped<R>(
    mut reader: R,
    sender: mpsc::Sender<SourcedLine>,
    max_line: usize,
) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        let consumed = read_capped_line(&mut reader, &mut buf, max_line).await?;
        if consumed == 0 {
            return Ok(count);
        }
        if consumed > buf.len() {
            tracing::debug!("Truncated input line of {} bytes", consumed);
        }

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches(['\n', '\r']);
        count += 1;

        if sender
            .send(SourcedLine::new(InputSource::Stdin, text))
            .await
            .is_err()
        {
            // Ingest loop is gone, nothing left to feed
            return Ok(count);
        }
    }
}

/// Like `read_until(b'\n')`, but keeps at most `max` bytes of the line in
/// `buf`. Returns the number of bytes consumed from `reader`.
async fn read_capped_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }

        let (len, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&available[..len.min(room)]);
        reader.consume(len);
        consumed += len;

        if done {
            return Ok(consumed);
        }
    }
}

/// Feeds every line into the pipeline in arrival order, echoing stdin lines
/// to `echo` when given. Runs until all senders are gone.
pub async fn run_ingest<W>(
    mut lines: mpsc::Receiver<SourcedLine>,
    pipeline: &Pipeline,
    mut echo: Option<W>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        if line.source == InputSource::Stdin {
            if let Some(out) = echo.as_mut() {
                let written = async {
                    out.write_all(line.text.as_bytes()).await?;
                    out.write_all(b"\n").await?;
                    out.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::warn!("Stopped echoing input: {}", e);
                    echo = None;
                }
            }
        }

        pipeline.on_line(&line.text);
    }
}

/// `MakeWriter` turning each formatted log record into self-log lines
#[derive(Clone)]
pub struct SelfLogWriter {
    sender: mpsc::Sender<SourcedLine>,
}

impl SelfLogWriter {
    pub fn new(sender: mpsc::Sender<SourcedLine>) -> Self {
        Self { sender }
    }
}

impl<'a> MakeWriter<'a> for SelfLogWriter {
    type Writer = SelfLogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        SelfLogRecord {
            buf: Vec::new(),
            sender: self.sender.clone(),
        }
    }
}

/// Buffers one formatted record and sends it when dropped
pub struct SelfLogRecord {
    buf: Vec<u8>,
    sender: mpsc::Sender<SourcedLine>,
}

impl io::Write for SelfLogRecord {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SelfLogRecord {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            // Never block the logging call site, a full queue loses the line
            let _ = self
                .sender
                .try_send(SourcedLine::new(InputSource::SelfLog, line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_lines() {
        let input: &[u8] = b"first\r\nsecond\n\nbad \xff byte\nlast-without-newline";
        let (tx, mut rx) = mpsc::channel(16);

        let count = read_lines(input, tx).await.unwrap();
        assert_eq!(count, 5);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            assert_eq!(line.source, InputSource::Stdin);
            lines.push(line.text);
        }
        assert_eq!(
            lines,
            vec!["first", "second", "", "bad \u{fffd} byte", "last-without-newline"]
        );
    }

    #[tokio::test]
    async fn test_long_lines_truncated() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nshort\n");
        let (tx, mut rx) = mpsc::channel(16);

        let count = read_lines_capped(&input[..], tx, 10).await.unwrap();
        assert_eq!(count, 2);

        assert_eq!(rx.try_recv().unwrap().text, "x".repeat(10));
        assert_eq!(rx.try_recv().unwrap().text, "short");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ingest_echoes_stdin_only() {
        use maptail_core::{Hub, NoopResolver, StreamConfig};
        use std::sync::Arc;

        let hub = Arc::new(Hub::new(&StreamConfig::default()));
        let pipeline = Pipeline::new(Arc::clone(&hub), Arc::new(NoopResolver), true, 4);
        let (tx, rx) = mpsc::channel(16);

        tx.send(SourcedLine::new(InputSource::Stdin, "from stdin")).await.unwrap();
        tx.send(SourcedLine::new(InputSource::SelfLog, "from ourselves")).await.unwrap();
        drop(tx);

        let mut echoed = Vec::new();
        run_ingest(rx, &pipeline, Some(&mut echoed)).await;
        pipeline.settle().await;

        assert_eq!(echoed, b"from stdin\n");
        assert_eq!(hub.log_snapshot().len(), 2);
        assert_eq!(pipeline.stats().lines, 2);
    }

    #[test]
    fn test_self_log_record_sends_on_drop() {
        let (tx, mut rx) = mpsc::channel(16);
        let writer = SelfLogWriter::new(tx);

        {
            let mut record = writer.make_writer();
            record.write_all(b"INFO maptail: listening on ").unwrap();
            record.write_all(b"0.0.0.0:3000\n").unwrap();
            assert!(rx.try_recv().is_err());
        }

        let line = rx.try_recv().unwrap();
        assert_eq!(line.source, InputSource::SelfLog);
        assert_eq!(line.text, "INFO maptail: listening on 0.0.0.0:3000");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_self_log_full_queue_drops() {
        let (tx, mut rx) = mpsc::channel(1);
        let writer = SelfLogWriter::new(tx);

        for n in 0..3 {
            let mut record = writer.make_writer();
            writeln!(record, "record {}", n).unwrap();
        }

        assert_eq!(rx.try_recv().unwrap().text, "record 0");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_excluded_targets() {
        assert!(!is_self_ingestible("maptail_core::pipeline"));
        assert!(!is_self_ingestible("maptail_core::registry"));
        assert!(is_self_ingestible("maptail::server"));
        assert!(is_self_ingestible("maptail_core::geo::maxmind"));
    }
}
