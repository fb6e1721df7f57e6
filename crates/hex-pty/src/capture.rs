//! Byte capture with an idle deadline.
//!
//! A dedicated thread performs the blocking reads and forwards chunks over a
//! channel; the async side waits for each chunk until a deadline that is
//! pushed forward after every successful read.

use std::io::{ErrorKind, Read};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

const READ_CHUNK: usize = 4096;

/// Why capture stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The writer closed the stream (child exited or hung up).
    Eof,
    /// No bytes arrived within the idle window.
    IdleTimeout,
}

/// Everything read from the stream before it ended.
#[derive(Debug, Clone)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub end: CaptureEnd,
}

impl Capture {
    /// Decode permissively; invalid sequences become U+FFFD.
    ///
    /// Decoding happens once over the whole buffer so a multi-byte character
    /// split across two reads is reassembled intact.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Read from `reader` until EOF or until `idle` elapses with no new bytes.
pub async fn collect<R>(reader: R, idle: Duration) -> Capture
where
    R: Read + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // A plain thread, not spawn_blocking: after an idle timeout the read may
    // stay blocked until the child is killed.
    if let Err(e) = std::thread::Builder::new()
        .name("hex-pty-reader".into())
        .spawn(move || read_chunks(reader, tx))
    {
        tracing::warn!("Failed to spawn pty reader thread: {}", e);
    }

    let mut bytes = Vec::new();
    let mut deadline = Instant::now() + idle;

    let end = loop {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(chunk)) => {
                bytes.extend_from_slice(&chunk);
                deadline = Instant::now() + idle;
            }
            Ok(None) => break CaptureEnd::Eof,
            Err(_) => break CaptureEnd::IdleTimeout,
        }
    };

    tracing::debug!(bytes = bytes.len(), end = ?end, "Capture finished");
    Capture { bytes, end }
}

fn read_chunks<R: Read>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once the slave side is gone.
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Yields the given chunks one per read, then blocks or ends.
    struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
        stall: Option<Duration>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    if let Some(stall) = self.stall {
                        std::thread::sleep(stall);
                    }
                    Ok(0)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_collect_until_eof() {
        let capture = collect(Cursor::new(b"hello pty".to_vec()), Duration::from_secs(5)).await;
        assert_eq!(capture.end, CaptureEnd::Eof);
        assert_eq!(capture.text(), "hello pty");
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        let bytes = "héllo 日本".as_bytes().to_vec();
        // Split inside the two-byte 'é' and inside '日'.
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![
                bytes[..2].to_vec(),
                bytes[2..8].to_vec(),
                bytes[8..].to_vec(),
            ]),
            stall: None,
        };
        let capture = collect(reader, Duration::from_secs(5)).await;
        assert_eq!(capture.text(), "héllo 日本");
        assert!(!capture.text().contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let capture = collect(Cursor::new(vec![b'o', b'k', 0xff, 0xfe]), Duration::from_secs(5)).await;
        assert!(capture.text().starts_with("ok"));
        assert!(capture.text().contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_idle_timeout_keeps_partial_output() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![b"partial".to_vec()]),
            stall: Some(Duration::from_secs(3)),
        };
        let started = std::time::Instant::now();
        let capture = collect(reader, Duration::from_millis(150)).await;
        assert_eq!(capture.end, CaptureEnd::IdleTimeout);
        assert_eq!(capture.text(), "partial");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
