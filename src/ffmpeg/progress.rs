//! # Progress Protocol Module
//!
//! Legge lo stream `key=value` che ffmpeg scrive quando parte con
//! `-progress unix://<path>`.
//!
//! ## Formato dello stream:
//! ```text
//! frame=240
//! out_time_us=10000000
//! out_time_ms=10000000
//! dup_frames=0
//! drop_frames=0
//! speed=2.01x
//! progress=continue
//! ```
//!
//! `out_time_ms` contiene microsecondi, esattamente come `out_time_us`.
//!
//! ## Emissione:
//! - I campi si accumulano in un unico record in corso
//! - Il record viene emesso quando `speed` e un tempo di output sono arrivati
//!   dall'ultima emissione
//! - Una riga `progress=` chiude il batch se ha riportato qualcosa di nuovo
//! - `progress=end` ferma il parser, i byte successivi sono ignorati
//! - Le righe malformate o sconosciute vengono saltate
//!
//! ## Socket:
//! [`ProgressSocket`] crea il socket unix in una directory temporanea, rimossa
//! al drop, e serve una sola connessione dell'encoder.

use crate::error::{Result, TranscodeError};
use crate::queue::ProgressUpdate;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const SOCKET_NAME: &str = "progress.sock";

/// Incremental parser for the ffmpeg progress protocol
#[derive(Debug, Default)]
pub struct ProgressParser {
    buffer: Vec<u8>,
    record: ProgressUpdate,
    seen_speed: bool,
    seen_time: bool,
    dirty: bool,
    finished: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `progress=end` was read
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume a chunk of the stream, returning the records it completed.
    ///
    /// A trailing partial line is kept until the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        if self.finished {
            return updates;
        }
        self.buffer.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            self.parse_line(&line, &mut updates);
            if self.finished {
                self.buffer.clear();
                return updates;
            }
        }
        self.buffer.drain(..start);
        updates
    }

    /// Flush the trailing unterminated line at end of stream
    pub fn finish(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.parse_line(&line, &mut updates);
        }
        self.finished = true;
        updates
    }

    fn parse_line(&mut self, line: &str, updates: &mut Vec<ProgressUpdate>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let Some((key, value)) = line.split_once('=') else {
            debug!(line, "malformed progress line");
            return;
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "speed" => match value.trim_end_matches('x').trim().parse::<f64>() {
                Ok(speed) if speed.is_finite() && speed >= 0.0 => {
                    self.record.speed = speed;
                    self.seen_speed = true;
                    self.dirty = true;
                }
                _ => trace!(value, "unparsable speed"),
            },
            // both are microseconds
            "out_time_us" | "out_time_ms" => match value.parse::<u64>() {
                Ok(micros) => {
                    self.record.converted = Duration::from_micros(micros);
                    self.seen_time = true;
                    self.dirty = true;
                }
                Err(_) => trace!(key, value, "unparsable output time"),
            },
            "frame" | "dup_frames" | "drop_frames" => match value.parse::<u64>() {
                Ok(count) => {
                    let slot = match key {
                        "frame" => &mut self.record.frame,
                        "dup_frames" => &mut self.record.dup_frames,
                        _ => &mut self.record.drop_frames,
                    };
                    *slot = Some(count);
                    self.dirty = true;
                }
                Err(_) => trace!(key, value, "unparsable counter"),
            },
            "progress" => {
                if self.dirty {
                    self.emit(updates);
                }
                match value {
                    "end" => self.finished = true,
                    "continue" => {}
                    other => debug!(value = other, "unknown progress marker"),
                }
                return;
            }
            _ => {
                trace!(key, "ignoring progress key");
                return;
            }
        }

        if self.seen_speed && self.seen_time {
            self.emit(updates);
        }
    }

    fn emit(&mut self, updates: &mut Vec<ProgressUpdate>) {
        updates.push(self.record.clone());
        self.seen_speed = false;
        self.seen_time = false;
        self.dirty = false;
    }
}

/// Unix socket the encoder connects to for progress reporting.
///
/// The socket lives in its own temporary directory, removed when the socket is
/// dropped.
#[derive(Debug)]
pub struct ProgressSocket {
    listener: UnixListener,
    path: PathBuf,
    _dir: TempDir,
}

impl ProgressSocket {
    /// Create a fresh temporary directory and listen on a socket inside it
    pub fn bind() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("transcode-progress-")
            .tempdir()?;
        let path = dir.path().join(SOCKET_NAME);
        let listener = UnixListener::bind(&path)
            .map_err(|e| TranscodeError::filesystem(&path, e))?;
        debug!(socket = %path.display(), "progress socket listening");
        Ok(Self {
            listener,
            path,
            _dir: dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for ffmpeg's `-progress` option
    pub fn url(&self) -> String {
        format!("unix://{}", self.path.display())
    }

    /// Accept one connection and feed parsed records to `on_progress`.
    ///
    /// Returns on `progress=end`, end of stream or cancellation. The socket and
    /// its directory are removed on every path.
    pub async fn serve<F>(self, cancel: CancellationToken, mut on_progress: F) -> Result<()>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let (mut stream, _) = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(socket = %self.path.display(), "progress socket cancelled before connect");
                return Ok(());
            }
            accepted = self.listener.accept() => accepted?,
        };

        let mut parser = ProgressParser::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = stream.read(&mut buf) => read?,
            };
            let updates = if read == 0 {
                parser.finish()
            } else {
                parser.feed(&buf[..read])
            };
            updates.into_iter().for_each(&mut on_progress);
            if parser.is_finished() {
                break;
            }
        }

        debug!(socket = %self.path.display(), "progress stream closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn update(converted_us: u64, speed: f64) -> ProgressUpdate {
        ProgressUpdate {
            converted: Duration::from_micros(converted_us),
            speed,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_record() {
        let mut parser = ProgressParser::new();
        let updates = parser.feed(b"speed=1.1x\nout_time_ms=1000\n");
        assert_eq!(updates, vec![update(1000, 1.1)]);
        assert_eq!(updates[0].converted, Duration::from_millis(1));
    }

    #[test]
    fn test_speed_alone_emits_nothing() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed(b"speed=1.1x\n").is_empty());
    }

    #[test]
    fn test_two_ordered_records() {
        let mut parser = ProgressParser::new();
        let updates = parser.feed(b"speed=1.0x\nout_time_ms=1\nspeed=1.1x\nout_time_ms=1000\n");
        assert_eq!(updates, vec![update(1, 1.0), update(1000, 1.1)]);
    }

    #[test]
    fn test_partial_lines_are_retained() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed(b"spe").is_empty());
        assert!(parser.feed(b"ed=2.0x\nout_time_us=50").is_empty());
        let updates = parser.feed(b"0\n");
        assert_eq!(updates, vec![update(500, 2.0)]);
        // nothing left to replay
        assert!(parser.feed(b"").is_empty());
    }

    #[test]
    fn test_progress_line_closes_batch() {
        let mut parser = ProgressParser::new();
        let updates = parser.feed(b"frame=10\nout_time_us=2000000\nprogress=continue\n");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].converted, Duration::from_secs(2));
        assert_eq!(updates[0].frame, Some(10));
        assert_eq!(updates[0].speed, 0.0);

        // batch already emitted by speed+time: the marker adds nothing
        let updates = parser.feed(b"out_time_us=3000000\nspeed=1.5x\nprogress=continue\n");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].frame, Some(10));
    }

    #[test]
    fn test_end_stops_parsing_mid_batch() {
        let mut parser = ProgressParser::new();
        let updates = parser.feed(b"speed=1.0x\nprogress=end\nout_time_us=5\nspeed=3.0x\n");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].speed, 1.0);
        assert!(parser.is_finished());
        assert!(parser.feed(b"speed=1.0x\nout_time_us=1\n").is_empty());
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let mut parser = ProgressParser::new();
        let updates = parser.feed(
            b"garbage\nspeed=N/A\nout_time_us=N/A\nbitrate=1000kbits/s\r\nspeed=0.5x\r\nout_time_us=10\r\n",
        );
        assert_eq!(updates, vec![update(10, 0.5)]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed(b"speed=1.0x\nout_time_us=7").is_empty());
        assert_eq!(parser.finish(), vec![update(7, 1.0)]);
        assert!(parser.is_finished());
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let socket = ProgressSocket::bind().unwrap();
        let path = socket.path().to_path_buf();
        let dir = path.parent().unwrap().to_path_buf();
        assert!(socket.url().starts_with("unix://"));

        let writer = tokio::spawn({
            let path = path.clone();
            async move {
                let mut stream = UnixStream::connect(&path).await.unwrap();
                stream
                    .write_all(b"speed=1.0x\nout_time_us=1000000\nprogress=continue\n")
                    .await
                    .unwrap();
                stream.write_all(b"speed=2.0x\nout_time_us=2000000\nprogress=end\n").await.unwrap();
            }
        });

        let mut received = Vec::new();
        socket
            .serve(CancellationToken::new(), |update| received.push(update))
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(received, vec![update(1_000_000, 1.0), update(2_000_000, 2.0)]);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_socket_cancel_before_connect() {
        let socket = ProgressSocket::bind().unwrap();
        let dir = socket.path().parent().unwrap().to_path_buf();
        let cancel = CancellationToken::new();
        cancel.cancel();
        socket.serve(cancel, |_| {}).await.unwrap();
        assert!(!dir.exists());
    }
}
