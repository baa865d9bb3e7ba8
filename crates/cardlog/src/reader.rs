//! Card reader abstraction.
//!
//! A reader answers one question per poll: is a new card present, and if so,
//! what are its UID bytes. After every attempt the pipeline releases the
//! session by halting the card and stopping the crypto session, whether or not
//! the scan was stored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

/// Lines buffered between the reading task and the pipeline.
const LINE_BUFFER: usize = 16;

/// Errors raised by a card reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The reader device could not be opened.
    #[error("failed to open reader {device}: {source}")]
    Open {
        /// Device path.
        device: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A card was present but its serial could not be read.
    #[error("failed to read card serial: {0}")]
    ReadFailed(String),

    /// The reader went away; no more cards will arrive.
    #[error("card reader closed")]
    Closed,
}

/// A source of card scans.
#[async_trait]
pub trait CardReader: Send + fmt::Debug {
    /// Short reader name for logs.
    fn name(&self) -> &'static str;

    /// Check for a new card and read its serial.
    ///
    /// Returns `Ok(None)` when no new card is present.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::ReadFailed`] if a card was detected but could
    /// not be read, or [`ReaderError::Closed`] once the reader is gone.
    async fn poll_card(&mut self) -> Result<Option<Vec<u8>>, ReaderError>;

    /// Put the current card into the halt state.
    fn halt_card(&mut self);

    /// End the authenticated session with the current card.
    fn stop_crypto(&mut self);
}

/// Reader for bridges that print one UID per line.
///
/// Lines are read on a background task so that polling never blocks the
/// control loop. Accepted forms are contiguous hex (`041AFF`) and separated
/// bytes (`4 1A FF`, `04:1a:ff`). Blank lines are ignored.
#[derive(Debug)]
pub struct LineReader {
    lines: mpsc::Receiver<Result<String, String>>,
    source: String,
}

impl LineReader {
    /// Read UIDs from `device`, or from stdin when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Open`] if the device cannot be opened.
    pub async fn open(device: Option<&Path>) -> Result<Self, ReaderError> {
        match device {
            Some(path) => {
                let file =
                    tokio::fs::File::open(path)
                        .await
                        .map_err(|source| ReaderError::Open {
                            device: path.to_path_buf(),
                            source,
                        })?;
                Ok(Self::from_source(file, path.display().to_string()))
            }
            None => Ok(Self::from_source(tokio::io::stdin(), "stdin".to_string())),
        }
    }

    /// Read UIDs from any async byte source.
    pub fn from_source<S>(source: S, label: String) -> Self
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let task_label = label.clone();
        tokio::spawn(async move {
            let mut source = BufReader::new(source);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match source.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        debug!("Reader source {} reached end of input", task_label);
                        break;
                    }
                    Ok(_) => {
                        let line = String::from_utf8(std::mem::take(&mut buf))
                            .map_err(|e| format!("line is not text: {e}"));
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Reader source {} failed: {}", task_label, e);
                        break;
                    }
                }
            }
        });
        Self {
            lines: rx,
            source: label,
        }
    }

    /// Where this reader takes its lines from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[async_trait]
impl CardReader for LineReader {
    fn name(&self) -> &'static str {
        "line"
    }

    async fn poll_card(&mut self) -> Result<Option<Vec<u8>>, ReaderError> {
        loop {
            match self.lines.try_recv() {
                Ok(Ok(line)) if line.trim().is_empty() => {}
                Ok(Ok(line)) => return parse_uid_line(&line).map(Some),
                Ok(Err(reason)) => return Err(ReaderError::ReadFailed(reason)),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(ReaderError::Closed),
            }
        }
    }

    // A line source has no card session to release.
    fn halt_card(&mut self) {}

    fn stop_crypto(&mut self) {}
}

/// Parse one reader line into UID bytes.
///
/// # Errors
///
/// Returns [`ReaderError::ReadFailed`] if the line is not a UID.
pub fn parse_uid_line(line: &str) -> Result<Vec<u8>, ReaderError> {
    let line = line.trim();
    let separated = line.contains(|c: char| c == ':' || c == '-' || c.is_whitespace());

    if !separated {
        return crate::identifier::decode_hex(line)
            .map_err(|reason| ReaderError::ReadFailed(format!("'{line}': {reason}")));
    }

    line.split(|c: char| c == ':' || c == '-' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            if token.len() > 2 {
                return Err(ReaderError::ReadFailed(format!(
                    "'{line}': byte '{token}' is longer than two digits"
                )));
            }
            u8::from_str_radix(token, 16).map_err(|_| {
                ReaderError::ReadFailed(format!("'{line}': '{token}' is not a hex byte"))
            })
        })
        .collect()
}

/// A cloneable stop signal for the scan loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stop_signal: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal everything holding this handle to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Resolve once [`StopHandle::stop`] has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.should_stop() {
                return;
            }
            notified.await;
        }
    }
}

/// A reader that replays a fixed list of polls.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedReader {
    polls: std::collections::VecDeque<Result<Option<Vec<u8>>, ReaderError>>,
    pub(crate) halts: usize,
    pub(crate) crypto_stops: usize,
}

#[cfg(test)]
impl ScriptedReader {
    pub(crate) fn new(
        polls: impl IntoIterator<Item = Result<Option<Vec<u8>>, ReaderError>>,
    ) -> Self {
        Self {
            polls: polls.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn cards<'a>(cards: impl IntoIterator<Item = &'a [u8]>) -> Self {
        Self::new(cards.into_iter().map(|uid| Ok(Some(uid.to_vec()))))
    }
}

#[cfg(test)]
#[async_trait]
impl CardReader for ScriptedReader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn poll_card(&mut self) -> Result<Option<Vec<u8>>, ReaderError> {
        self.polls.pop_front().unwrap_or(Err(ReaderError::Closed))
    }

    fn halt_card(&mut self) {
        self.halts += 1;
    }

    fn stop_crypto(&mut self) {
        self.crypto_stops += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contiguous_hex() {
        assert_eq!(parse_uid_line("041AFF").unwrap(), vec![0x04, 0x1A, 0xFF]);
        assert_eq!(parse_uid_line("  041aff\r").unwrap(), vec![0x04, 0x1A, 0xFF]);
    }

    #[test]
    fn test_parse_separated_bytes_with_dropped_zeros() {
        assert_eq!(parse_uid_line("4 1A FF").unwrap(), vec![0x04, 0x1A, 0xFF]);
        assert_eq!(parse_uid_line("04:1a:ff").unwrap(), vec![0x04, 0x1A, 0xFF]);
        assert_eq!(parse_uid_line("DE-AD-BE-EF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_uid_line("hello"),
            Err(ReaderError::ReadFailed(_))
        ));
        assert!(matches!(
            parse_uid_line("041"),
            Err(ReaderError::ReadFailed(_))
        ));
        assert!(matches!(
            parse_uid_line("04 1AF"),
            Err(ReaderError::ReadFailed(_))
        ));
        assert!(matches!(
            parse_uid_line("04 ZZ"),
            Err(ReaderError::ReadFailed(_))
        ));
    }

    #[test]
    fn test_parse_blank_is_empty_uid() {
        assert!(parse_uid_line("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_line_reader_yields_cards_then_closes() {
        let input: &[u8] = b"041AFF\n\n04:1a:ff\nnot-a-card\n";
        let mut reader = LineReader::from_source(input, "test".to_string());
        assert_eq!(reader.source(), "test");

        let mut cards = Vec::new();
        let mut failures = 0;
        loop {
            match reader.poll_card().await {
                Ok(Some(uid)) => cards.push(uid),
                Ok(None) => tokio::task::yield_now().await,
                Err(ReaderError::ReadFailed(_)) => failures += 1,
                Err(ReaderError::Closed) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(cards, vec![vec![0x04, 0x1A, 0xFF], vec![0x04, 0x1A, 0xFF]]);
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_line_reader_survives_non_text_line() {
        let input: &[u8] = b"\xff\xfe\n041AFF\n";
        let mut reader = LineReader::from_source(input, "serial".to_string());

        let mut cards = Vec::new();
        let mut failures = 0;
        loop {
            match reader.poll_card().await {
                Ok(Some(uid)) => cards.push(uid),
                Ok(None) => tokio::task::yield_now().await,
                Err(ReaderError::ReadFailed(reason)) => {
                    assert!(reason.contains("not text"));
                    failures += 1;
                }
                Err(ReaderError::Closed) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(failures, 1);
        assert_eq!(cards, vec![vec![0x04, 0x1A, 0xFF]]);
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let err = LineReader::open(Some(Path::new("/nonexistent/cardlog-reader")))
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/cardlog-reader"));
    }

    #[tokio::test]
    async fn test_scripted_reader_counts_release() {
        let mut reader = ScriptedReader::cards([&[0x01_u8][..]]);
        assert_eq!(reader.poll_card().await.unwrap(), Some(vec![0x01]));
        reader.halt_card();
        reader.stop_crypto();
        assert_eq!((reader.halts, reader.crypto_stops), (1, 1));
        assert!(matches!(reader.poll_card().await, Err(ReaderError::Closed)));
    }

    #[test]
    fn test_stop_handle_clone_shares_signal() {
        let handle1 = StopHandle::new();
        let handle2 = handle1.clone();
        assert!(!handle2.should_stop());

        handle1.stop();
        assert!(handle2.should_stop());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let handle = StopHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });
        tokio::task::yield_now().await;
        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_when_already_stopped() {
        let handle = StopHandle::new();
        handle.stop();
        handle.stopped().await;
    }
}
