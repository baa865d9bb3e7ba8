//! The card-scan-to-record pipeline.
//!
//! Each [`ScanPipeline::step`] is one pass of the control loop: poll the
//! reader, and if a card was read, normalize its UID, stamp it with the clock
//! and write it to the store. The pipeline holds no backlog. Whatever
//! happens, the card is halted, the crypto session stopped and the pipeline
//! is back in [`PipelineState::Idle`] when `step` returns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::identifier::CardId;
use crate::reader::{CardReader, ReaderError, StopHandle};
use crate::record::ScanRecord;

/// Where the pipeline is in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Waiting for a card.
    #[default]
    Idle,
    /// A card has been read and is being recorded.
    Processing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

/// What one pass of the pipeline did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No new card was present.
    NoCard,
    /// The scan was written to the store.
    Stored(ScanRecord),
    /// The card was unusable and nothing was written.
    Rejected(String),
    /// The card was read but writing it failed.
    Failed(String),
}

/// Counts of scan outcomes since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Scans written to the store.
    pub stored: u64,
    /// Cards rejected before any write.
    pub rejected: u64,
    /// Scans whose write failed.
    pub failed: u64,
}

impl PipelineStats {
    fn count(&mut self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::NoCard => {}
            ScanOutcome::Stored(_) => self.stored += 1,
            ScanOutcome::Rejected(_) => self.rejected += 1,
            ScanOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stored, {} rejected, {} failed",
            self.stored, self.rejected, self.failed
        )
    }
}

/// Record one scan of `uid` through `context`.
///
/// An empty UID is rejected before anything is written. A failed write is
/// logged and reported, never retried.
pub async fn record_scan(context: &AppContext, uid: &[u8]) -> ScanOutcome {
    let id = match CardId::from_bytes(uid) {
        Ok(id) => id,
        Err(e) => {
            warn!("Ignoring card: {}", e);
            return ScanOutcome::Rejected(e.to_string());
        }
    };
    info!("Card UID: {}", id);

    let record = ScanRecord::stamped(id, context.clock());
    match context.store_scan(&record).await {
        Ok(()) => {
            info!("Recorded {} at {}", record.identifier, record.timestamp);
            ScanOutcome::Stored(record)
        }
        Err(e) => {
            error!("Failed to record scan of {}: {}", record.identifier, e);
            ScanOutcome::Failed(e.to_string())
        }
    }
}

/// Drives a [`CardReader`] into the record store.
#[derive(Debug)]
pub struct ScanPipeline<R> {
    reader: R,
    context: Arc<AppContext>,
    state: PipelineState,
    stats: PipelineStats,
}

impl<R: CardReader> ScanPipeline<R> {
    /// Create an idle pipeline.
    pub fn new(reader: R, context: Arc<AppContext>) -> Self {
        Self {
            reader,
            context,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        }
    }

    /// Current state. Always [`PipelineState::Idle`] between steps.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Outcome counts so far.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// The underlying reader.
    #[must_use]
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Run one pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Closed`] once the reader is gone. Read failures
    /// on a present card are an outcome, not an error.
    pub async fn step(&mut self) -> Result<ScanOutcome, ReaderError> {
        let outcome = match self.reader.poll_card().await {
            Ok(None) => return Ok(ScanOutcome::NoCard),
            Err(ReaderError::Closed) => return Err(ReaderError::Closed),
            Err(e) => {
                warn!("Unreadable card: {}", e);
                self.release();
                ScanOutcome::Rejected(e.to_string())
            }
            Ok(Some(uid)) => {
                self.state = PipelineState::Processing;
                let outcome = record_scan(&self.context, &uid).await;
                self.release();
                outcome
            }
        };
        self.stats.count(&outcome);
        Ok(outcome)
    }

    fn release(&mut self) {
        self.reader.halt_card();
        self.reader.stop_crypto();
        self.state = PipelineState::Idle;
    }

    /// Poll until `stop` is signalled or the reader closes.
    ///
    /// Returns the final counts, which are also logged.
    pub async fn run(&mut self, poll_interval: Duration, stop: &StopHandle) -> PipelineStats {
        info!("Waiting for cards on {} reader", self.reader.name());
        while !stop.should_stop() {
            match self.step().await {
                Ok(ScanOutcome::NoCard) => {
                    tokio::select! {
                        () = tokio::time::sleep(poll_interval) => {}
                        () = stop.stopped() => break,
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Stopping scan loop: {}", e);
                    break;
                }
            }
        }
        info!("Scan loop finished: {}", self.stats);
        self.stats
    }
}
