//! Wall-clock source and timestamp formatting.
//!
//! A freshly booted device has no idea what time it is until NTP (or an RTC)
//! sets the clock. Until then [`Clock::now`] returns `None`, and anything that
//! would print a timestamp prints [`TIME_NOT_AVAILABLE`] instead.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Utc};
use tracing::{info, warn};

use crate::config::ClockConfig;
use crate::error::{Error, Result};
use crate::retry::{retry_async, RetryPolicy};

/// Shown in place of a timestamp while the clock is unsynchronized.
pub const TIME_NOT_AVAILABLE: &str = "Time not available";

/// Pattern for every persisted and displayed timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A clock reading earlier than this year means nobody has set the clock.
const MIN_SYNCED_YEAR: i32 = 2016;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local time, or `None` while the clock is not synchronized.
    fn now(&self) -> Option<NaiveDateTime>;

    /// Whether the clock currently reports a usable time.
    fn is_synchronized(&self) -> bool {
        self.now().is_some()
    }
}

/// Format a clock reading, substituting the sentinel for an unsynchronized clock.
#[must_use]
pub fn format_timestamp(now: Option<NaiveDateTime>) -> String {
    match now {
        Some(time) => time.format(TIMESTAMP_FORMAT).to_string(),
        None => TIME_NOT_AVAILABLE.to_string(),
    }
}

/// Filter out readings from a clock that was never set.
fn synchronized(local: NaiveDateTime) -> Option<NaiveDateTime> {
    (local.year() >= MIN_SYNCED_YEAR).then_some(local)
}

/// The host's system clock, viewed in either the system zone or a fixed offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// Use the system's local time zone.
    #[must_use]
    pub fn local() -> Self {
        Self { offset: None }
    }

    /// Use a fixed offset built from a base UTC offset plus a daylight-saving
    /// adjustment, both in seconds.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the combined offset is out of range.
    pub fn with_offsets(utc_offset_secs: i32, daylight_offset_secs: i32) -> Result<Self> {
        let total = utc_offset_secs.saturating_add(daylight_offset_secs);
        let offset = FixedOffset::east_opt(total).ok_or_else(|| Error::ConfigValidation {
            message: format!("clock offset {total}s is out of range"),
        })?;
        Ok(Self {
            offset: Some(offset),
        })
    }

    /// Build the clock described by the `[clock]` config section.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configured offsets are out of range.
    pub fn from_config(config: &ClockConfig) -> Result<Self> {
        match config.utc_offset_secs {
            Some(utc) => Self::with_offsets(utc, config.daylight_offset_secs),
            None => Ok(Self::local()),
        }
    }

    fn localize(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        match self.offset {
            Some(offset) => utc.with_timezone(&offset).naive_local(),
            None => utc.with_timezone(&Local).naive_local(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Option<NaiveDateTime> {
        synchronized(self.localize(Utc::now()))
    }
}

/// Result of waiting for the clock at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The clock reported a valid time.
    Synchronized,
    /// The attempt ceiling was reached; scans will carry the sentinel.
    Unavailable,
}

/// Wait for `clock` to synchronize, polling according to `policy`.
///
/// Never fails: running out of attempts is logged and the caller continues
/// in a degraded state.
pub async fn wait_for_sync(clock: &dyn Clock, policy: &RetryPolicy) -> SyncOutcome {
    info!("Configuring time...");
    let result = retry_async(policy, "time synchronization", |attempt| async move {
        clock.now().ok_or_else(|| {
            info!("Waiting for time synchronization... (attempt {attempt})");
            "clock not set"
        })
    })
    .await;

    match result {
        Ok(time) => {
            info!("Time configured: {}", format_timestamp(Some(time)));
            SyncOutcome::Synchronized
        }
        Err(exhausted) => {
            warn!("Failed to obtain time: {exhausted}");
            SyncOutcome::Unavailable
        }
    }
}

/// The retry policy for clock synchronization from config.
#[must_use]
pub fn sync_policy(config: &ClockConfig) -> RetryPolicy {
    RetryPolicy::fixed(
        config.sync_max_attempts,
        Duration::from_millis(config.sync_interval_ms),
    )
}

/// A clock under test control.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<Option<NaiveDateTime>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at(text: &str) -> Self {
        let time = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).expect("valid test time");
        Self {
            now: std::sync::Mutex::new(Some(time)),
        }
    }

    pub(crate) fn unsynchronized() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, text: &str) {
        let time = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).expect("valid test time");
        *self.now.lock().expect("clock lock") = Some(time);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Option<NaiveDateTime> {
        *self.now.lock().expect("clock lock")
    }
}
