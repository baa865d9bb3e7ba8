//! Logging setup for cardlog.
//!
//! Scan events, store failures and HTTP request traces all go through
//! `tracing`; this module installs the subscriber that prints them.
//!
//! Request traces from `tower_http` are kept at `warn` unless the operator
//! asks for verbose output, so a busy profiles page does not bury the scan
//! log.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the recorder logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Scans, store failures and startup progress.
    #[default]
    Normal,
    /// Adds store calls, reader lines and per-request HTTP traces.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Map the `-q` / `-v` command-line flags to a verbosity.
    ///
    /// `quiet` wins over any number of `-v`.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Level for the recorder's own events.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Level for HTTP request traces.
    #[must_use]
    pub fn http_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose | Self::Trace => self.level(),
        }
    }

    /// Whether log lines carry their module target.
    #[must_use]
    pub fn shows_targets(self) -> bool {
        matches!(self, Self::Verbose | Self::Trace)
    }

    /// The filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_filter(self) -> String {
        format!("cardlog={},tower_http={}", self.level(), self.http_level())
    }
}

/// Initialize the logging system.
///
/// Call once at startup. `RUST_LOG` takes precedence over `verbosity`.
///
/// ```no_run
/// use cardlog::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(verbosity.shows_targets()));

    // Already installed (e.g. by a test) is fine.
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Verbosity; 4] = [
        Verbosity::Quiet,
        Verbosity::Normal,
        Verbosity::Verbose,
        Verbosity::Trace,
    ];

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(3, false), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(2, true), Verbosity::Quiet);
    }

    #[test]
    fn test_http_traces_hidden_at_normal() {
        assert_eq!(
            Verbosity::Normal.default_filter(),
            "cardlog=INFO,tower_http=WARN"
        );
        assert_eq!(
            Verbosity::Verbose.default_filter(),
            "cardlog=DEBUG,tower_http=DEBUG"
        );
        assert_eq!(
            Verbosity::Quiet.default_filter(),
            "cardlog=ERROR,tower_http=ERROR"
        );
    }

    #[test]
    fn test_targets_only_when_verbose() {
        assert!(!Verbosity::Normal.shows_targets());
        assert!(Verbosity::Trace.shows_targets());
    }

    #[test]
    fn test_default_filter_parses() {
        for verbosity in ALL {
            assert!(EnvFilter::try_new(verbosity.default_filter()).is_ok());
        }
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging(Verbosity::Verbose);
        init_logging(Verbosity::Quiet);
    }
}
