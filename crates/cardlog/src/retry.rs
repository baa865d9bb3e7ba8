//! Bounded retry policy for startup waits.
//!
//! Waiting for the clock to synchronize and for the cloud sign-in to succeed
//! are the only places that retry. Both are described by a [`RetryPolicy`]
//! and driven by the [`RetryState`] machine, which decides after each failed
//! attempt whether to try again and how long to wait first.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How many times to try, how long to wait between tries, and an optional
/// overall deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each failure (1 keeps it fixed).
    pub multiplier: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Overall wall-clock budget measured from the first attempt.
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// A policy with a fixed delay between attempts and no deadline.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            multiplier: 1,
            max_delay: delay,
            timeout: None,
        }
    }

    /// Grow the delay by `multiplier` after each failure, capped at `max_delay`.
    #[must_use]
    pub fn with_backoff(mut self, multiplier: u32, max_delay: Duration) -> Self {
        self.multiplier = multiplier.max(1);
        self.max_delay = max_delay.max(self.initial_delay);
        self
    }

    /// Stop retrying once `timeout` has elapsed since the first attempt.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The delay to wait after the `failures`-th failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..failures {
            delay = delay.saturating_mul(self.multiplier);
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay.min(self.max_delay)
    }
}

/// Why a retry loop stopped without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Every allowed attempt failed.
    AttemptsExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
    /// The overall deadline passed.
    TimedOut {
        /// Time spent before giving up.
        elapsed: Duration,
    },
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptsExhausted { attempts } => write!(f, "gave up after {attempts} attempts"),
            Self::TimedOut { elapsed } => write!(f, "timed out after {}ms", elapsed.as_millis()),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter(Duration),
    /// Stop.
    GiveUp(GiveUpReason),
}

/// Tracks attempts against a policy.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
    started: Instant,
}

impl RetryState {
    /// Start tracking at `started`.
    #[must_use]
    pub fn new(policy: RetryPolicy, started: Instant) -> Self {
        Self {
            policy,
            failures: 0,
            started,
        }
    }

    /// Number of failed attempts recorded so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Time left before the deadline, if the policy has one.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.policy
            .timeout
            .map(|t| t.saturating_sub(now.saturating_duration_since(self.started)))
    }

    /// Record a failed attempt at `now` and decide what happens next.
    pub fn on_failure(&mut self, now: Instant) -> RetryDecision {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted {
                attempts: self.failures,
            });
        }

        let delay = self.policy.delay_after(self.failures);
        match self.remaining(now) {
            Some(left) if left.is_zero() => RetryDecision::GiveUp(GiveUpReason::TimedOut {
                elapsed: now.saturating_duration_since(self.started),
            }),
            // Never sleep past the deadline.
            Some(left) => RetryDecision::RetryAfter(delay.min(left)),
            None => RetryDecision::RetryAfter(delay),
        }
    }
}

/// A retry loop that ended without success.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Error from the last attempt; `None` if the deadline cut an attempt short.
    pub last_error: Option<E>,
    /// Why the loop stopped.
    pub reason: GiveUpReason,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_error {
            Some(err) => write!(f, "{} (last error: {err})", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Run `attempt` until it succeeds or the policy gives up.
///
/// `attempt` receives the 1-based attempt number. When the policy has a
/// deadline, a single attempt is also cut off once the deadline passes.
///
/// # Errors
///
/// Returns [`Exhausted`] with the last error when the policy gives up.
pub async fn retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut attempt: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut state = RetryState::new(policy.clone(), Instant::now());
    loop {
        let number = state.failures() + 1;
        let outcome = match state.remaining(Instant::now()) {
            Some(left) => match tokio::time::timeout(left, attempt(number)).await {
                Ok(result) => result,
                Err(_) => {
                    let reason = GiveUpReason::TimedOut {
                        elapsed: policy.timeout.unwrap_or_default(),
                    };
                    warn!("{what}: {reason}");
                    return Err(Exhausted {
                        last_error: None,
                        reason,
                    });
                }
            },
            None => attempt(number).await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match state.on_failure(Instant::now()) {
            RetryDecision::RetryAfter(delay) => {
                debug!("{what}: attempt {number} failed ({err}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp(reason) => {
                warn!("{what}: {reason}, last error: {err}");
                return Err(Exhausted {
                    last_error: Some(err),
                    reason,
                });
            }
        }
    }
}
