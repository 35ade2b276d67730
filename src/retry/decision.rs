//! Decisions returned by the engine after each attempt.

use std::fmt;
use std::time::Duration;

/// Why a logical call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The last attempt succeeded.
    Success,
    /// The last attempt failed with a non-retryable error.
    Fatal,
    /// `max_attempts` attempts have been made.
    AttemptsExhausted,
    /// The client's retry quota could not cover another retry.
    QuotaExhausted,
    /// The call's deadline passed while waiting.
    Cancelled,
}

impl StopReason {
    /// Returns true if the call ended in failure.
    pub fn is_failure(&self) -> bool {
        !matches!(self, StopReason::Success)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            StopReason::Success => "no retry needed",
            StopReason::Fatal => "error is not retryable",
            StopReason::AttemptsExhausted => "max attempts reached",
            StopReason::QuotaExhausted => "quota exhausted, not retrying",
            StopReason::Cancelled => "call cancelled",
        };
        f.write_str(msg)
    }
}

/// What the caller should do after an attempt.
///
/// # Examples
///
/// ```rust
/// use tideline::{Decision, StopReason};
/// use std::time::Duration;
///
/// let retry = Decision::Retry { delay: Duration::from_millis(250) };
/// assert_eq!(retry.to_string(), "retry needed, delay=250ms");
/// assert_eq!(Decision::Stop(StopReason::AttemptsExhausted).to_string(), "max attempts reached");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Sleep for `delay`, then make another attempt.
    Retry {
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Stop and report to the caller.
    Stop(StopReason),
}

impl Decision {
    /// Returns true if the caller should retry.
    pub fn is_retry(&self) -> bool {
        matches!(self, Decision::Retry { .. })
    }

    /// The backoff delay, for a retry decision.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Decision::Retry { delay } => Some(*delay),
            Decision::Stop(_) => None,
        }
    }

    /// The stop reason, for a stop decision.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Decision::Retry { .. } => None,
            Decision::Stop(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Retry { delay } => write!(f, "retry needed, delay={:?}", delay),
            Decision::Stop(reason) => write!(f, "{}", reason),
        }
    }
}
