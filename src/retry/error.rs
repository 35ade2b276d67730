//! Error types for retry operations.

use std::time::Duration;

use super::decision::StopReason;

/// Error returned when a call stops without succeeding.
///
/// Carries the underlying error from the last attempt unchanged. Quota
/// exhaustion and attempt exhaustion surface the same service error; only
/// `reason` tells them apart.
///
/// # Examples
///
/// ```rust
/// use tideline::{RetryFailure, StopReason};
/// use std::time::Duration;
///
/// let failure = RetryFailure::new("connection reset", 3, Duration::from_secs(3), StopReason::AttemptsExhausted);
/// assert_eq!(failure.into_error(), "connection reset");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    /// The error from the final attempt.
    pub error: E,
    /// Total number of attempts made (initial + retries).
    pub attempts: u32,
    /// Total backoff slept between attempts.
    pub total_delay: Duration,
    /// Why the engine stopped.
    pub reason: StopReason,
}

impl<E> RetryFailure<E> {
    /// Create a new RetryFailure.
    pub fn new(error: E, attempts: u32, total_delay: Duration, reason: StopReason) -> Self {
        Self {
            error,
            attempts,
            total_delay,
            reason,
        }
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.error
    }

    /// Returns true if the final error was retryable but budgets ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self.reason,
            StopReason::AttemptsExhausted | StopReason::QuotaExhausted
        )
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (after {} attempts, {:?} backoff: {})",
            self.error, self.attempts, self.total_delay, self.reason
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_retry_failure_display() {
        let err = RetryFailure::new(
            "connection failed",
            3,
            Duration::from_millis(500),
            StopReason::AttemptsExhausted,
        );
        let display = format!("{}", err);
        assert!(display.starts_with("connection failed"));
        assert!(display.contains("3 attempts"));
        assert!(display.contains("max attempts reached"));
    }

    #[test]
    fn test_retry_failure_into_error() {
        let err = RetryFailure::new("test error", 5, Duration::from_secs(1), StopReason::Fatal);
        assert_eq!(err.into_error(), "test error");
    }

    #[test]
    fn test_exhaustion_reasons() {
        let quota = RetryFailure::new("e", 2, Duration::ZERO, StopReason::QuotaExhausted);
        let attempts = RetryFailure::new("e", 3, Duration::ZERO, StopReason::AttemptsExhausted);
        let fatal = RetryFailure::new("e", 1, Duration::ZERO, StopReason::Fatal);
        assert!(quota.is_exhausted());
        assert!(attempts.is_exhausted());
        assert!(!fatal.is_exhausted());
        assert_eq!(quota.error(), attempts.error());
    }

    #[test]
    fn test_source_is_underlying_error() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = RetryFailure::new(io, 2, Duration::ZERO, StopReason::AttemptsExhausted);
        assert_eq!(err.source().map(|e| e.to_string()), Some("reset".to_string()));
    }
}
