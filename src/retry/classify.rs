//! Attempt outcomes and the classifier that derives them from raw responses.

use super::mode::{ModeProfile, RetryMode};

/// The retryable error classes the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection-level failure: reset, refused, TLS negotiation.
    Transient,
    /// The attempt timed out before a response arrived.
    Timeout,
    /// The service told the client to slow down.
    Throttling,
    /// A 5xx-class server failure that is safe to retry.
    Server,
}

/// Classification of a completed call attempt.
///
/// # Examples
///
/// ```rust
/// use tideline::{AttemptOutcome, ErrorKind};
///
/// let outcome = AttemptOutcome::throttled(Some(400));
/// assert!(outcome.is_throttle());
/// assert_eq!(outcome.kind(), Some(ErrorKind::Throttling));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt succeeded.
    Success,
    /// The attempt failed in a way that may be retried.
    RetryableError {
        /// Error class, used for quota cost.
        kind: ErrorKind,
        /// HTTP status, when a response was received.
        http_status: Option<u16>,
        /// Whether the service signalled throttling.
        is_throttle: bool,
    },
    /// Validation, auth, not-found and similar terminal failures.
    NonRetryableError,
}

impl AttemptOutcome {
    /// A connection-level failure with no response.
    pub fn transient() -> Self {
        Self::RetryableError {
            kind: ErrorKind::Transient,
            http_status: None,
            is_throttle: false,
        }
    }

    /// An attempt that timed out.
    pub fn timeout() -> Self {
        Self::RetryableError {
            kind: ErrorKind::Timeout,
            http_status: None,
            is_throttle: false,
        }
    }

    /// A throttling response.
    pub fn throttled(http_status: Option<u16>) -> Self {
        Self::RetryableError {
            kind: ErrorKind::Throttling,
            http_status,
            is_throttle: true,
        }
    }

    /// A retryable server failure.
    pub fn server_error(http_status: u16) -> Self {
        Self::RetryableError {
            kind: ErrorKind::Server,
            http_status: Some(http_status),
            is_throttle: false,
        }
    }

    /// Returns true for [`AttemptOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for a retryable error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableError { .. })
    }

    /// Returns true if the outcome signals throttling.
    pub fn is_throttle(&self) -> bool {
        matches!(
            self,
            Self::RetryableError {
                is_throttle: true,
                ..
            }
        )
    }

    /// Error class of a retryable error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::RetryableError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// How an attempt failed below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connection could not be established or was dropped.
    Connection,
    /// No response within the attempt timeout.
    Timeout,
}

/// What the transport layer observed for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status, if a response was received.
    pub http_status: Option<u16>,
    /// Service error code from the response body or headers.
    pub error_code: Option<String>,
    /// Failure before any response was received.
    pub transport: Option<TransportFailure>,
}

impl RawResponse {
    /// A response with the given status and no error code.
    pub fn status(http_status: u16) -> Self {
        Self {
            http_status: Some(http_status),
            ..Self::default()
        }
    }

    /// A service error response.
    pub fn service_error(http_status: u16, code: impl Into<String>) -> Self {
        Self {
            http_status: Some(http_status),
            error_code: Some(code.into()),
            transport: None,
        }
    }

    /// A transport failure without a response.
    pub fn transport(failure: TransportFailure) -> Self {
        Self {
            transport: Some(failure),
            ..Self::default()
        }
    }
}

/// Maps raw responses to attempt outcomes.
///
/// Transports implement this to feed their own error taxonomy into the
/// engine; [`ModeClassifier`] covers the standard AWS error codes.
pub trait ClassifyResponse {
    /// Classify one attempt.
    fn classify(&self, response: &RawResponse) -> AttemptOutcome;
}

impl<F> ClassifyResponse for F
where
    F: Fn(&RawResponse) -> AttemptOutcome,
{
    fn classify(&self, response: &RawResponse) -> AttemptOutcome {
        self(response)
    }
}

/// Classifier driven by a mode's error-code and status tables.
#[derive(Debug, Clone, Copy)]
pub struct ModeClassifier {
    profile: &'static ModeProfile,
}

impl ModeClassifier {
    /// Classifier for `mode`.
    pub fn new(mode: RetryMode) -> Self {
        Self {
            profile: mode.profile(),
        }
    }
}

impl ClassifyResponse for ModeClassifier {
    fn classify(&self, response: &RawResponse) -> AttemptOutcome {
        match response.transport {
            Some(TransportFailure::Connection) => return AttemptOutcome::transient(),
            Some(TransportFailure::Timeout) => return AttemptOutcome::timeout(),
            None => {}
        }

        let status = response.http_status;
        if let Some(code) = response.error_code.as_deref() {
            if self.profile.is_throttling_code(code) {
                return AttemptOutcome::throttled(status);
            }
            if self.profile.is_transient_code(code) {
                return AttemptOutcome::RetryableError {
                    kind: ErrorKind::Transient,
                    http_status: status,
                    is_throttle: false,
                };
            }
        }

        match status {
            Some(s) if self.profile.throttling_status_codes.contains(&s) => {
                AttemptOutcome::throttled(Some(s))
            }
            Some(s) if self.profile.is_retryable_status(s) => AttemptOutcome::server_error(s),
            Some(s) if s >= 400 => AttemptOutcome::NonRetryableError,
            _ if response.error_code.is_some() => AttemptOutcome::NonRetryableError,
            _ => AttemptOutcome::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status_is_success() {
        let classifier = ModeClassifier::new(RetryMode::Standard);
        assert_eq!(
            classifier.classify(&RawResponse::status(200)),
            AttemptOutcome::Success
        );
    }

    #[test]
    fn test_transport_failures_are_retryable() {
        let classifier = ModeClassifier::new(RetryMode::Legacy);
        assert_eq!(
            classifier.classify(&RawResponse::transport(TransportFailure::Connection)),
            AttemptOutcome::transient()
        );
        assert_eq!(
            classifier.classify(&RawResponse::transport(TransportFailure::Timeout)),
            AttemptOutcome::timeout()
        );
    }

    #[test]
    fn test_throttling_code_wins_over_status() {
        let classifier = ModeClassifier::new(RetryMode::Standard);
        let outcome = classifier.classify(&RawResponse::service_error(400, "ThrottlingException"));
        assert_eq!(outcome, AttemptOutcome::throttled(Some(400)));
    }

    #[test]
    fn test_legacy_retries_429_as_throttle() {
        let classifier = ModeClassifier::new(RetryMode::Legacy);
        assert!(classifier.classify(&RawResponse::status(429)).is_throttle());
    }

    #[test]
    fn test_standard_does_not_retry_bare_429() {
        let classifier = ModeClassifier::new(RetryMode::Standard);
        assert_eq!(
            classifier.classify(&RawResponse::status(429)),
            AttemptOutcome::NonRetryableError
        );
    }

    #[test]
    fn test_legacy_retries_509_standard_does_not() {
        assert!(ModeClassifier::new(RetryMode::Legacy)
            .classify(&RawResponse::status(509))
            .is_retryable());
        assert!(!ModeClassifier::new(RetryMode::Standard)
            .classify(&RawResponse::status(509))
            .is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let classifier = ModeClassifier::new(RetryMode::Adaptive);
        for status in [500, 502, 503, 504] {
            assert_eq!(
                classifier.classify(&RawResponse::status(status)),
                AttemptOutcome::server_error(status)
            );
        }
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let classifier = ModeClassifier::new(RetryMode::Standard);
        assert_eq!(
            classifier.classify(&RawResponse::service_error(400, "ValidationException")),
            AttemptOutcome::NonRetryableError
        );
        assert_eq!(
            classifier.classify(&RawResponse::service_error(403, "AccessDenied")),
            AttemptOutcome::NonRetryableError
        );
        assert_eq!(
            classifier.classify(&RawResponse::status(404)),
            AttemptOutcome::NonRetryableError
        );
    }

    #[test]
    fn test_expanded_codes_only_in_standard() {
        let response = RawResponse::service_error(400, "RequestLimitExceeded");
        assert!(!ModeClassifier::new(RetryMode::Legacy)
            .classify(&response)
            .is_retryable());
        assert!(ModeClassifier::new(RetryMode::Standard)
            .classify(&response)
            .is_throttle());
    }

    #[test]
    fn test_transient_code_is_retryable() {
        let classifier = ModeClassifier::new(RetryMode::Standard);
        let outcome = classifier.classify(&RawResponse::service_error(400, "RequestTimeout"));
        assert_eq!(outcome.kind(), Some(ErrorKind::Transient));
        assert!(!outcome.is_throttle());
    }

    #[test]
    fn test_closures_are_classifiers() {
        let always_fatal = |_: &RawResponse| AttemptOutcome::NonRetryableError;
        assert_eq!(
            always_fatal.classify(&RawResponse::status(503)),
            AttemptOutcome::NonRetryableError
        );
    }
}
