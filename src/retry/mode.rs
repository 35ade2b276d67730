//! Retry modes and the behavior table each one selects.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Named strategy bundle controlling which errors are retried and how
/// backoff is computed.
///
/// # Examples
///
/// ```rust
/// use tideline::RetryMode;
///
/// let mode: RetryMode = "Adaptive".parse().unwrap();
/// assert_eq!(mode, RetryMode::Adaptive);
/// assert!("eventual".parse::<RetryMode>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Original SDK behavior: broad status set, no retry quota.
    #[default]
    Legacy,
    /// Expanded error set with a client-wide retry quota.
    Standard,
    /// Standard plus client-side rate limiting driven by throttling responses.
    Adaptive,
}

impl RetryMode {
    /// The lowercase name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryMode::Legacy => "legacy",
            RetryMode::Standard => "standard",
            RetryMode::Adaptive => "adaptive",
        }
    }

    /// The behavior table for this mode.
    pub fn profile(&self) -> &'static ModeProfile {
        ModeProfile::for_mode(*self)
    }
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(RetryMode::Legacy),
            "standard" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            _ => Err(ConfigError::UnknownRetryMode(s.to_string())),
        }
    }
}

/// Everything a mode decides: retryable codes, backoff shape and budgets.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeProfile {
    /// Mode this table belongs to.
    pub mode: RetryMode,
    /// Service error codes treated as transient and retried.
    pub transient_error_codes: &'static [&'static str],
    /// Service error codes that signal throttling.
    pub throttling_error_codes: &'static [&'static str],
    /// HTTP status codes retried regardless of error code.
    pub retryable_status_codes: &'static [u16],
    /// Status codes that count as throttling even without an error code.
    pub throttling_status_codes: &'static [u16],
    /// Backoff base; the first retry waits up to this long.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff.
    pub backoff_cap: Duration,
    /// Attempts (initial included) when none are configured.
    pub default_max_attempts: u32,
    /// Whether retries are charged against the client's retry quota.
    pub uses_quota: bool,
    /// Whether the client-side rate limiter is consulted.
    pub uses_rate_limiter: bool,
}

const LEGACY_TRANSIENT_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "PriorRequestNotComplete",
];

const LEGACY_THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "ProvisionedThroughputExceededException",
];

const STANDARD_TRANSIENT_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "PriorRequestNotComplete",
    "IDPCommunicationError",
];

const STANDARD_THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "EC2ThrottledException",
];

static LEGACY: ModeProfile = ModeProfile {
    mode: RetryMode::Legacy,
    transient_error_codes: LEGACY_TRANSIENT_CODES,
    throttling_error_codes: LEGACY_THROTTLING_CODES,
    retryable_status_codes: &[429, 500, 502, 503, 504, 509],
    throttling_status_codes: &[429, 509],
    backoff_base: Duration::from_secs(1),
    backoff_cap: Duration::from_secs(20),
    default_max_attempts: 5,
    uses_quota: false,
    uses_rate_limiter: false,
};

static STANDARD: ModeProfile = ModeProfile {
    mode: RetryMode::Standard,
    transient_error_codes: STANDARD_TRANSIENT_CODES,
    throttling_error_codes: STANDARD_THROTTLING_CODES,
    retryable_status_codes: &[500, 502, 503, 504],
    throttling_status_codes: &[],
    backoff_base: Duration::from_secs(1),
    backoff_cap: Duration::from_secs(20),
    default_max_attempts: 3,
    uses_quota: true,
    uses_rate_limiter: false,
};

static ADAPTIVE: ModeProfile = ModeProfile {
    mode: RetryMode::Adaptive,
    transient_error_codes: STANDARD_TRANSIENT_CODES,
    throttling_error_codes: STANDARD_THROTTLING_CODES,
    retryable_status_codes: &[500, 502, 503, 504],
    throttling_status_codes: &[],
    backoff_base: Duration::from_secs(1),
    backoff_cap: Duration::from_secs(20),
    default_max_attempts: 3,
    uses_quota: true,
    uses_rate_limiter: true,
};

impl ModeProfile {
    /// Look up the behavior table for `mode`.
    pub fn for_mode(mode: RetryMode) -> &'static ModeProfile {
        match mode {
            RetryMode::Legacy => &LEGACY,
            RetryMode::Standard => &STANDARD,
            RetryMode::Adaptive => &ADAPTIVE,
        }
    }

    /// Returns true if `code` is a throttling error code for this mode.
    pub fn is_throttling_code(&self, code: &str) -> bool {
        self.throttling_error_codes.contains(&code)
    }

    /// Returns true if `code` is a transient error code for this mode.
    pub fn is_transient_code(&self, code: &str) -> bool {
        self.transient_error_codes.contains(&code)
    }

    /// Returns true if `status` is retried by this mode.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}
