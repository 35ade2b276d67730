//! Retry policy engine.
//!
//! After each failed attempt the engine decides whether to retry, how long
//! to wait, and when to give up. The mode chosen at client construction
//! selects the behavior:
//!
//! - **Legacy**: broad status set, exponential backoff, 5 attempts, no quota
//! - **Standard**: expanded error set, 3 attempts, client-wide retry quota
//! - **Adaptive**: standard plus a token bucket that slows the client down
//!   when the service throttles
//!
//! # Quick Start
//!
//! ```rust
//! use tideline::{AttemptOutcome, Decision, RetryConfig, RetryEngine, RetryMode, StopReason};
//!
//! let engine = RetryEngine::new(RetryConfig::new(RetryMode::Legacy, 2).unwrap());
//! let mut state = engine.new_state();
//!
//! // First attempt failed with a connection error: retry.
//! let decision = engine.decide(&mut state, &AttemptOutcome::transient());
//! assert!(decision.is_retry());
//!
//! // Second attempt failed too: out of attempts.
//! let decision = engine.decide(&mut state, &AttemptOutcome::transient());
//! assert_eq!(decision, Decision::Stop(StopReason::AttemptsExhausted));
//! ```
//!
//! # Jitter
//!
//! Delays use full jitter by default: a random value between zero and the
//! exponential delay. Jitter is drawn from a per-call seed, so an engine
//! built with [`RetryEngine::with_seed`] produces reproducible delays.
//!
//! # Error Types
//!
//! - [`RetryFailure`]: the last underlying error plus attempts, backoff and
//!   stop reason

mod backoff;
mod classify;
mod decision;
#[cfg(feature = "async")]
mod driver;
mod engine;
mod error;
mod mode;
mod quota;
mod rate_limit;

pub use backoff::{Backoff, JitterStrategy};
pub use classify::{
    AttemptOutcome, ClassifyResponse, ErrorKind, ModeClassifier, RawResponse, TransportFailure,
};
pub use decision::{Decision, StopReason};
pub use engine::{RetryEngine, RetryState};
pub use error::RetryFailure;
pub use mode::{ModeProfile, RetryMode};
pub use quota::{QuotaConfig, RetryQuota};
pub use rate_limit::{
    ClientRateLimiter, LimiterPhase, LimiterSnapshot, ADDITIVE_INCREASE, MIN_CAPACITY,
    MIN_FILL_RATE, THROTTLE_BETA,
};
