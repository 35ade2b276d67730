//! # Tideline
//!
//! A retry policy engine for AWS-style service clients.
//!
//! ## Philosophy
//!
//! Retry decisions are a **pure core** behind an **imperative shell**:
//! - The engine turns an attempt outcome into a [`Decision`] and keeps the
//!   client's shared budgets (retry quota, adaptive token bucket)
//! - The caller, or the bundled async driver, performs attempts and sleeps
//!
//! ## Quick Example
//!
//! ```rust
//! use tideline::{AttemptOutcome, RetryConfig, RetryEngine, RetryMode, StopReason};
//!
//! let engine = RetryEngine::new(RetryConfig::for_mode(RetryMode::Standard));
//! let mut state = engine.new_state();
//!
//! let decision = engine.decide(&mut state, &AttemptOutcome::throttled(Some(400)));
//! match decision.delay() {
//!     Some(delay) => println!("retrying in {:?}", delay),
//!     None => println!("stopped: {}", decision),
//! }
//!
//! let done = engine.decide(&mut state, &AttemptOutcome::Success);
//! assert_eq!(done.stop_reason(), Some(StopReason::Success));
//! ```
//!
//! Configuration can also come from the environment and a config file; see
//! [`config`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod retry;

// Re-exports
pub use config::{ConfigError, ConfigResolver, RetryConfig, RetrySettings};
pub use retry::{
    AttemptOutcome, Backoff, ClassifyResponse, ClientRateLimiter, Decision, ErrorKind,
    JitterStrategy, ModeClassifier, ModeProfile, QuotaConfig, RawResponse, RetryEngine,
    RetryFailure, RetryMode, RetryQuota, RetryState, StopReason, TransportFailure,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ConfigResolver, RetryConfig, RetrySettings};
    pub use crate::retry::{
        AttemptOutcome, ClassifyResponse, Decision, ModeClassifier, RetryEngine, RetryMode,
        StopReason,
    };
}
