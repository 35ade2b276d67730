//! The decision orchestrator and the per-client context it runs against.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::backoff::Backoff;
use super::classify::AttemptOutcome;
use super::decision::{Decision, StopReason};
use super::mode::{ModeProfile, RetryMode};
use super::quota::RetryQuota;
use super::rate_limit::ClientRateLimiter;
use crate::config::{ConfigError, ConfigResolver, RetryConfig, RetrySettings};

/// Per-call retry bookkeeping.
///
/// Created by [`RetryEngine::new_state`] when a logical call starts and
/// dropped when it terminates. `attempts_made` is 1 while the first attempt
/// is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    mode: RetryMode,
    max_attempts: u32,
    attempts_made: u32,
    cumulative_delay: Duration,
    quota_debited: u32,
    pending_debit: u32,
    pending_delay: Duration,
    jitter_seed: u64,
}

impl RetryState {
    /// Mode in effect for this call.
    pub fn mode(&self) -> RetryMode {
        self.mode
    }

    /// Attempt ceiling for this call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts made so far, including the one in flight.
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Retries made so far.
    pub fn retries_made(&self) -> u32 {
        self.attempts_made.saturating_sub(1)
    }

    /// Total backoff handed out by retry decisions.
    pub fn cumulative_delay(&self) -> Duration {
        self.cumulative_delay
    }

    /// Quota units this call has spent.
    pub fn quota_debited(&self) -> u32 {
        self.quota_debited
    }
}

#[derive(Debug)]
struct EngineInner {
    config: RetryConfig,
    quota: RetryQuota,
    limiter: ClientRateLimiter,
    seeds: Mutex<StdRng>,
}

/// Retry policy engine for one client.
///
/// Cloning is cheap and every clone shares the same retry quota and rate
/// limiter, so one engine should be created per client and handed to every
/// call it makes.
///
/// # Examples
///
/// ```rust
/// use tideline::{AttemptOutcome, Decision, RetryConfig, RetryEngine, RetryMode, StopReason};
///
/// let engine = RetryEngine::new(RetryConfig::new(RetryMode::Standard, 3).unwrap());
/// let mut state = engine.new_state();
///
/// assert!(engine.decide(&mut state, &AttemptOutcome::throttled(Some(400))).is_retry());
/// assert!(engine.decide(&mut state, &AttemptOutcome::throttled(Some(400))).is_retry());
/// assert_eq!(
///     engine.decide(&mut state, &AttemptOutcome::Success),
///     Decision::Stop(StopReason::Success)
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RetryEngine {
    inner: Arc<EngineInner>,
}

impl RetryEngine {
    /// Engine with an entropy-seeded jitter source.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Engine whose jitter is reproducible from `seed`.
    pub fn with_seed(config: RetryConfig, seed: u64) -> Self {
        let quota = RetryQuota::new(*config.quota());
        Self {
            inner: Arc::new(EngineInner {
                config,
                quota,
                limiter: ClientRateLimiter::new(),
                seeds: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    /// Resolve configuration through `resolver` and build an engine.
    pub fn from_resolver(resolver: &ConfigResolver) -> Result<Self, ConfigError> {
        Ok(Self::new(resolver.resolve()?))
    }

    /// Build an engine from the process environment and the config file it
    /// names (`TIDELINE_CONFIG_FILE` or `AWS_CONFIG_FILE`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_resolver(&ConfigResolver::new().load_config_file()?)
    }

    /// Client-level configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    /// The shared retry quota.
    pub fn quota(&self) -> &RetryQuota {
        &self.inner.quota
    }

    /// The shared adaptive rate limiter.
    pub fn rate_limiter(&self) -> &ClientRateLimiter {
        &self.inner.limiter
    }

    /// Start a logical call with the client configuration.
    pub fn new_state(&self) -> RetryState {
        self.state_for(self.inner.config.mode(), self.inner.config.max_attempts())
    }

    /// Start a logical call with a per-call override.
    pub fn new_state_with(&self, settings: &RetrySettings) -> Result<RetryState, ConfigError> {
        let config = self.inner.config.overridden_by(settings)?;
        Ok(self.state_for(config.mode(), config.max_attempts()))
    }

    fn state_for(&self, mode: RetryMode, max_attempts: u32) -> RetryState {
        let jitter_seed = self
            .inner
            .seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random();
        RetryState {
            mode,
            max_attempts,
            attempts_made: 1,
            cumulative_delay: Duration::ZERO,
            quota_debited: 0,
            pending_debit: 0,
            pending_delay: Duration::ZERO,
            jitter_seed,
        }
    }

    /// Admission delay before sending the next attempt.
    ///
    /// Always zero outside adaptive mode. In adaptive mode this takes a
    /// token from the client's rate limiter.
    pub fn acquire_send_token(&self, state: &RetryState) -> Duration {
        if !state.mode.profile().uses_rate_limiter {
            return Duration::ZERO;
        }
        let wait = self.inner.limiter.acquire();
        if !wait.is_zero() {
            tracing::debug!(wait = ?wait, "rate limited, delaying attempt");
        }
        wait
    }

    /// Return the token [`acquire_send_token`](Self::acquire_send_token)
    /// took for an attempt that will not be sent.
    pub fn release_send_token(&self, state: &RetryState) {
        if state.mode.profile().uses_rate_limiter {
            self.inner.limiter.release();
        }
    }

    /// Decide what follows `outcome` without changing any state.
    ///
    /// Repeated calls with the same state and outcome return the same
    /// decision as long as no other call spends quota in between.
    pub fn evaluate(&self, state: &RetryState, outcome: &AttemptOutcome) -> Decision {
        let profile = state.mode.profile();
        match outcome {
            AttemptOutcome::Success => Decision::Stop(StopReason::Success),
            AttemptOutcome::NonRetryableError => Decision::Stop(StopReason::Fatal),
            AttemptOutcome::RetryableError { kind, .. } => {
                if state.attempts_made >= state.max_attempts {
                    return Decision::Stop(StopReason::AttemptsExhausted);
                }
                if profile.uses_quota {
                    let cost = self.inner.config.quota().cost_for(*kind);
                    if !self.inner.quota.can_afford(cost) {
                        return Decision::Stop(StopReason::QuotaExhausted);
                    }
                }
                Decision::Retry {
                    delay: self.backoff_for(profile, state),
                }
            }
        }
    }

    /// Decide what follows `outcome` and record it.
    ///
    /// Spends or rewards quota, feeds the adaptive rate limiter and counts
    /// the next attempt when the decision is to retry.
    pub fn decide(&self, state: &mut RetryState, outcome: &AttemptOutcome) -> Decision {
        let profile = state.mode.profile();
        state.pending_debit = 0;
        state.pending_delay = Duration::ZERO;

        if profile.uses_rate_limiter {
            self.inner.limiter.record_response(outcome.is_throttle());
        }

        let decision = match self.evaluate(state, outcome) {
            Decision::Retry { delay } => self.commit_retry(profile, state, outcome, delay),
            stop => stop,
        };

        match decision {
            Decision::Retry { delay } => {
                tracing::debug!(
                    mode = %state.mode,
                    attempt = state.attempts_made,
                    delay = ?delay,
                    "retry needed"
                );
            }
            Decision::Stop(StopReason::Success) => {
                if profile.uses_quota && state.attempts_made > 1 {
                    let reward = self.inner.config.quota().success_reward;
                    let balance = self.inner.quota.credit(reward);
                    tracing::trace!(balance, "credited retry quota");
                }
                tracing::debug!(attempts = state.attempts_made, "no retry needed");
            }
            Decision::Stop(StopReason::AttemptsExhausted) => {
                tracing::debug!(attempts = state.attempts_made, "max attempts reached");
            }
            Decision::Stop(StopReason::QuotaExhausted) => {
                tracing::warn!(
                    balance = self.inner.quota.balance(),
                    "quota exhausted, not retrying"
                );
            }
            Decision::Stop(reason) => {
                tracing::debug!(%reason, "not retrying");
            }
        }
        decision
    }

    /// Abandon the retry the last decision granted.
    ///
    /// Refunds any quota it spent and uncounts the attempt that will not be
    /// made.
    pub fn cancel(&self, state: &mut RetryState) -> Decision {
        if state.pending_debit > 0 {
            self.inner.quota.credit(state.pending_debit);
            state.quota_debited -= state.pending_debit;
        }
        if state.pending_debit > 0 || !state.pending_delay.is_zero() {
            state.attempts_made = state.attempts_made.saturating_sub(1).max(1);
            state.cumulative_delay = state.cumulative_delay.saturating_sub(state.pending_delay);
        }
        state.pending_debit = 0;
        state.pending_delay = Duration::ZERO;
        tracing::debug!(attempts = state.attempts_made, "call cancelled");
        Decision::Stop(StopReason::Cancelled)
    }

    fn commit_retry(
        &self,
        profile: &ModeProfile,
        state: &mut RetryState,
        outcome: &AttemptOutcome,
        delay: Duration,
    ) -> Decision {
        let mut cost = 0;
        if profile.uses_quota {
            if let Some(kind) = outcome.kind() {
                cost = self.inner.config.quota().cost_for(kind);
            }
            // Another call may have spent the balance since evaluate.
            if !self.inner.quota.try_debit(cost) {
                return Decision::Stop(StopReason::QuotaExhausted);
            }
        }

        state.attempts_made += 1;
        state.cumulative_delay += delay;
        state.quota_debited += cost;
        state.pending_debit = cost;
        state.pending_delay = delay;
        Decision::Retry { delay }
    }

    fn backoff_for(&self, profile: &ModeProfile, state: &RetryState) -> Duration {
        Backoff::for_profile(profile)
            .with_jitter(self.inner.config.jitter())
            .jittered_delay(state.attempts_made, state.jitter_seed)
    }
}
