//! Client-side rate limiting for adaptive mode.
//!
//! A token bucket admits each outbound attempt. Its fill rate shrinks
//! multiplicatively when the service throttles and grows additively while
//! responses come back clean. Refill is computed lazily on each access, so
//! no background task is needed.
//!
//! With the `async` feature the limiter reads tokio's clock, so admission
//! waits line up with `tokio::time::sleep` and with paused test time.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lowest fill rate the bucket will drop to, in tokens per second.
pub const MIN_FILL_RATE: f64 = 0.5;
/// Lowest bucket capacity.
pub const MIN_CAPACITY: f64 = 1.0;
/// Multiplicative decrease applied on throttling.
pub const THROTTLE_BETA: f64 = 0.7;
/// Fill-rate increase per clean response, in tokens per second.
pub const ADDITIVE_INCREASE: f64 = 0.5;

const ERROR_SMOOTHING: f64 = 0.2;
const STEADY_ERROR_RATE: f64 = 0.1;
const RATE_SMOOTHING: f64 = 0.8;
const MEASURE_WINDOW: Duration = Duration::from_millis(500);

/// Whether the limiter has recently seen throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterPhase {
    /// No recent throttling signal.
    Steady,
    /// The last throttling signal has not yet been outweighed by successes.
    Throttled,
}

/// Point-in-time view of the limiter, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSnapshot {
    /// Tokens currently available.
    pub tokens: f64,
    /// Maximum tokens.
    pub capacity: f64,
    /// Tokens added per second.
    pub fill_rate: f64,
    /// Current phase.
    pub phase: LimiterPhase,
    /// Whether admission control is active.
    pub enabled: bool,
    /// Smoothed fraction of throttled responses.
    pub error_rate: f64,
    /// Smoothed observed response rate per second.
    pub measured_rate: f64,
}

#[derive(Debug)]
struct LimiterState {
    tokens: f64,
    capacity: f64,
    fill_rate: f64,
    last_refill: Option<Instant>,
    enabled: bool,
    phase: LimiterPhase,
    error_rate: f64,
    last_max_rate: f64,
    measured_rate: f64,
    window_start: Option<Instant>,
    window_count: u32,
}

/// Token bucket shared by every call on one client.
///
/// Admission control stays off until the first throttling response; from
/// then on each attempt costs one token.
///
/// # Examples
///
/// ```rust
/// use tideline::ClientRateLimiter;
/// use std::time::{Duration, Instant};
///
/// let limiter = ClientRateLimiter::with_rate(2.0);
/// let now = Instant::now();
///
/// assert_eq!(limiter.acquire_at(now), Duration::ZERO);
/// assert_eq!(limiter.acquire_at(now), Duration::ZERO);
/// // Bucket is empty: the next token arrives in half a second.
/// assert_eq!(limiter.acquire_at(now), Duration::from_millis(500));
/// ```
#[derive(Debug)]
pub struct ClientRateLimiter {
    state: Mutex<LimiterState>,
}

impl ClientRateLimiter {
    /// A limiter that admits everything until it sees throttling.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LimiterState {
                tokens: 0.0,
                capacity: MIN_CAPACITY,
                fill_rate: MIN_FILL_RATE,
                last_refill: None,
                enabled: false,
                phase: LimiterPhase::Steady,
                error_rate: 0.0,
                last_max_rate: MIN_FILL_RATE,
                measured_rate: 0.0,
                window_start: None,
                window_count: 0,
            }),
        }
    }

    /// An enabled limiter with a full bucket at `fill_rate` tokens per second.
    pub fn with_rate(fill_rate: f64) -> Self {
        let fill_rate = fill_rate.max(MIN_FILL_RATE);
        let capacity = fill_rate.max(MIN_CAPACITY);
        Self {
            state: Mutex::new(LimiterState {
                tokens: capacity,
                capacity,
                fill_rate,
                last_refill: None,
                enabled: true,
                phase: LimiterPhase::Steady,
                error_rate: 0.0,
                last_max_rate: fill_rate,
                measured_rate: 0.0,
                window_start: None,
                window_count: 0,
            }),
        }
    }

    /// Take a token for an attempt about to be sent.
    ///
    /// Returns how long the caller must wait before sending.
    pub fn acquire(&self) -> Duration {
        self.acquire_at(now())
    }

    /// [`acquire`](Self::acquire) at an explicit instant.
    ///
    /// When the bucket is short, the token is reserved against future
    /// refill, so concurrent callers queue behind each other.
    pub fn acquire_at(&self, now: Instant) -> Duration {
        let mut state = self.lock();
        if !state.enabled {
            return Duration::ZERO;
        }

        state.refill(now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Duration::ZERO;
        }

        let shortfall = 1.0 - state.tokens;
        let wait = Duration::from_secs_f64(shortfall / state.fill_rate);
        let start = state.last_refill.map_or(now, |last| last.max(now));
        let ready_at = start + wait;
        state.tokens = 0.0;
        state.last_refill = Some(ready_at);
        ready_at.saturating_duration_since(now)
    }

    /// Give back a token taken by [`acquire`](Self::acquire) for an attempt
    /// that will not be sent.
    pub fn release(&self) {
        self.release_at(now());
    }

    /// [`release`](Self::release) at an explicit instant.
    ///
    /// Rolls back a pending reservation when there is one, so callers queued
    /// behind it are not delayed by an attempt that never went out.
    pub fn release_at(&self, now: Instant) {
        let mut state = self.lock();
        if !state.enabled {
            return;
        }

        let token_time = Duration::from_secs_f64(1.0 / state.fill_rate);
        match state.last_refill {
            Some(reserved) if reserved > now => {
                let rolled_back = reserved.checked_sub(token_time).unwrap_or(now);
                if rolled_back > now {
                    state.last_refill = Some(rolled_back);
                } else {
                    // Part of the token had already refilled by `now`.
                    let refilled = now.duration_since(rolled_back).as_secs_f64() * state.fill_rate;
                    state.tokens = refilled.min(state.capacity);
                    state.last_refill = Some(now);
                }
            }
            _ => {
                state.refill(now);
                state.tokens = (state.tokens + 1.0).min(state.capacity);
            }
        }
        tracing::trace!(tokens = state.tokens, "released send token");
    }

    /// Feed back the outcome of an attempt.
    pub fn record_response(&self, throttled: bool) {
        self.record_response_at(throttled, now());
    }

    /// [`record_response`](Self::record_response) at an explicit instant.
    pub fn record_response_at(&self, throttled: bool, now: Instant) {
        let mut state = self.lock();
        state.measure(now);

        let signal = if throttled { 1.0 } else { 0.0 };
        state.error_rate = ERROR_SMOOTHING * signal + (1.0 - ERROR_SMOOTHING) * state.error_rate;

        let new_rate = if throttled {
            let base = if state.enabled {
                state.fill_rate
            } else {
                state.measured_rate
            };
            state.last_max_rate = base.max(MIN_FILL_RATE);
            state.enabled = true;
            state.phase = LimiterPhase::Throttled;
            tracing::debug!(
                fill_rate = state.last_max_rate * THROTTLE_BETA,
                "throttled, reducing send rate"
            );
            state.last_max_rate * THROTTLE_BETA
        } else if state.enabled {
            if state.phase == LimiterPhase::Throttled && state.error_rate < STEADY_ERROR_RATE {
                state.phase = LimiterPhase::Steady;
            }
            let ceiling = (2.0 * state.measured_rate).max(state.last_max_rate);
            if state.fill_rate >= ceiling {
                state.fill_rate
            } else {
                (state.fill_rate + ADDITIVE_INCREASE).min(ceiling)
            }
        } else {
            return;
        };

        state.refill(now);
        state.set_rate(new_rate);
    }

    /// Current state, refilled up to `now`.
    pub fn snapshot_at(&self, now: Instant) -> LimiterSnapshot {
        let mut state = self.lock();
        state.refill(now);
        LimiterSnapshot {
            tokens: state.tokens,
            capacity: state.capacity,
            fill_rate: state.fill_rate,
            phase: state.phase,
            enabled: state.enabled,
            error_rate: state.error_rate,
            measured_rate: state.measured_rate,
        }
    }

    /// Current state, refilled up to now.
    pub fn snapshot(&self) -> LimiterSnapshot {
        self.snapshot_at(now())
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClientRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "async")]
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(not(feature = "async"))]
fn now() -> Instant {
    Instant::now()
}

impl LimiterState {
    fn refill(&mut self, now: Instant) {
        match self.last_refill {
            None => self.last_refill = Some(now),
            Some(last) => {
                // A reservation may have pushed last_refill past `now`.
                if let Some(elapsed) = now.checked_duration_since(last) {
                    let added = elapsed.as_secs_f64() * self.fill_rate;
                    self.tokens = (self.tokens + added).min(self.capacity);
                    self.last_refill = Some(now);
                }
            }
        }
    }

    fn set_rate(&mut self, rate: f64) {
        self.fill_rate = rate.max(MIN_FILL_RATE);
        self.capacity = self.fill_rate.max(MIN_CAPACITY);
        self.tokens = self.tokens.min(self.capacity);
    }

    fn measure(&mut self, now: Instant) {
        let start = *self.window_start.get_or_insert(now);
        self.window_count += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= MEASURE_WINDOW {
            let rate = f64::from(self.window_count) / elapsed.as_secs_f64();
            self.measured_rate =
                RATE_SMOOTHING * rate + (1.0 - RATE_SMOOTHING) * self.measured_rate;
            self.window_count = 0;
            self.window_start = Some(now);
        }
    }
}
