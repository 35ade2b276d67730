//! Backoff delay calculation.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::mode::ModeProfile;

/// Exponential backoff with an upper bound and optional jitter.
///
/// Backoffs are pure data: the same attempt and seed always produce the
/// same delay, which keeps retry decisions reproducible in tests.
///
/// # Examples
///
/// ```rust
/// use tideline::{Backoff, JitterStrategy};
/// use std::time::Duration;
///
/// let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(20))
///     .with_jitter(JitterStrategy::None);
///
/// // Delay doubles: 1s, 2s, 4s, 8s, 16s, then capped at 20s
/// assert_eq!(backoff.delay(1), Duration::from_secs(1));
/// assert_eq!(backoff.delay(2), Duration::from_secs(2));
/// assert_eq!(backoff.delay(5), Duration::from_secs(16));
/// assert_eq!(backoff.delay(6), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: JitterStrategy,
}

/// Strategy for adding randomness to delays.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum JitterStrategy {
    /// No jitter applied.
    None,
    /// Random delay between 0 and the calculated delay.
    #[default]
    Full,
    /// Add ±percentage randomness to delay.
    Proportional(f64),
}

impl Backoff {
    /// Create an exponential backoff: `min(cap, base * 2^(attempt-1))`.
    pub fn exponential(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            jitter: JitterStrategy::default(),
        }
    }

    /// The backoff a mode uses, with full jitter.
    pub fn for_profile(profile: &ModeProfile) -> Self {
        Self::exponential(profile.backoff_base, profile.backoff_cap)
    }

    /// Replace the jitter strategy.
    ///
    /// Proportional factors are clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = match jitter {
            JitterStrategy::Proportional(factor) if factor.is_nan() => {
                JitterStrategy::Proportional(0.0)
            }
            JitterStrategy::Proportional(factor) => {
                JitterStrategy::Proportional(factor.clamp(0.0, 1.0))
            }
            other => other,
        };
        self
    }

    /// Get the base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Get the delay cap.
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Get the jitter strategy.
    pub fn jitter(&self) -> JitterStrategy {
        self.jitter
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    ///
    /// Attempt 0 is treated as attempt 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Delay before retry number `attempt` with jitter drawn from `seed`.
    pub fn jittered_delay(&self, attempt: u32, seed: u64) -> Duration {
        let delay = self.delay(attempt);
        let mut rng = StdRng::seed_from_u64(mix_seed(seed, attempt));
        self.jitter.apply(delay, &mut rng).min(self.cap)
    }
}

impl JitterStrategy {
    /// Apply jitter to a base delay.
    pub fn apply<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay.is_zero() {
                    Duration::ZERO
                } else {
                    scale(delay, rng.random_range(0.0..=1.0))
                }
            }
            JitterStrategy::Proportional(factor) => {
                if *factor == 0.0 {
                    return delay;
                }
                let factor = rng.random_range((1.0 - factor)..=(1.0 + factor));
                scale(delay, factor.max(0.0))
            }
        }
    }
}

/// `delay * factor`, saturating at `Duration::MAX` instead of panicking.
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

fn mix_seed(seed: u64, attempt: u32) -> u64 {
    seed ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
