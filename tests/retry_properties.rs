//! Property-based tests for the retry engine

use proptest::prelude::*;
use std::time::{Duration, Instant};
use tideline::{
    AttemptOutcome, Backoff, ClientRateLimiter, JitterStrategy, QuotaConfig, RetryConfig,
    RetryEngine, RetryMode, RetryQuota,
};

fn mode_strategy() -> impl Strategy<Value = RetryMode> {
    prop_oneof![
        Just(RetryMode::Legacy),
        Just(RetryMode::Standard),
        Just(RetryMode::Adaptive),
    ]
}

fn retryable_strategy() -> impl Strategy<Value = AttemptOutcome> {
    prop_oneof![
        Just(AttemptOutcome::transient()),
        Just(AttemptOutcome::timeout()),
        Just(AttemptOutcome::throttled(Some(400))),
        (500u16..505).prop_map(AttemptOutcome::server_error),
    ]
}

fn outcome_strategy() -> impl Strategy<Value = AttemptOutcome> {
    prop_oneof![
        4 => retryable_strategy(),
        1 => Just(AttemptOutcome::Success),
        1 => Just(AttemptOutcome::NonRetryableError),
    ]
}

#[derive(Debug, Clone)]
enum QuotaOp {
    Debit(u32),
    Credit(u32),
}

fn quota_op_strategy() -> impl Strategy<Value = QuotaOp> {
    prop_oneof![
        (0u32..50).prop_map(QuotaOp::Debit),
        (0u32..50).prop_map(QuotaOp::Credit),
    ]
}

proptest! {
    #[test]
    fn prop_attempts_never_exceed_max(
        mode in mode_strategy(),
        max_attempts in 1u32..8,
        failures in prop::collection::vec(retryable_strategy(), 1..20),
        seed in any::<u64>(),
    ) {
        let engine = RetryEngine::with_seed(RetryConfig::new(mode, max_attempts).unwrap(), seed);
        let mut state = engine.new_state();
        let mut attempts = 1u32;
        let mut retries = 0u32;

        for outcome in &failures {
            let decision = engine.decide(&mut state, outcome);
            if !decision.is_retry() {
                break;
            }
            attempts += 1;
            retries += 1;
        }

        prop_assert!(attempts <= max_attempts);
        prop_assert!(retries < max_attempts);
        prop_assert_eq!(state.attempts_made(), attempts);
    }

    #[test]
    fn prop_legacy_never_uses_quota(
        outcomes in prop::collection::vec(outcome_strategy(), 1..20),
        seed in any::<u64>(),
    ) {
        let engine = RetryEngine::with_seed(RetryConfig::for_mode(RetryMode::Legacy), seed);
        let mut state = engine.new_state();
        for outcome in &outcomes {
            if !engine.decide(&mut state, outcome).is_retry() {
                break;
            }
        }
        prop_assert_eq!(engine.quota().balance(), engine.quota().capacity());
        prop_assert_eq!(state.quota_debited(), 0);
    }

    #[test]
    fn prop_quota_modes_debit_every_retry(
        mode in prop_oneof![Just(RetryMode::Standard), Just(RetryMode::Adaptive)],
        failures in prop::collection::vec(retryable_strategy(), 1..10),
        seed in any::<u64>(),
    ) {
        let engine = RetryEngine::with_seed(RetryConfig::new(mode, 10).unwrap(), seed);
        let mut state = engine.new_state();
        for outcome in &failures {
            let before = engine.quota().balance();
            if engine.decide(&mut state, outcome).is_retry() {
                prop_assert!(engine.quota().balance() < before);
            }
        }
        prop_assert_eq!(
            engine.quota().capacity() - engine.quota().balance(),
            state.quota_debited()
        );
    }

    #[test]
    fn prop_backoff_monotonic_until_cap(
        base_ms in 1u64..5_000,
        cap_ms in 1u64..60_000,
        attempt in 1u32..40,
    ) {
        let backoff = Backoff::exponential(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
            .with_jitter(JitterStrategy::None);
        let cap = Duration::from_millis(cap_ms);
        let this = backoff.delay(attempt);
        let next = backoff.delay(attempt + 1);
        prop_assert!(this <= next || this == cap);
        prop_assert!(this <= cap);
    }

    #[test]
    fn prop_jitter_bounded_and_reproducible(
        attempt in 1u32..20,
        seed in any::<u64>(),
    ) {
        let backoff = Backoff::exponential(Duration::from_secs(1), Duration::from_secs(20));
        let d = backoff.jittered_delay(attempt, seed);
        prop_assert!(d <= backoff.delay(attempt));
        prop_assert_eq!(d, backoff.jittered_delay(attempt, seed));
    }

    #[test]
    fn prop_quota_balance_stays_in_bounds(
        capacity in 0u32..200,
        ops in prop::collection::vec(quota_op_strategy(), 0..100),
    ) {
        let quota = RetryQuota::new(QuotaConfig { capacity, ..QuotaConfig::default() });
        for op in ops {
            match op {
                QuotaOp::Debit(n) => { quota.try_debit(n); }
                QuotaOp::Credit(n) => { quota.credit(n); }
            }
            prop_assert!(quota.balance() <= capacity);
        }
    }

    #[test]
    fn prop_evaluate_is_idempotent(
        mode in mode_strategy(),
        max_attempts in 1u32..6,
        outcome in outcome_strategy(),
        seed in any::<u64>(),
    ) {
        let engine = RetryEngine::with_seed(RetryConfig::new(mode, max_attempts).unwrap(), seed);
        let state = engine.new_state();
        let first = engine.evaluate(&state, &outcome);
        let second = engine.evaluate(&state, &outcome);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_non_retryable_is_always_fatal(mode in mode_strategy(), seed in any::<u64>()) {
        let engine = RetryEngine::with_seed(RetryConfig::for_mode(mode), seed);
        let mut state = engine.new_state();
        let decision = engine.decide(&mut state, &AttemptOutcome::NonRetryableError);
        prop_assert_eq!(decision.stop_reason(), Some(tideline::StopReason::Fatal));
        prop_assert_eq!(engine.quota().balance(), engine.quota().capacity());
    }

    #[test]
    fn prop_bucket_never_exceeds_capacity(
        rate in 0.5f64..50.0,
        steps in prop::collection::vec((0u64..2_000, any::<bool>(), any::<bool>()), 1..50),
    ) {
        let limiter = ClientRateLimiter::with_rate(rate);
        let mut now = Instant::now();
        for (advance_ms, acquire, throttled) in steps {
            now += Duration::from_millis(advance_ms);
            if acquire {
                limiter.acquire_at(now);
            } else {
                limiter.record_response_at(throttled, now);
            }
            let snap = limiter.snapshot_at(now);
            prop_assert!(snap.tokens <= snap.capacity + 1e-9);
            prop_assert!(snap.tokens >= 0.0);
        }
    }

    #[test]
    fn prop_refill_bounded_by_rate_times_elapsed(
        rate in 0.5f64..50.0,
        drained in 0u32..20,
        elapsed_ms in 0u64..10_000,
    ) {
        let limiter = ClientRateLimiter::with_rate(rate);
        let start = Instant::now();
        for _ in 0..drained {
            limiter.acquire_at(start);
        }
        let before = limiter.snapshot_at(start).tokens;
        let later = start + Duration::from_millis(elapsed_ms);
        let after = limiter.snapshot_at(later).tokens;
        let t = elapsed_ms as f64 / 1_000.0;
        prop_assert!(after - before <= rate * t + 1e-9);
    }
}
