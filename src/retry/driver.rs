//! Async retry loop on top of [`RetryEngine`].
//!
//! The driver performs the attempt, classifies the failure, asks the engine
//! for a decision and sleeps as told. Sleeps are bounded by an optional
//! deadline; a wait that cannot finish before the deadline stops the call
//! at once with [`StopReason::Cancelled`] and refunds the quota and the
//! send token spent on the abandoned retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::classify::AttemptOutcome;
use super::decision::{Decision, StopReason};
use super::engine::{RetryEngine, RetryState};
use super::error::RetryFailure;

impl RetryEngine {
    /// Run `operation` until it succeeds or the engine stops retrying.
    ///
    /// `classify` maps each error to an [`AttemptOutcome`]. A classifier
    /// that answers `Success` for an error is treated as non-retryable.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tideline::{AttemptOutcome, JitterStrategy, RetryConfig, RetryEngine, RetryMode};
    /// use std::sync::atomic::{AtomicU32, Ordering};
    ///
    /// # tokio_test::block_on(async {
    /// let config = RetryConfig::new(RetryMode::Standard, 3)
    ///     .unwrap()
    ///     .with_jitter(JitterStrategy::Proportional(0.0));
    /// let engine = RetryEngine::new(config);
    /// let calls = AtomicU32::new(0);
    ///
    /// let result = engine
    ///     .invoke(
    ///         || async {
    ///             if calls.fetch_add(1, Ordering::SeqCst) == 0 {
    ///                 Err("connection reset")
    ///             } else {
    ///                 Ok(42)
    ///             }
    ///         },
    ///         |_| AttemptOutcome::transient(),
    ///     )
    ///     .await;
    ///
    /// assert_eq!(result.unwrap(), 42);
    /// assert_eq!(calls.load(Ordering::SeqCst), 2);
    /// # });
    /// ```
    pub async fn invoke<T, E, F, Fut, C>(
        &self,
        operation: F,
        classify: C,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> AttemptOutcome,
    {
        self.invoke_with(self.new_state(), None, operation, classify)
            .await
    }

    /// Like [`invoke`](Self::invoke), but waits never run past `deadline`.
    pub async fn invoke_until<T, E, F, Fut, C>(
        &self,
        deadline: Instant,
        operation: F,
        classify: C,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> AttemptOutcome,
    {
        self.invoke_with(self.new_state(), Some(deadline), operation, classify)
            .await
    }

    /// Run `operation` against an existing call state.
    ///
    /// Use with [`new_state_with`](Self::new_state_with) for per-call
    /// overrides. The admission wait before the first attempt is not
    /// bounded by `deadline`, since there is no error to report yet.
    pub async fn invoke_with<T, E, F, Fut, C>(
        &self,
        mut state: RetryState,
        deadline: Option<Instant>,
        mut operation: F,
        classify: C,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> AttemptOutcome,
    {
        let admit = self.acquire_send_token(&state);
        if !admit.is_zero() {
            tokio::time::sleep(admit).await;
        }

        loop {
            tracing::trace!(attempt = state.attempts_made(), "sending attempt");
            let error = match operation().await {
                Ok(value) => {
                    self.decide(&mut state, &AttemptOutcome::Success);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let outcome = match classify(&error) {
                AttemptOutcome::Success => AttemptOutcome::NonRetryableError,
                outcome => outcome,
            };

            match self.decide(&mut state, &outcome) {
                Decision::Retry { delay } => {
                    if !sleep_within(delay, deadline).await {
                        return Err(self.cancelled(&mut state, error));
                    }
                    let admit = self.acquire_send_token(&state);
                    if !admit.is_zero() && !sleep_within(admit, deadline).await {
                        self.release_send_token(&state);
                        return Err(self.cancelled(&mut state, error));
                    }
                }
                Decision::Stop(reason) => {
                    return Err(RetryFailure::new(
                        error,
                        state.attempts_made(),
                        state.cumulative_delay(),
                        reason,
                    ));
                }
            }
        }
    }

    fn cancelled<E>(&self, state: &mut RetryState, error: E) -> RetryFailure<E> {
        self.cancel(state);
        RetryFailure::new(
            error,
            state.attempts_made(),
            state.cumulative_delay(),
            StopReason::Cancelled,
        )
    }
}

/// Sleep for `delay` unless that would pass `deadline`.
///
/// Returns false, without sleeping, when the deadline would be missed.
async fn sleep_within(delay: Duration, deadline: Option<Instant>) -> bool {
    if let Some(deadline) = deadline {
        if Instant::now() + delay > deadline {
            return false;
        }
    }
    tokio::time::sleep(delay).await;
    true
}
