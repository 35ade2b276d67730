//! Retry Modes Example
//!
//! Demonstrates the retry engine against a simulated flaky service.
//! Shows practical patterns including:
//! - Inspecting the backoff each mode hands out
//! - Driving calls through the async driver with a classifier
//! - Quota exhaustion shared across calls on one client
//! - Adaptive mode slowing the client down after throttling
//! - Deadline-bounded calls
//!
//! Run with `RUST_LOG=tideline=debug` to see the engine's decision events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tideline::prelude::*;
use tideline::{Backoff, JitterStrategy, QuotaConfig, RawResponse, TransportFailure};

/// A service that fails `failures` times with `response`, then succeeds.
#[derive(Debug, Clone)]
struct FlakyService {
    calls: Arc<AtomicU32>,
    failures: u32,
    response: RawResponse,
}

impl FlakyService {
    fn new(failures: u32, response: RawResponse) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            failures,
            response,
        }
    }

    async fn call(&self) -> Result<&'static str, RawResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        println!("  Attempt {}", n + 1);
        if n < self.failures {
            Err(self.response.clone())
        } else {
            Ok("200 OK")
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

// ==================== Backoff per Mode ====================

/// Example 1: Backoff sequences
///
/// Shows the un-jittered delay each mode would wait before each retry.
fn example_backoff() {
    println!("\n=== Example 1: Backoff per Mode ===");

    for mode in [RetryMode::Legacy, RetryMode::Standard, RetryMode::Adaptive] {
        let profile = mode.profile();
        let backoff = Backoff::for_profile(profile).with_jitter(JitterStrategy::None);
        let delays: Vec<_> = (1..profile.default_max_attempts)
            .map(|attempt| backoff.delay(attempt))
            .collect();
        println!(
            "{:>8}: {} attempts, delays {:?}",
            mode, profile.default_max_attempts, delays
        );
    }
}

// ==================== Driver ====================

/// Example 2: Transient failures then success
async fn example_transient_recovery() {
    println!("\n=== Example 2: Transient Recovery ===");

    let engine = RetryEngine::new(
        RetryConfig::new(RetryMode::Standard, 3)
            .unwrap()
            .with_jitter(JitterStrategy::Proportional(0.1)),
    );
    let classifier = ModeClassifier::new(RetryMode::Standard);
    let service = FlakyService::new(2, RawResponse::transport(TransportFailure::Connection));

    let result = engine
        .invoke(|| service.call(), |resp| classifier.classify(resp))
        .await;

    match result {
        Ok(body) => println!("Success after {} attempts: {}", service.calls(), body),
        Err(failure) => println!("Failed: {:?}", failure),
    }
    println!("Quota balance: {}", engine.quota().balance());
}

/// Example 3: Non-retryable errors fail fast
async fn example_fatal() {
    println!("\n=== Example 3: Non-retryable Error ===");

    let engine = RetryEngine::new(RetryConfig::for_mode(RetryMode::Legacy));
    let classifier = ModeClassifier::new(RetryMode::Legacy);
    let service = FlakyService::new(10, RawResponse::service_error(403, "AccessDenied"));

    let result = engine
        .invoke(|| service.call(), |resp| classifier.classify(resp))
        .await;

    if let Err(failure) = result {
        println!(
            "Stopped after {} attempt(s): {} ({:?})",
            failure.attempts, failure.reason, failure.error.error_code
        );
    }
}

// ==================== Quota ====================

/// Example 4: A small quota shared by several calls
async fn example_quota() {
    println!("\n=== Example 4: Shared Retry Quota ===");

    let config = RetryConfig::new(RetryMode::Standard, 3)
        .unwrap()
        .with_jitter(JitterStrategy::Full)
        .with_quota(QuotaConfig {
            capacity: 10,
            ..QuotaConfig::default()
        });
    let engine = RetryEngine::new(config);
    let classifier = ModeClassifier::new(RetryMode::Standard);

    for call in 1..=3 {
        let service = FlakyService::new(5, RawResponse::status(503));
        let result = engine
            .invoke(|| service.call(), |resp| classifier.classify(resp))
            .await;
        if let Err(failure) = result {
            println!(
                "Call {}: {} after {} attempts, quota left {}",
                call,
                failure.reason,
                failure.attempts,
                engine.quota().balance()
            );
        }
    }
}

// ==================== Adaptive ====================

/// Example 5: Throttling turns on client-side rate limiting
async fn example_adaptive() {
    println!("\n=== Example 5: Adaptive Rate Limiting ===");

    let engine = RetryEngine::new(RetryConfig::for_mode(RetryMode::Adaptive));
    let classifier = ModeClassifier::new(RetryMode::Adaptive);
    let service = FlakyService::new(1, RawResponse::service_error(400, "ThrottlingException"));

    println!("Before: {:?}", engine.rate_limiter().snapshot());
    let result = engine
        .invoke(|| service.call(), |resp| classifier.classify(resp))
        .await;
    println!("Result: {:?}", result.map_err(|f| f.reason));
    println!("After:  {:?}", engine.rate_limiter().snapshot());
}

// ==================== Deadline ====================

/// Example 6: Waits never run past the call deadline
async fn example_deadline() {
    println!("\n=== Example 6: Deadline ===");

    let engine = RetryEngine::new(
        RetryConfig::new(RetryMode::Legacy, 5)
            .unwrap()
            .with_jitter(JitterStrategy::None),
    );
    let classifier = ModeClassifier::new(RetryMode::Legacy);
    let service = FlakyService::new(10, RawResponse::status(500));
    let deadline = tokio::time::Instant::now() + Duration::from_millis(1_500);

    let result = engine
        .invoke_until(deadline, || service.call(), |resp| classifier.classify(resp))
        .await;

    if let Err(failure) = result {
        println!(
            "{} after {} attempts, {:?} of backoff",
            failure.reason, failure.attempts, failure.total_delay
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("======================================");
    println!("        Retry Modes Example           ");
    println!("======================================");

    example_backoff();
    example_transient_recovery().await;
    example_fatal().await;
    example_quota().await;
    example_adaptive().await;
    example_deadline().await;

    println!("\n======================================");
    println!("           Examples Complete           ");
    println!("======================================");
}
