//! Integration tests for resilience module
//!
//! Drives the circuit breaker registry and backoff together the way a retry
//! loop uses them: check the breaker, compute a delay, record the outcome.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use fieldlink_common::resilience::{
    BackoffStrategy, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, Jitter,
};
use fieldlink_common::time::MockClock;

/// Validates an endpoint outage followed by recovery.
///
/// # Test Steps
/// 1. Fail `/api/v1/orders` until its breaker opens
/// 2. Confirm other endpoints are unaffected
/// 3. Advance the clock past the cool-down and admit one call through the registry
/// 4. Fail it and confirm the breaker re-opens for a full cool-down
/// 5. Admit again, succeed, and confirm the recovered breaker is dropped
#[test]
fn test_endpoint_outage_and_recovery() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig::builder()
        .failure_threshold(3)
        .success_threshold(1)
        .timeout(Duration::from_secs(20))
        .build()
        .expect("valid config");
    let registry = CircuitBreakerRegistry::new(config, Arc::new(clock.clone())).expect("registry");

    for _ in 0..3 {
        registry.record_failure("/api/v1/orders");
    }
    assert!(registry.is_open("/api/v1/orders"));
    assert!(!registry.is_open("/api/v1/analytics"));

    clock.advance(Duration::from_secs(21));
    let breaker = registry.breaker("/api/v1/orders");
    assert!(registry.try_acquire("/api/v1/orders"));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    registry.record_failure("/api/v1/orders");
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!registry.try_acquire("/api/v1/orders"));

    clock.advance(Duration::from_secs(21));
    assert!(registry.try_acquire("/api/v1/orders"));
    registry.record_success("/api/v1/orders");

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(!registry.is_open("/api/v1/orders"));
    assert!(registry.snapshot().is_empty());
}

/// Validates the full delay schedule for the default retry settings.
///
/// Assertions:
/// - Ensures each jittered delay stays within 10% above the base schedule
///   500ms, 1s, 2s.
#[test]
fn test_default_retry_schedule_with_jitter() {
    let backoff = BackoffStrategy::Exponential {
        initial_delay: Duration::from_millis(500),
        multiplier: 2.0,
        max_delay: Duration::from_secs(10),
    };
    let jitter = Jitter::Proportional(0.1);

    for (attempt, base_ms) in [(0_u32, 500_u64), (1, 1000), (2, 2000)] {
        let base = backoff.calculate_delay(attempt);
        assert_eq!(base, Duration::from_millis(base_ms));

        let delay = jitter.apply(base);
        assert!(delay >= base);
        assert!(delay <= base + Duration::from_millis(base_ms / 10));
    }
}
