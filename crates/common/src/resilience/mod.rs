//! Resilience patterns for unreliable networks
//!
//! - **Circuit breaker**: stops hammering an endpoint that keeps failing
//! - **Registry**: one breaker per endpoint path
//! - **Retry**: backoff, jitter and retry decisions

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState,
};
pub use registry::CircuitBreakerRegistry;
pub use retry::{BackoffStrategy, Jitter, RetryDecision, StopReason};
