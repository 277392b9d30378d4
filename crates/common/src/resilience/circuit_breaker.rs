//! Circuit breaker for endpoints that keep failing
//!
//! A breaker starts CLOSED. After `failure_threshold` consecutive failures it
//! opens and rejects calls until `timeout` has passed, then admits up to
//! `half_open_max_calls` probe calls. `success_threshold` probe successes
//! close it again; any probe failure re-opens it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CommonError, CommonResult};
use crate::time::{Clock, SystemClock};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, allowing limited requests to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u64,
    /// Probe successes needed to close the circuit from half-open
    pub success_threshold: u64,
    /// Time to wait before transitioning from open to half-open
    pub timeout: Duration,
    /// Maximum number of probe calls admitted while half-open
    pub half_open_max_calls: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(CommonError::config_field(
                "success_threshold",
                "must be greater than 0",
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(CommonError::config_field(
                "half_open_max_calls",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u64) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> CommonResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Circuit breaker metrics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub half_open_calls: u64,
    pub total_calls: u64,
    pub last_failure_time: Option<Instant>,
    pub state_change_time: Instant,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    half_open_calls: u64,
    total_calls: u64,
    last_failure_time: Option<Instant>,
    state_change_time: Instant,
}

impl BreakerState {
    fn transition(&mut self, next: CircuitState, now: Instant) {
        self.state = next;
        self.state_change_time = now;
        self.half_open_calls = 0;
        self.success_count = 0;
        if next == CircuitState::Closed {
            self.failure_count = 0;
        }
    }
}

/// Circuit breaker guarding a single endpoint
///
/// Clones share state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker reading time from `clock`
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<C>) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config, clock))
    }

    pub(crate) fn from_validated(config: CircuitBreakerConfig, clock: Arc<C>) -> Self {
        let now = clock.now();

        Self {
            config,
            inner: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_calls: 0,
                total_calls: 0,
                last_failure_time: None,
                state_change_time: now,
            })),
            clock,
        }
    }

    /// Whether calls are currently being rejected
    ///
    /// Read-only: an OPEN breaker whose timeout has elapsed reports `false`
    /// without transitioning, so the next [`Self::can_execute`] admits a probe.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => !self.cool_down_elapsed(&inner),
            CircuitState::HalfOpen => {
                inner.half_open_calls >= self.config.half_open_max_calls
                    && !self.cool_down_elapsed(&inner)
            }
        }
    }

    /// Check whether a call may proceed, admitting it if so
    ///
    /// Transitions OPEN to HALF_OPEN once the timeout has elapsed and counts
    /// admitted half-open calls. Calls that never report back are written off
    /// after another timeout, so a HALF_OPEN breaker cannot wedge shut.
    pub fn can_execute(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.cool_down_elapsed(&inner) {
                    inner.transition(CircuitState::HalfOpen, now);
                    inner.half_open_calls = 1;
                    debug!("Circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.config.half_open_max_calls {
                    inner.half_open_calls += 1;
                    true
                } else if self.cool_down_elapsed(&inner) {
                    inner.transition(CircuitState::HalfOpen, now);
                    inner.half_open_calls = 1;
                    debug!("Half-open calls unanswered, admitting a new one");
                    true
                } else {
                    false
                }
            }
        };

        if admitted {
            inner.total_calls += 1;
        }
        admitted
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    let successes = inner.success_count;
                    inner.transition(CircuitState::Closed, now);
                    info!(successes, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {
                warn!("Received success while circuit is open");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    let failures = inner.failure_count;
                    inner.transition(CircuitState::Open, now);
                    warn!(failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Open, now);
                warn!("Circuit breaker re-opened by failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// CLOSED with no failure inside the last `timeout`
    ///
    /// An idle breaker behaves exactly like a freshly created one.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.state == CircuitState::Closed
            && (inner.failure_count == 0
                || inner.last_failure_time.map_or(true, |at| {
                    self.clock.now().saturating_duration_since(at) >= self.config.timeout
                }))
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters for monitoring
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_calls: inner.half_open_calls,
            total_calls: inner.total_calls,
            last_failure_time: inner.last_failure_time,
            state_change_time: inner.state_change_time,
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.transition(CircuitState::Closed, now);
        inner.last_failure_time = None;
        info!("Circuit breaker manually reset to closed state");
    }

    fn cool_down_elapsed(&self, inner: &BreakerState) -> bool {
        self.clock.now().saturating_duration_since(inner.state_change_time) >= self.config.timeout
    }
}
