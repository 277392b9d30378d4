//! Time abstraction for testability
//!
//! Every time-dependent decision in the pipeline (token expiry, circuit
//! breaker cool-down, queue TTL) reads time through [`Clock`] so tests can
//! drive it deterministically.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use fieldlink_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now_utc();
//! clock.advance(Duration::from_secs(600));
//! assert_eq!((clock.now_utc() - start).num_minutes(), 10);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + 'static {
    /// Monotonic instant, for measuring elapsed durations
    fn now(&self) -> Instant;

    /// Wall-clock time, for comparisons against persisted timestamps
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        (**self).now_utc()
    }
}

/// Manually advanced clock for deterministic tests
///
/// Clones share the same elapsed counter, so a clone handed to a service
/// observes every `advance` made through the original.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_utc: DateTime<Utc>,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current real time
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a mock clock whose wall-clock reading starts at `base_utc`
    pub fn starting_at(base_utc: DateTime<Utc>) -> Self {
        Self { start: Instant::now(), base_utc, elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Advance both readings by `duration`
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Set the total elapsed time since the anchor
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Total time advanced so far
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.base_utc + elapsed
    }
}
