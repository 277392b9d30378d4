//! Backoff and jitter for retry delays
//!
//! The retry loop itself lives with the caller, which knows what makes a
//! failure retryable. This module only answers "how long to wait" and names
//! the possible outcomes of a retry decision.

use std::fmt;
use std::time::Duration;

use rand::Rng;

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay
    Retry(Duration),
    /// Give up and surface the last error
    Stop(StopReason),
}

impl RetryDecision {
    /// Whether this decision schedules another attempt
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

/// Why a retry loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `attempt` reached the configured maximum
    AttemptsExhausted,
    /// The operation is not safe to repeat
    NotIdempotent,
    /// The error class is never retried
    NonRetryableError,
    /// The endpoint's circuit breaker is open
    CircuitOpen,
    /// No network connectivity
    Offline,
    /// The caller cancelled the operation
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::NotIdempotent => "not_idempotent",
            Self::NonRetryableError => "non_retryable_error",
            Self::CircuitOpen => "circuit_open",
            Self::Offline => "offline",
            Self::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// `min(initial_delay * multiplier^attempt, max_delay)`
    Exponential { initial_delay: Duration, multiplier: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before retrying after the 0-indexed `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { initial_delay, multiplier, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let scaled = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(scaled.max(0.0))
                }
            }
        }
    }
}

/// Jitter for spreading out retries from many clients
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Add a uniform sample from `[0, ratio * delay]`
    Proportional(f64),
}

impl Jitter {
    /// Apply jitter using the thread-local RNG
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with(delay, &mut rand::thread_rng())
    }

    /// Apply jitter with a caller-provided RNG
    pub fn apply_with<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Proportional(ratio) => {
                let max_ms = (delay.as_secs_f64() * 1000.0 * ratio.max(0.0)) as u64;
                if max_ms == 0 {
                    return delay;
                }
                delay + Duration::from_millis(rng.gen_range(0..=max_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn default_backoff() -> BackoffStrategy {
        BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Validates `BackoffStrategy::Exponential` behavior for the doubling
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the delay doubles from 500ms per attempt.
    /// - Confirms the delay is capped at `max_delay`.
    #[test]
    fn test_exponential_backoff_doubles_until_cap() {
        let backoff = default_backoff();
        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(backoff.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(backoff.calculate_delay(2), Duration::from_secs(2));
        assert_eq!(backoff.calculate_delay(4), Duration::from_secs(8));
        assert_eq!(backoff.calculate_delay(5), Duration::from_secs(10));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = BackoffStrategy::Fixed(Duration::from_secs(3));
        assert_eq!(backoff.calculate_delay(0), Duration::from_secs(3));
        assert_eq!(backoff.calculate_delay(7), Duration::from_secs(3));
    }

    /// Validates `Jitter::Proportional` bounds over many samples.
    ///
    /// Assertions:
    /// - Ensures every jittered delay lies in `[delay, 1.1 * delay]`.
    #[test]
    fn test_proportional_jitter_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let jitter = Jitter::Proportional(0.1);
        let delay = Duration::from_secs(2);

        for _ in 0..500 {
            let jittered = jitter.apply_with(delay, &mut rng);
            assert!(jittered >= delay);
            assert!(jittered <= Duration::from_millis(2200));
        }
    }

    #[test]
    fn test_no_jitter_is_identity() {
        assert_eq!(Jitter::None.apply(Duration::from_millis(750)), Duration::from_millis(750));
        assert_eq!(Jitter::Proportional(0.1).apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::CircuitOpen.to_string(), "circuit_open");
        assert!(!RetryDecision::Stop(StopReason::Offline).is_retry());
        assert!(RetryDecision::Retry(Duration::from_secs(1)).is_retry());
    }
}
