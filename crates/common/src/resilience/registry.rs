//! Lazily created circuit breakers keyed by endpoint

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::CommonResult;
use crate::time::{Clock, SystemClock};

/// Idle breakers are swept once the registry tracks more endpoints than this
pub const MAX_TRACKED_ENDPOINTS: usize = 256;

/// One circuit breaker per endpoint key
///
/// Keys are normalised by dropping any query string, so `/orders?page=2`
/// and `/orders` share a breaker. Only endpoints that have failed recently
/// hold an entry; a breaker that returns to idle is dropped.
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    config: CircuitBreakerConfig,
    clock: Arc<C>,
    breakers: DashMap<String, CircuitBreaker<C>>,
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Create an empty registry; every breaker it creates uses `config`
    pub fn new(config: CircuitBreakerConfig, clock: Arc<C>) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, breakers: DashMap::new() })
    }

    /// Breaker for `endpoint`, created on first use
    pub fn breaker(&self, endpoint: &str) -> CircuitBreaker<C> {
        let key = normalize_key(endpoint);
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }

        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                CircuitBreaker::from_validated(self.config.clone(), Arc::clone(&self.clock))
            })
            .clone()
    }

    /// Whether calls to `endpoint` are currently rejected
    ///
    /// Endpoints without a breaker yet are never open.
    pub fn is_open(&self, endpoint: &str) -> bool {
        self.breakers.get(normalize_key(endpoint)).is_some_and(|cb| cb.is_open())
    }

    /// Admit one more call to `endpoint`
    ///
    /// Unlike [`Self::is_open`] this moves a cooled-down breaker to HALF_OPEN
    /// and counts the call against its half-open allowance, so the outcome
    /// must be reported with [`Self::record_success`] or
    /// [`Self::record_failure`].
    pub fn try_acquire(&self, endpoint: &str) -> bool {
        let Some(breaker) = self.existing(endpoint) else {
            return true;
        };
        breaker.can_execute()
    }

    /// Record a successful call to `endpoint`
    ///
    /// Never creates a breaker.
    pub fn record_success(&self, endpoint: &str) {
        let key = normalize_key(endpoint);
        let Some(breaker) = self.existing(key) else {
            return;
        };
        breaker.record_success();
        self.breakers.remove_if(key, |_, cb| cb.is_idle());
    }

    /// Record a failed call to `endpoint`
    pub fn record_failure(&self, endpoint: &str) {
        self.breaker(endpoint).record_failure();
        if self.breakers.len() > MAX_TRACKED_ENDPOINTS {
            self.prune_idle();
        }
    }

    /// Drop every breaker that is idle; returns how many were dropped
    pub fn prune_idle(&self) -> usize {
        let before = self.breakers.len();
        self.breakers.retain(|_, cb| !cb.is_idle());
        let pruned = before.saturating_sub(self.breakers.len());
        if pruned > 0 {
            debug!(pruned, remaining = self.breakers.len(), "Pruned idle circuit breakers");
        }
        pruned
    }

    /// Number of endpoints currently holding a breaker
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn existing(&self, endpoint: &str) -> Option<CircuitBreaker<C>> {
        self.breakers.get(normalize_key(endpoint)).map(|entry| entry.clone())
    }

    /// State of every breaker created so far, sorted by key
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<_> =
            self.breakers.iter().map(|entry| (entry.key().clone(), entry.state())).collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Reset every breaker to CLOSED
    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.reset();
        }
    }
}

fn normalize_key(endpoint: &str) -> &str {
    endpoint.split_once('?').map_or(endpoint, |(path, _)| path)
}
