//! Retry and circuit-breaking policy for individual requests

pub mod service;

use std::sync::Arc;

use fieldlink_common::error::CommonResult;
use fieldlink_common::time::Clock;
use fieldlink_common::{CircuitBreakerConfig, CircuitBreakerRegistry};
use fieldlink_domain::CircuitBreakerSettings;
pub use service::RetryController;

/// Translate configured breaker thresholds into a breaker configuration
pub fn circuit_breaker_config(settings: &CircuitBreakerSettings) -> CommonResult<CircuitBreakerConfig> {
    CircuitBreakerConfig::builder()
        .failure_threshold(u64::from(settings.failure_threshold))
        .success_threshold(u64::from(settings.success_threshold))
        .timeout(settings.timeout)
        .half_open_max_calls(u64::from(settings.half_open_max_calls))
        .build()
}

/// Per-path breaker registry, or `None` when breaking is disabled
pub fn circuit_breaker_registry<C: Clock>(
    settings: &CircuitBreakerSettings,
    clock: Arc<C>,
) -> CommonResult<Option<Arc<CircuitBreakerRegistry<C>>>> {
    if !settings.enabled {
        return Ok(None);
    }
    let registry = CircuitBreakerRegistry::new(circuit_breaker_config(settings)?, clock)?;
    Ok(Some(Arc::new(registry)))
}
