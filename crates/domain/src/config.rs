//! Configuration management
//!
//! Every section has a `Default` matching the documented pipeline defaults,
//! so partial files and environments only override what they name.

use std::time::Duration;

use fieldlink_common::error::{CommonError, CommonResult};
use fieldlink_common::{duration_millis, duration_secs};
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Reject configurations the services cannot run with
    pub fn validate(&self) -> CommonResult<()> {
        self.api.validate()?;
        self.retry.validate()?;
        self.queue.validate()?;
        self.circuit_breaker.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

/// Backend endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Refresh endpoint, relative to `base_url`
    pub refresh_path: String,
    /// Optional lightweight endpoint polled by the connectivity monitor
    pub health_path: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            refresh_path: "/api/v1/auth/refresh".to_string(),
            health_path: None,
        }
    }
}

impl ApiConfig {
    fn validate(&self) -> CommonResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CommonError::config_field("api.base_url", "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(CommonError::config_field("api.request_timeout", "must be positive"));
        }
        Ok(())
    }
}

/// Token lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh this long before `expires_at`
    #[serde(with = "duration_secs")]
    pub refresh_window: Duration,
    /// Keychain service name for the token store
    pub keychain_service: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_window: Duration::from_secs(DEFAULT_REFRESH_WINDOW_SECS),
            keychain_service: "fieldlink".to_string(),
        }
    }
}

/// Retry controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Upper bound of jitter as a fraction of the computed delay
    pub jitter_ratio: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_ratio: DEFAULT_JITTER_RATIO,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> CommonResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CommonError::config_field("retry.multiplier", "must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(CommonError::config_field("retry.jitter_ratio", "must be within 0.0..=1.0"));
        }
        if self.base_delay > self.max_delay {
            return Err(CommonError::config_field(
                "retry.base_delay",
                "must not exceed retry.max_delay",
            ));
        }
        Ok(())
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// Offline queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of pending records
    pub capacity: usize,
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
    /// Records are dropped once this many replay attempts have failed
    pub max_retries: u32,
    /// Periodic replay tick of the background worker
    #[serde(with = "duration_secs")]
    pub replay_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            default_ttl: Duration::from_secs(DEFAULT_QUEUE_TTL_SECS),
            max_retries: DEFAULT_QUEUE_MAX_RETRIES,
            replay_interval: Duration::from_secs(DEFAULT_REPLAY_INTERVAL_SECS),
        }
    }
}

impl QueueConfig {
    fn validate(&self) -> CommonResult<()> {
        if self.capacity == 0 {
            return Err(CommonError::config_field("queue.capacity", "must be at least 1"));
        }
        if self.default_ttl.is_zero() {
            return Err(CommonError::config_field("queue.default_ttl", "must be positive"));
        }
        if self.replay_interval.is_zero() {
            return Err(CommonError::config_field("queue.replay_interval", "must be positive"));
        }
        Ok(())
    }
}

/// Per-endpoint circuit breaker thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerSettings {
    fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(CommonError::config_field(
                "circuit_breaker.success_threshold",
                "must be at least 1",
            ));
        }
        if self.half_open_max_calls < self.success_threshold {
            return Err(CommonError::config_field(
                "circuit_breaker.half_open_max_calls",
                "must be >= success_threshold",
            ));
        }
        Ok(())
    }
}

/// Queue database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "fieldlink-queue.db".to_string(), pool_size: 4 }
    }
}

impl DatabaseConfig {
    fn validate(&self) -> CommonResult<()> {
        if self.pool_size == 0 {
            return Err(CommonError::config_field("database.pool_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info,fieldlink=debug".to_string(), format: LogFormat::Pretty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.queue.default_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.auth.refresh_window, Duration::from_secs(5 * 60));
        assert!(config.validate().is_ok());
    }

    /// Validates partial TOML overrides.
    ///
    /// Assertions:
    /// - Ensures only the named fields change.
    /// - Ensures durations use the millisecond/second encodings.
    #[test]
    fn test_partial_toml_overrides() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [retry]
            max_retries = 5
            base_delay = 250

            [queue]
            default_ttl = 3600

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.queue.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.queue.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue.capacity"));

        let mut config = PipelineConfig::default();
        config.retry.jitter_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.circuit_breaker.half_open_max_calls = 1;
        assert!(config.validate().is_err());
    }
}
