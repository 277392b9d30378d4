//! Retry controller
//!
//! Wraps the physical attempts of one logical request. Attempts are strictly
//! sequential; between them the controller sleeps for an exponentially
//! growing, jittered delay unless the server named one via `Retry-After`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fieldlink_common::error::ErrorClassification;
use fieldlink_common::time::{Clock, SystemClock};
use fieldlink_common::{BackoffStrategy, CircuitBreakerRegistry, Jitter, RetryDecision, StopReason};
use fieldlink_domain::{ApiRequest, ApiResponse, RetryConfig, RetryContext, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport_ports::ConnectivityProbe;

/// Decides whether and when a failed request is attempted again
pub struct RetryController<C: Clock = SystemClock> {
    config: RetryConfig,
    backoff: BackoffStrategy,
    jitter: Jitter,
    connectivity: Arc<dyn ConnectivityProbe>,
    breakers: Option<Arc<CircuitBreakerRegistry<C>>>,
}

impl<C: Clock> RetryController<C> {
    pub fn new(config: RetryConfig, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        let backoff = BackoffStrategy::Exponential {
            initial_delay: config.base_delay,
            multiplier: config.multiplier,
            max_delay: config.max_delay,
        };
        let jitter = if config.jitter_ratio > 0.0 {
            Jitter::Proportional(config.jitter_ratio)
        } else {
            Jitter::None
        };

        Self { config, backoff, jitter, connectivity, breakers: None }
    }

    /// Track failures per path and stop retrying paths whose breaker is open
    pub fn with_circuit_breakers(mut self, breakers: Arc<CircuitBreakerRegistry<C>>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn circuit_breakers(&self) -> Option<&Arc<CircuitBreakerRegistry<C>>> {
        self.breakers.as_ref()
    }

    /// Whether `error` belongs to a class worth retrying at all
    pub fn is_retryable_error(&self, error: &TransportError) -> bool {
        match error {
            TransportError::Timeout(_) | TransportError::ConnectionError(_) => true,
            TransportError::Cancelled => false,
            TransportError::BadResponse { status, .. } => self.config.is_retryable_status(*status),
        }
    }

    /// Policy for the attempt recorded in `ctx` having failed with `error`
    ///
    /// Connectivity is not consulted here; [`execute`](Self::execute) checks
    /// it once the delay has elapsed. A `Retry` against a path with a breaker
    /// is admitted through it, which may move the breaker to half-open.
    pub fn decide(
        &self,
        ctx: &RetryContext,
        error: &TransportError,
        request: &ApiRequest,
    ) -> RetryDecision {
        if matches!(error, TransportError::Cancelled) {
            return RetryDecision::Stop(StopReason::Cancelled);
        }
        if !self.is_retryable_error(error) {
            return RetryDecision::Stop(StopReason::NonRetryableError);
        }
        if !request.is_retry_safe() {
            return RetryDecision::Stop(StopReason::NotIdempotent);
        }
        if ctx.attempt >= self.config.max_retries {
            return RetryDecision::Stop(StopReason::AttemptsExhausted);
        }
        if self.breakers.as_ref().is_some_and(|breakers| !breakers.try_acquire(&request.path)) {
            return RetryDecision::Stop(StopReason::CircuitOpen);
        }

        RetryDecision::Retry(self.delay_for(ctx.attempt, error))
    }

    /// Delay before the attempt following `attempt`
    ///
    /// A server-supplied `Retry-After` replaces the computed backoff,
    /// jitter included.
    pub fn delay_for(&self, attempt: u32, error: &TransportError) -> Duration {
        match error.retry_after() {
            Some(server_delay) => server_delay,
            None => self.jitter.apply(self.backoff.calculate_delay(attempt)),
        }
    }

    /// Run `attempt_fn` until it succeeds or the policy gives up
    ///
    /// `attempt_fn` receives the zero-based attempt index and must redo
    /// credential injection each time, so a refreshed token is picked up.
    /// Once the policy stops, the last error is returned unchanged.
    /// Cancelling `cancel` aborts the current attempt or delay and yields
    /// [`TransportError::Cancelled`].
    pub async fn execute<F, Fut>(
        &self,
        request: &ApiRequest,
        mut attempt_fn: F,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, TransportError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<ApiResponse, TransportError>>,
    {
        let mut ctx = RetryContext::new(request.method, request.request_id().map(str::to_string));
        let request_id = ctx.request_id.clone().unwrap_or_default();

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                outcome = attempt_fn(ctx.attempt) => outcome,
            };

            let error = match outcome {
                Ok(response) => {
                    self.record_success(&request.path);
                    return Ok(response);
                }
                Err(error) => error,
            };
            if self.is_retryable_error(&error) {
                self.record_failure(&request.path);
            }
            ctx.record(&error);

            let delay = match self.decide(&ctx, &error, request) {
                RetryDecision::Retry(delay) => delay,
                RetryDecision::Stop(reason) => {
                    debug!(
                        request_id = %request_id,
                        path = %request.path,
                        attempt = ctx.attempt,
                        %reason,
                        error = %error,
                        "Not retrying request"
                    );
                    return Err(error);
                }
            };

            warn!(
                request_id = %request_id,
                path = %request.path,
                attempt = ctx.attempt,
                status = ?ctx.last_status,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Request failed, retrying"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            if !self.connectivity.is_online() {
                info!(
                    request_id = %request_id,
                    path = %request.path,
                    reason = %StopReason::Offline,
                    "Connectivity lost during backoff"
                );
                return Err(error);
            }

            ctx.advance();
        }
    }

    fn record_success(&self, path: &str) {
        if let Some(breakers) = &self.breakers {
            breakers.record_success(path);
        }
    }

    fn record_failure(&self, path: &str) {
        if let Some(breakers) = &self.breakers {
            breakers.record_failure(path);
        }
    }
}
