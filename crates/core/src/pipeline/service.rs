//! Request pipeline
//!
//! Every request flows application → offline gate → credential injection →
//! transport, with the retry controller wrapping the last two. A 401 from
//! the server triggers one credential refresh and a single replay.

use std::sync::Arc;

use async_trait::async_trait;
use fieldlink_common::time::{Clock, SystemClock};
use fieldlink_domain::{
    ApiRequest, ApiResponse, AuthError, PipelineError, PipelineResult, TransportError,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::stages::{self, Gate};
use crate::auth::TokenLifecycleManager;
use crate::queue::ports::ReplayDispatcher;
use crate::queue::{OfflineQueue, ProcessReport};
use crate::retry::RetryController;
use crate::transport_ports::{ConnectivityProbe, Transport};

const UNAUTHORIZED: u16 = 401;

/// What the credential stage did on the latest attempt
#[derive(Default)]
struct AttemptCredentials {
    access_value: Option<String>,
    failure: Option<AuthError>,
}

/// Resilient request pipeline
pub struct RequestPipeline<C: Clock = SystemClock> {
    tokens: TokenLifecycleManager<C>,
    retry: Arc<RetryController<C>>,
    queue: Arc<OfflineQueue<C>>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn ConnectivityProbe>,
}

impl<C: Clock> RequestPipeline<C> {
    pub fn new(
        tokens: TokenLifecycleManager<C>,
        retry: Arc<RetryController<C>>,
        queue: Arc<OfflineQueue<C>>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self { tokens, retry, queue, transport, connectivity }
    }

    pub fn tokens(&self) -> &TokenLifecycleManager<C> {
        &self.tokens
    }

    pub fn queue(&self) -> &Arc<OfflineQueue<C>> {
        &self.queue
    }

    pub fn retry(&self) -> &Arc<RetryController<C>> {
        &self.retry
    }

    /// Send `request`
    pub async fn send(&self, request: ApiRequest) -> PipelineResult<ApiResponse> {
        self.send_with_cancel(request, &CancellationToken::new()).await
    }

    /// Send `request`, aborting between attempts once `cancel` fires
    pub async fn send_with_cancel(
        &self,
        mut request: ApiRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<ApiResponse> {
        let request_id = stages::assign_request_id(&mut request);
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path
        );

        async move {
            match stages::offline_gate(self.connectivity.as_ref(), &self.queue, &request).await? {
                Gate::Queued(response) => Ok(response),
                Gate::Proceed => self.deliver(&request, cancel).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Replay queued writes now
    pub async fn process_queue(&self) -> ProcessReport {
        self.queue.process_queue(self).await
    }

    /// Credentials, transport and retries, plus the reactive 401 refresh
    async fn deliver(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<ApiResponse> {
        let (result, sent_with) = self.send_authorized(request, cancel).await;

        let Some(rejected_access) = sent_with else {
            return result;
        };
        match result {
            Err(PipelineError::Transport(TransportError::BadResponse {
                status: UNAUTHORIZED, ..
            })) => {
                info!("Credentials rejected, refreshing and replaying once");
                self.tokens.refresh_rejected(&rejected_access).await?;
                self.send_authorized(request, cancel).await.0
            }
            other => other,
        }
    }

    /// One retried logical send. Also returns the access value used by the
    /// final attempt, if credentials were attached.
    async fn send_authorized(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> (PipelineResult<ApiResponse>, Option<String>) {
        let credentials = Mutex::new(AttemptCredentials::default());

        let outcome = self
            .retry
            .execute(request, |attempt| self.attempt(request, attempt, &credentials), cancel)
            .await;

        let AttemptCredentials { access_value, failure } = credentials.into_inner();
        let result = match (outcome, failure) {
            (Err(_), Some(auth_failure)) => Err(PipelineError::Auth(auth_failure)),
            (outcome, _) => outcome.map_err(PipelineError::from),
        };
        (result, access_value)
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        attempt: u32,
        credentials: &Mutex<AttemptCredentials>,
    ) -> Result<ApiResponse, TransportError> {
        let authorized = match stages::authorize(&self.tokens, request).await {
            Ok(authorized) => authorized,
            Err(e) => {
                debug!(error = %e, "No usable credentials");
                credentials.lock().failure = Some(e);
                // Cancelled is never retried, so the controller stops here
                return Err(TransportError::Cancelled);
            }
        };
        credentials.lock().access_value = authorized.access_value;

        debug!(attempt, "Sending request");
        self.transport.send(&authorized.request).await
    }
}

#[async_trait]
impl<C: Clock> ReplayDispatcher for RequestPipeline<C> {
    async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, PipelineError> {
        let request_id = stages::assign_request_id(&mut request);
        let span = info_span!("replay", request_id = %request_id, path = %request.path);
        self.deliver(&request, &CancellationToken::new()).instrument(span).await
    }
}
