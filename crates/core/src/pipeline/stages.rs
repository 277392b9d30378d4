//! Request stages, applied in order by the pipeline
//!
//! 1. [`assign_request_id`]
//! 2. [`offline_gate`]
//! 3. [`authorize`], re-run for every physical attempt
//! 4. transport attempt under the retry controller

use fieldlink_common::time::Clock;
use fieldlink_domain::constants::{HEADER_AUTHORIZATION, HEADER_CSRF_TOKEN};
use fieldlink_domain::{ApiRequest, ApiResponse, AuthError, PipelineError, PipelineResult};
use tracing::{debug, info};

use crate::auth::TokenLifecycleManager;
use crate::queue::OfflineQueue;
use crate::transport_ports::ConnectivityProbe;

/// Make sure the request carries an `X-Request-ID`, returning it
pub fn assign_request_id(request: &mut ApiRequest) -> String {
    request.ensure_request_id()
}

/// Outcome of the offline gate
#[derive(Debug)]
pub enum Gate {
    /// Online: continue to the network
    Proceed,
    /// Offline write captured by the queue; answer with this synthetic response
    Queued(ApiResponse),
}

/// Queue writes and reject reads while offline
pub async fn offline_gate<C: Clock>(
    connectivity: &dyn ConnectivityProbe,
    queue: &OfflineQueue<C>,
    request: &ApiRequest,
) -> PipelineResult<Gate> {
    if connectivity.is_online() {
        return Ok(Gate::Proceed);
    }

    if request.method.is_write() {
        let id = queue.enqueue(request, None, None).await?;
        info!(queue_id = id, "Offline, write accepted into queue");
        return Ok(Gate::Queued(ApiResponse::accepted(id)));
    }

    debug!("Offline, rejecting read");
    Err(PipelineError::Offline { method: request.method, path: request.path.clone() })
}

/// Request with credentials applied, plus the access value that was used
#[derive(Debug)]
pub struct Authorized {
    pub request: ApiRequest,
    pub access_value: Option<String>,
}

/// Attach `Authorization`, and `X-CSRF-Token` on writes
///
/// Anonymous requests go out bare when no token is stored; any other
/// credential failure stops the request.
pub async fn authorize<C: Clock>(
    tokens: &TokenLifecycleManager<C>,
    request: &ApiRequest,
) -> Result<Authorized, AuthError> {
    let mut outgoing = request.clone();

    match tokens.get_token().await {
        Ok(token) => {
            outgoing.set_header(HEADER_AUTHORIZATION, token.authorization_value());
            if request.method.is_write() {
                if let Some(csrf) = &token.csrf_value {
                    outgoing.set_header(HEADER_CSRF_TOKEN, csrf.clone());
                }
            }
            Ok(Authorized { request: outgoing, access_value: Some(token.access_value) })
        }
        Err(AuthError::NoToken) if request.anonymous => {
            Ok(Authorized { request: outgoing, access_value: None })
        }
        Err(e) => Err(e),
    }
}
