use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use fieldlink_core::{ConnectivityProbe, ReplayDispatcher, Transport};
use fieldlink_domain::{ApiRequest, ApiResponse, PipelineError, TransportError};
use tokio::time::Instant;

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// A request as seen by the transport, with the (tokio) time it arrived
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: ApiRequest,
    pub at: Instant,
}

/// Scripted `Transport`.
///
/// Scripted outcomes are consumed in order; once exhausted, the responder
/// answers every further call (200 by default).
pub struct MockTransport {
    script: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Always answers 200
    pub fn ok() -> Self {
        Self::from_fn(|_| Ok(ApiResponse::new(200)))
    }

    /// Always answers with `outcome`
    pub fn always(outcome: Result<ApiResponse, TransportError>) -> Self {
        Self::from_fn(move |_| outcome.clone())
    }

    /// Answers from `script` first, then 200
    pub fn sequence(script: Vec<Result<ApiResponse, TransportError>>) -> Self {
        let transport = Self::ok();
        *transport.script.lock().unwrap() = script.into();
        transport
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|call| call.request.path.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { request: request.clone(), at: Instant::now() });
        tokio::task::yield_now().await;

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| (self.responder)(request))
    }
}

/// Connectivity flag flipped by the test
pub struct ToggleConnectivity {
    online: AtomicBool,
}

impl ToggleConnectivity {
    pub fn online() -> Self {
        Self { online: AtomicBool::new(true) }
    }

    pub fn offline() -> Self {
        Self { online: AtomicBool::new(false) }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for ToggleConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// `ReplayDispatcher` that records paths and fails the ones it is told to
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<String>>,
    failing_paths: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    pub fn fail_path(&self, path: &str) {
        self.failing_paths.lock().unwrap().push(path.to_string());
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplayDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, PipelineError> {
        self.dispatched.lock().unwrap().push(request.path.clone());
        if self.failing_paths.lock().unwrap().contains(&request.path) {
            return Err(PipelineError::Transport(TransportError::bad_response(503)));
        }
        Ok(ApiResponse::new(201))
    }
}
