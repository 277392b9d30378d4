use super::request::HttpMethod;
use crate::errors::{TransportError, TransportErrorKind};

/// Per-request retry bookkeeping, alive for one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// Zero-based index of the attempt that just failed
    pub attempt: u32,
    pub method: HttpMethod,
    pub last_status: Option<u16>,
    pub last_error_kind: Option<TransportErrorKind>,
    pub request_id: Option<String>,
}

impl RetryContext {
    pub fn new(method: HttpMethod, request_id: Option<String>) -> Self {
        Self { attempt: 0, method, last_status: None, last_error_kind: None, request_id }
    }

    /// Record the outcome of the current attempt
    pub fn record(&mut self, error: &TransportError) {
        self.last_status = error.status();
        self.last_error_kind = Some(error.kind());
    }

    /// Move on to the next attempt
    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}
