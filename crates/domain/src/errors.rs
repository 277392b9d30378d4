//! Error taxonomy for the request pipeline
//!
//! Every error is `Clone` so a single refresh or send result can be handed
//! to several waiters unchanged.

use std::fmt;
use std::time::Duration;

use fieldlink_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use fieldlink_common::{impl_error_classification, impl_error_conversion};
use thiserror::Error;

use crate::constants::DEFAULT_RETRYABLE_STATUSES;
use crate::types::HttpMethod;

/// Which phase of an HTTP exchange timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Send,
    Receive,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

/// Failure of a single physical HTTP attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0} timeout")]
    Timeout(TimeoutKind),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("bad response: HTTP {status}")]
    BadResponse { status: u16, body: Option<String>, retry_after: Option<Duration> },
}

/// Coarse kind of a [`TransportError`], recorded in retry contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ConnectionError,
    Cancelled,
    BadResponse,
}

impl TransportError {
    pub fn bad_response(status: u16) -> Self {
        Self::BadResponse { status, body: None, retry_after: None }
    }

    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::ConnectionError(_) => TransportErrorKind::ConnectionError,
            Self::Cancelled => TransportErrorKind::Cancelled,
            Self::BadResponse { .. } => TransportErrorKind::BadResponse,
        }
    }

    /// HTTP status for `BadResponse`, `None` otherwise
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Timeouts and connection errors: the request may never have reached
    /// the server
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionError(_))
    }
}

impl ErrorClassification for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionError(_) => true,
            Self::Cancelled => false,
            Self::BadResponse { status, .. } => DEFAULT_RETRYABLE_STATUSES.contains(status),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            Self::Timeout(_) | Self::ConnectionError(_) => ErrorSeverity::Warning,
            Self::BadResponse { status, .. } if *status >= 500 => ErrorSeverity::Error,
            Self::BadResponse { .. } => ErrorSeverity::Warning,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::BadResponse { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Secure storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("stored data corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_conversion!(CacheError, Common);
impl_error_classification!(CacheError, Common,
    Self::StorageUnavailable(_) => {
        retryable: true,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Corrupted(_) => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    }
);

/// Token lifecycle failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no token available")]
    NoToken,

    #[error("session expired")]
    SessionExpired,

    #[error("refresh token rejected")]
    InvalidRefreshToken,

    #[error("malformed token: {0}")]
    Malformed(String),

    /// Refresh could not reach the server; the stored token is untouched
    #[error("network failure during refresh: {0}")]
    Network(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] CacheError),
}

impl AuthError {
    /// Whether the user must log in again
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::NoToken | Self::SessionExpired | Self::InvalidRefreshToken)
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoToken => ErrorSeverity::Info,
            Self::SessionExpired | Self::InvalidRefreshToken => ErrorSeverity::Warning,
            Self::Malformed(_) => ErrorSeverity::Error,
            Self::Network(e) => e.severity(),
            Self::Storage(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_critical())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Network(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Offline queue failures; local to enqueue and replay
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("offline queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("queued request {id} expired")]
    Expired { id: i64 },

    #[error("queued request {id} dropped after {attempts} attempts")]
    RetriesExhausted { id: i64, attempts: u32 },

    #[error(transparent)]
    Storage(#[from] CacheError),
}

impl_error_classification!(QueueError, Storage,
    Self::QueueFull { .. } => {
        retryable: true,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Expired { .. } | Self::RetriesExhausted { .. } => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    }
);

/// Coarse grouping callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credentials missing or rejected
    Auth,
    /// The server could not be reached
    Network,
    /// The server answered with 5xx
    Server,
    /// The server answered with 4xx
    Client,
    /// Rejected locally because the device is offline
    Offline,
    /// The offline queue refused or lost the write
    Queue,
    /// Cancelled by the caller
    Cancelled,
}

/// Error surfaced at the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("offline: {method} {path} not sent")]
    Offline { method: HttpMethod, path: String },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(AuthError::Network(e)) | Self::Transport(e) => match e {
                TransportError::Cancelled => ErrorCategory::Cancelled,
                TransportError::Timeout(_) | TransportError::ConnectionError(_) => {
                    ErrorCategory::Network
                }
                TransportError::BadResponse { status: 401 | 403, .. } => ErrorCategory::Auth,
                TransportError::BadResponse { status, .. } if *status >= 500 => {
                    ErrorCategory::Server
                }
                TransportError::BadResponse { .. } => ErrorCategory::Client,
            },
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Offline { .. } => ErrorCategory::Offline,
            Self::Queue(_) => ErrorCategory::Queue,
        }
    }
}

impl ErrorClassification for PipelineError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
            Self::Offline { .. } => true,
            Self::Queue(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Auth(e) => e.severity(),
            Self::Transport(e) => e.severity(),
            Self::Offline { .. } => ErrorSeverity::Info,
            Self::Queue(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_critical(),
            Self::Queue(e) => e.is_critical(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Auth(e) => e.retry_after(),
            Self::Transport(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
