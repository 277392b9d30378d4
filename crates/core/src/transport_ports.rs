//! Port interfaces for the network edge

use async_trait::async_trait;
use fieldlink_domain::{ApiRequest, ApiResponse, TransportError};

/// Performs one physical HTTP call
///
/// Implementations return `Ok` only for 2xx responses; every other status
/// comes back as [`TransportError::BadResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Reports whether the device currently has connectivity
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}
