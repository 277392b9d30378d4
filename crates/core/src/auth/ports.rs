//! Port interfaces for token persistence and renewal

use async_trait::async_trait;
use fieldlink_domain::{AuthError, CacheError, Token};

/// Secure key-value storage for the current token
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, if any
    async fn load(&self) -> Result<Option<Token>, CacheError>;

    /// Persist `token`, replacing whatever was stored
    async fn save(&self, token: &Token) -> Result<(), CacheError>;

    /// Remove every stored credential
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Exchanges a refresh value for a new token
///
/// A rejected refresh value must surface as
/// [`AuthError::InvalidRefreshToken`]; failures to reach the server as
/// [`AuthError::Network`].
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_value: &str) -> Result<Token, AuthError>;
}
