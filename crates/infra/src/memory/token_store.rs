use async_trait::async_trait;
use fieldlink_core::TokenStore;
use fieldlink_domain::{CacheError, Token};
use parking_lot::RwLock;

/// Process-lifetime `TokenStore`; nothing survives a restart
#[derive(Default)]
pub struct InMemoryTokenStore {
    token: RwLock<Option<Token>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `token` already stored
    pub fn with_token(token: Token) -> Self {
        Self { token: RwLock::new(Some(token)) }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<Token>, CacheError> {
        Ok(self.token.read().clone())
    }

    async fn save(&self, token: &Token) -> Result<(), CacheError> {
        *self.token.write() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.token.write().take();
        Ok(())
    }
}
