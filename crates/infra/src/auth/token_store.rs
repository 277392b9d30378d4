//! `TokenStore` layered on a [`SecretStore`]
//!
//! Keys: `access`, `refresh`, `csrf`, and `metadata` (JSON with the
//! scheme and timestamps). The access entry marks whether a token exists.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fieldlink_core::TokenStore;
use fieldlink_domain::{CacheError, Token};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{debug, instrument};

use super::keychain::{KeychainProvider, SecretStore};
use crate::errors::InfraError;

const ACCESS_KEY: &str = "access";
const REFRESH_KEY: &str = "refresh";
const CSRF_KEY: &str = "csrf";
const METADATA_KEY: &str = "metadata";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenMetadata {
    scheme: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

pub struct KeychainTokenStore<S: SecretStore = KeychainProvider> {
    secrets: Arc<S>,
}

impl KeychainTokenStore<KeychainProvider> {
    /// Store under the platform keychain service `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_secrets(Arc::new(KeychainProvider::new(service_name)))
    }
}

impl<S: SecretStore> KeychainTokenStore<S> {
    pub fn with_secrets(secrets: Arc<S>) -> Self {
        Self { secrets }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, InfraError> + Send + 'static,
    {
        let secrets = Arc::clone(&self.secrets);
        task::spawn_blocking(move || op(&secrets))
            .await
            .map_err(map_join_error)?
            .map_err(CacheError::from)
    }
}

fn load_token(secrets: &impl SecretStore) -> Result<Option<Token>, InfraError> {
    let Some(access_value) = secrets.get_secret(ACCESS_KEY)? else {
        return Ok(None);
    };
    let raw = secrets
        .get_secret(METADATA_KEY)?
        .ok_or_else(|| CacheError::Corrupted("token metadata missing".into()))?;
    let metadata: TokenMetadata = serde_json::from_str(&raw)?;

    Ok(Some(Token {
        access_value,
        scheme: metadata.scheme,
        issued_at: metadata.issued_at,
        expires_at: metadata.expires_at,
        refresh_value: secrets.get_secret(REFRESH_KEY)?,
        csrf_value: secrets.get_secret(CSRF_KEY)?,
    }))
}

fn save_token(secrets: &impl SecretStore, token: &Token) -> Result<(), InfraError> {
    let metadata = TokenMetadata {
        scheme: token.scheme.clone(),
        issued_at: token.issued_at,
        expires_at: token.expires_at,
    };
    secrets.set_secret(METADATA_KEY, &serde_json::to_string(&metadata)?)?;
    set_or_delete(secrets, REFRESH_KEY, token.refresh_value.as_deref())?;
    set_or_delete(secrets, CSRF_KEY, token.csrf_value.as_deref())?;
    // Access goes last; its presence marks a stored token
    secrets.set_secret(ACCESS_KEY, &token.access_value)
}

fn set_or_delete(
    secrets: &impl SecretStore,
    key: &str,
    value: Option<&str>,
) -> Result<(), InfraError> {
    match value {
        Some(value) => secrets.set_secret(key, value),
        None => secrets.delete_secret(key),
    }
}

fn clear_token(secrets: &impl SecretStore) -> Result<(), InfraError> {
    for key in [ACCESS_KEY, REFRESH_KEY, CSRF_KEY, METADATA_KEY] {
        secrets.delete_secret(key)?;
    }
    Ok(())
}

#[async_trait]
impl<S: SecretStore> TokenStore for KeychainTokenStore<S> {
    async fn load(&self) -> Result<Option<Token>, CacheError> {
        let token = self.blocking(|secrets| load_token(secrets)).await?;
        debug!(found = token.is_some(), "Loaded token from keychain");
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn save(&self, token: &Token) -> Result<(), CacheError> {
        let token = token.clone();
        self.blocking(move |secrets| save_token(secrets, &token)).await
    }

    #[instrument(skip_all)]
    async fn clear(&self) -> Result<(), CacheError> {
        self.blocking(|secrets| clear_token(secrets)).await
    }
}

fn map_join_error(err: task::JoinError) -> CacheError {
    if err.is_cancelled() {
        CacheError::StorageUnavailable("keychain task cancelled".into())
    } else {
        CacheError::StorageUnavailable(format!("keychain task panic: {err}"))
    }
}
