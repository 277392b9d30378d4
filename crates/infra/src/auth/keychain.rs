//! Generic secret storage via the platform keychain (macOS Keychain,
//! Windows Credential Manager, Linux Secret Service).

use keyring::{Entry, Error as KeyringError};
use tracing::debug;

use crate::errors::InfraError;

/// Synchronous secret key-value storage
///
/// Calls may block on the platform keychain; async callers go through
/// `spawn_blocking`.
pub trait SecretStore: Send + Sync + 'static {
    /// Read `key`; a missing entry is `Ok(None)`
    fn get_secret(&self, key: &str) -> Result<Option<String>, InfraError>;

    fn set_secret(&self, key: &str, value: &str) -> Result<(), InfraError>;

    /// Remove `key`; removing a missing entry succeeds
    fn delete_secret(&self, key: &str) -> Result<(), InfraError>;
}

/// Secrets stored under one keychain service name
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, InfraError> {
        Ok(Entry::new(&self.service_name, key)?)
    }
}

impl SecretStore for KeychainProvider {
    fn get_secret(&self, key: &str) -> Result<Option<String>, InfraError> {
        debug!(service = %self.service_name, key = %key, "Reading keychain secret");
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), InfraError> {
        debug!(service = %self.service_name, key = %key, "Writing keychain secret");
        Ok(self.entry(key)?.set_password(value)?)
    }

    fn delete_secret(&self, key: &str) -> Result<(), InfraError> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain secret");
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
