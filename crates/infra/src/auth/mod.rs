//! Secure token persistence

pub mod keychain;
pub mod token_store;

pub use keychain::{KeychainProvider, SecretStore};
pub use token_store::KeychainTokenStore;
