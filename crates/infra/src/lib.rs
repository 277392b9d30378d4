//! # FieldLink Infrastructure
//!
//! Infrastructure implementations of core pipeline ports.
//!
//! This crate contains:
//! - HTTP transport and refresh-endpoint client (reqwest)
//! - SQLite-backed offline queue store (r2d2 + rusqlite)
//! - Keychain and in-memory token stores
//! - Connectivity monitor and the background queue replay worker
//! - Configuration loading from the environment and files
//!
//! ## Architecture
//! - Implements traits defined in `fieldlink-core`
//! - Contains all "impure" code (I/O, platform keychain)

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod memory;
pub mod network;
pub mod sync;

// Re-export commonly used items
pub use auth::{KeychainProvider, KeychainTokenStore, SecretStore};
pub use config::ConfigLoader;
pub use database::{DbManager, SqliteQueueStore};
pub use errors::InfraError;
pub use http::{HttpClient, HttpTokenRefresher, ReqwestTransport};
pub use memory::{InMemoryQueueStore, InMemoryTokenStore};
pub use network::NetworkMonitor;
pub use sync::{QueueProcessor, QueueReplayWorker, ReplayWorkerConfig, WorkerError};
