//! # FieldLink Core
//!
//! Pipeline logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for transport, connectivity and storage
//! - The token lifecycle manager, retry controller and offline queue
//! - The request pipeline composing them
//!
//! ## Architecture Principles
//! - Depends only on `fieldlink-common` and `fieldlink-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod pipeline;
pub mod queue;
pub mod retry;

// Infrastructure ports
pub mod transport_ports;

pub use auth::ports::{TokenRefresher, TokenStore};
pub use auth::TokenLifecycleManager;
pub use pipeline::RequestPipeline;
pub use queue::ports::{QueueStore, ReplayDispatcher};
pub use queue::{derive_priority, OfflineQueue, ProcessReport, SkipReason};
pub use retry::{circuit_breaker_config, circuit_breaker_registry, RetryController};
pub use transport_ports::{ConnectivityProbe, Transport};
