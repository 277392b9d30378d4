//! Token lifecycle management

pub mod ports;
pub mod service;

pub use service::TokenLifecycleManager;
