//! Offline write queue

pub mod ports;
pub mod priority;
pub mod service;

pub use priority::derive_priority;
pub use service::{OfflineQueue, ProcessReport, SkipReason};
