//! Request pipeline: offline gate, credentials, retries

pub mod service;
pub mod stages;

pub use service::RequestPipeline;
