//! # FieldLink App
//!
//! Composition root for the request pipeline.
//!
//! - [`context::PipelineContext`] wires configuration, storage, HTTP, tokens
//!   and the replay worker together
//! - [`logging`] installs the tracing subscriber
//! - [`health`] reports component health for the running context

pub mod context;
pub mod health;
pub mod logging;

pub use context::PipelineContext;
pub use health::{ComponentHealth, HealthStatus};
pub use logging::init_tracing;
