//! Common utilities shared across FieldLink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, serde helpers, status enum macros
//! - `runtime`: async infrastructure (time, resilience, sync)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
#[macro_use]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod sync;
#[cfg(feature = "runtime")]
pub mod time;

#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    Jitter, RetryDecision, StopReason,
};
#[cfg(feature = "runtime")]
pub use sync::SingleFlight;
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock, TimerHandle};
#[cfg(feature = "foundation")]
pub use utils::serde::{duration_millis, duration_secs};
