//! Time utilities and abstractions
//!
//! - **[`clock`]**: real and mock clocks
//! - **[`timer`]**: cancellable one-shot timers

pub mod clock;
pub mod timer;

pub use clock::{Clock, MockClock, SystemClock};
pub use timer::{schedule, TimerHandle};
