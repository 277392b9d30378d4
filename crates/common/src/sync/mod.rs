//! Concurrency coordination primitives

pub mod single_flight;

pub use single_flight::SingleFlight;
