//! Connectivity state

mod monitor;

pub use monitor::NetworkMonitor;
