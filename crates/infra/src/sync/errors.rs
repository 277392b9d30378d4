//! Background worker lifecycle errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker already running")]
    AlreadyRunning,

    #[error("worker not running")]
    NotRunning,

    #[error("worker task panicked: {0}")]
    Panicked(String),

    #[error("worker task did not stop within {0:?}")]
    JoinTimeout(std::time::Duration),
}
