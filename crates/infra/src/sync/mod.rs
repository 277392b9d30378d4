//! Background replay of the offline queue

pub mod errors;
pub mod replay_worker;

pub use errors::WorkerError;
pub use replay_worker::{QueueProcessor, QueueReplayWorker, ReplayWorkerConfig};
