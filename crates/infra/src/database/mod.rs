//! SQLite storage for the offline queue

pub mod manager;
pub mod queue_repository;

pub use manager::DbManager;
pub use queue_repository::SqliteQueueStore;
