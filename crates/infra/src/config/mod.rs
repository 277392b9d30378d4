//! Configuration loading
//!
//! Layers a config file and `FIELDLINK_*` environment variables over the
//! defaults of [`fieldlink_domain::PipelineConfig`].

pub mod loader;

pub use loader::{load_from_file, probe_config_paths, ConfigLoader};
