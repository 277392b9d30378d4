//! # FieldLink Domain
//!
//! Value types shared by every layer of the request pipeline.
//!
//! This crate contains:
//! - Tokens, requests, responses and queued records
//! - The error taxonomy (auth, transport, queue, storage)
//! - Configuration structures
//! - Header names and default constants
//!
//! ## Architecture
//! - Depends only on the foundation tier of `fieldlink-common`
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
