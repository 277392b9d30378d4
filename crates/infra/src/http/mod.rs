//! HTTP adapters over reqwest

pub mod client;
pub mod refresher;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use refresher::HttpTokenRefresher;
pub use transport::ReqwestTransport;
