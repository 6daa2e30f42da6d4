//! Splat API client

pub mod backend;
pub mod client;
pub mod errors;
pub mod types;

pub use backend::{AdminBackend, DownloadSink, SplatBackend};
pub use client::SplatClient;
pub use errors::ApiError;
pub use types::*;
