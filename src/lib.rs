//! Mirrorcast - mirror a remote file listing into object storage
//!
//! Keeps an S3-compatible bucket prefix in step with an HTTP directory
//! listing (content-fingerprinted uploads, deletions of files gone
//! upstream) and relays store "new object" events to live WebSocket clients.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod realtime;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod types;

pub use error::{MirrorError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
