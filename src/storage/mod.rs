//! Object store facade
//!
//! The sync engine talks to storage only through [`ObjectStore`]. The S3
//! backend requires the `cloud` feature; the in-memory backend is always
//! available.

pub mod backend;
pub mod memory;
#[cfg(feature = "cloud")]
pub mod s3;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;

pub use backend::{unquote_etag, ObjectStore};
pub use memory::InMemoryObjectStore;
#[cfg(feature = "cloud")]
pub use s3::S3ObjectStore;

/// Open the configured store
#[cfg(feature = "cloud")]
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(Arc::new(S3ObjectStore::connect(config).await?))
}

/// Open the configured store
#[cfg(not(feature = "cloud"))]
pub async fn connect(_config: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    tracing::warn!("Built without the `cloud` feature; using a volatile in-memory store");
    Ok(Arc::new(InMemoryObjectStore::new()))
}
