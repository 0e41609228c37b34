//! Remote file source
//!
//! Resolves a directory-style listing into `filename -> URL` and downloads
//! individual files. The sync engine depends only on [`RemoteSource`].

mod http;
pub mod listing;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::RemoteListing;

pub use http::HttpRemoteSource;
pub use listing::parse_listing;

/// Where remote files come from
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch and parse the listing
    ///
    /// A failed fetch is an error, never an empty listing.
    async fn list_files(&self) -> Result<RemoteListing>;

    /// Download one file
    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>>;
}
