//! Object store trait
//!
//! Defines the `ObjectStore` trait every store backend implements, so the
//! sync engine and the trigger never depend on a concrete SDK.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FileMap;

/// Bucket/key object API used by the sync engine
///
/// Failures are reported as `MirrorError::StoreAuth` (credentials),
/// `MirrorError::StoreUnavailable` (network or server side) or
/// `MirrorError::NotFound` (key or bucket absent), so callers can tell the
/// three apart.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Write a whole object, replacing any existing one
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Delete an object. Deleting an absent key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// List every object under `prefix` as `filename -> fingerprint`
    ///
    /// Filenames have the prefix stripped. Implementations must follow
    /// pagination until the listing is exhausted.
    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<FileMap>;

    /// Create the bucket unless it already exists
    async fn create_bucket_if_absent(&self, bucket: &str) -> Result<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Strip the quotes S3 puts around ETags
pub fn unquote_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Key relative to `prefix`, or `None` if the key lives elsewhere
pub fn strip_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}
