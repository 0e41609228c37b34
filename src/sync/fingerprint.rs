//! Content fingerprints
//!
//! MD5 hex digests. For single-part uploads this is exactly the ETag S3 and
//! MinIO report, so a freshly computed fingerprint compares directly against a
//! listed one.

use md5::{Digest, Md5};

/// Lowercase hex MD5 of `data`
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
