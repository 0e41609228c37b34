//! In-memory object store
//!
//! Behaves like a single-part-upload S3 bucket: ETags are MD5 digests,
//! deletes are idempotent and missing buckets are reported as `NotFound`.
//! Call counters and failure injection make it the store of choice for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::{strip_prefix, ObjectStore};
use crate::error::{MirrorError, Result};
use crate::sync::fingerprint;
use crate::types::FileMap;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    etag: String,
    content_type: Option<String>,
}

/// Object store held entirely in memory
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    failing_keys: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `bucket`
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.buckets.write().insert(bucket.to_string(), BTreeMap::new());
        store
    }

    /// Make every operation on `key` fail with `StoreUnavailable`
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.write().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_keys.write().clear();
    }

    /// Make every operation fail with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful `delete` calls so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Sorted full keys in `bucket`
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .and_then(|o| o.content_type.clone())
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MirrorError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        if self.failing_keys.read().contains(key) {
            return Err(MirrorError::StoreUnavailable(format!(
                "injected failure for {}",
                key
            )));
        }
        Ok(())
    }

    fn no_bucket(bucket: &str) -> MirrorError {
        MirrorError::NotFound {
            bucket: bucket.to_string(),
            key: String::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.check(key)?;
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_bucket(bucket))?;
        objects
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| MirrorError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.check(key)?;
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_bucket(bucket))?;

        let etag = fingerprint(&body);
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                etag,
                content_type: content_type.map(String::from),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.check(key)?;
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::no_bucket(bucket))?;
        objects.remove(key);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<FileMap> {
        self.check(prefix)?;
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| Self::no_bucket(bucket))?;

        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, object)| {
                strip_prefix(key, prefix).map(|name| (name.to_string(), object.etag.clone()))
            })
            .collect())
    }

    async fn create_bucket_if_absent(&self, bucket: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MirrorError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
