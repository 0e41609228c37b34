//! Sync engine: mirror a remote listing into an object store prefix

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use super::fingerprint::fingerprint;
use super::plan::needs_upload;
use crate::config::SyncOptions;
use crate::error::Result;
use crate::remote::RemoteSource;
use crate::storage::ObjectStore;
use crate::types::{FileMap, FileOperation, PerFileError, RemoteFileEntry, SyncReport};

/// One unit of work in a pass
enum Task {
    /// Fetch, fingerprint and upload if changed
    Mirror(RemoteFileEntry),
    Delete(String),
}

enum Outcome {
    Uploaded(String),
    Unchanged,
    Deleted(String),
    Failed(PerFileError),
}

/// Mirrors a [`RemoteSource`] into an [`ObjectStore`] prefix
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn RemoteSource>,
    options: SyncOptions,
    /// One pass at a time per (bucket, prefix)
    passes: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            store,
            remote,
            options: SyncOptions::default(),
            passes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteSource> {
        &self.remote
    }

    fn pass_lock(&self, bucket: &str, prefix: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.passes
            .lock()
            .entry((bucket.to_string(), prefix.to_string()))
            .or_default()
            .clone()
    }

    /// Run one sync pass for `prefix` in `bucket`
    ///
    /// A non-empty prefix is treated as a directory (`pub/x` means `pub/x/`).
    /// Passes over the same bucket and prefix are serialized. Fails without
    /// touching the store if either listing cannot be read. Per-file fetch,
    /// upload and delete failures are collected into `SyncReport::errors` and
    /// do not stop the remaining files.
    pub async fn sync(&self, bucket: &str, prefix: &str) -> Result<SyncReport> {
        let prefix = normalize_prefix(prefix);
        let lock = self.pass_lock(bucket, &prefix);
        let _pass = lock.lock().await;

        let started_at = Utc::now();
        let concurrency = self.options.concurrency.max(1);

        let (listing, stored) = tokio::try_join!(
            self.remote.list_files(),
            self.store.list_by_prefix(bucket, &prefix)
        )?;

        tracing::info!(
            "Sync s3://{}/{}: {} remote files, {} stored objects",
            bucket,
            prefix,
            listing.len(),
            stored.len()
        );

        // Anything listed upstream is kept, even if its download fails below
        let deletes: Vec<String> = stored
            .keys()
            .filter(|name| !listing.contains(name))
            .cloned()
            .collect();

        let tasks = deletes
            .into_iter()
            .map(Task::Delete)
            .chain(listing.entries().map(Task::Mirror));

        let outcomes: Vec<Outcome> = stream::iter(tasks)
            .map(|task| self.run(bucket, &prefix, &stored, task))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut uploaded = Vec::new();
        let mut deleted = Vec::new();
        let mut unchanged = 0;
        let mut errors = Vec::new();

        for outcome in outcomes {
            match outcome {
                Outcome::Uploaded(name) => uploaded.push(name),
                Outcome::Deleted(name) => deleted.push(name),
                Outcome::Unchanged => unchanged += 1,
                Outcome::Failed(err) => errors.push(err),
            }
        }

        uploaded.sort();
        deleted.sort();
        errors.sort_by(|a, b| a.filename.cmp(&b.filename));

        let report = SyncReport {
            bucket: bucket.to_string(),
            prefix,
            uploaded,
            deleted,
            unchanged,
            errors,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            uploaded = report.uploaded.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged,
            errors = report.errors.len(),
            "Sync complete"
        );

        Ok(report)
    }

    async fn run(&self, bucket: &str, prefix: &str, stored: &FileMap, task: Task) -> Outcome {
        match task {
            Task::Mirror(entry) => self.mirror(bucket, prefix, stored, entry).await,
            Task::Delete(filename) => {
                let key = format!("{}{}", prefix, filename);
                match self.store.delete(bucket, &key).await {
                    Ok(()) => {
                        tracing::info!("Deleted: {}", filename);
                        Outcome::Deleted(filename)
                    }
                    Err(e) => {
                        tracing::warn!("Delete of {} failed: {}", filename, e);
                        Outcome::Failed(PerFileError::new(filename, FileOperation::Delete, &e))
                    }
                }
            }
        }
    }

    /// Bodies live only for the duration of one task
    async fn mirror(
        &self,
        bucket: &str,
        prefix: &str,
        stored: &FileMap,
        entry: RemoteFileEntry,
    ) -> Outcome {
        let RemoteFileEntry { filename, url } = entry;

        let body = match self.remote.fetch_file(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", filename, e);
                return Outcome::Failed(PerFileError::new(filename, FileOperation::Fetch, &e));
            }
        };

        let fresh = fingerprint(&body);
        if !needs_upload(stored.get(&filename).map(String::as_str), &fresh) {
            return Outcome::Unchanged;
        }

        let key = format!("{}{}", prefix, filename);
        match self.store.put(bucket, &key, body, None).await {
            Ok(()) => {
                tracing::info!("Uploaded/Updated: {}", filename);
                Outcome::Uploaded(filename)
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", filename, e);
                Outcome::Failed(PerFileError::new(filename, FileOperation::Upload, &e))
            }
        }
    }
}

/// Directory form of a store prefix: empty, or ending in `/`
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}
