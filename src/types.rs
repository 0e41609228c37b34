//! Core types for Mirrorcast

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, MirrorError};

/// Filename -> fingerprint (hex digest or unquoted ETag)
pub type FileMap = BTreeMap<String, String>;

/// A file advertised by the remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    pub filename: String,
    pub url: String,
}

/// Result of parsing one listing document, keyed by filename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    entries: BTreeMap<String, String>,
}

impl RemoteListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A later href with the same filename wins.
    pub fn insert(&mut self, entry: RemoteFileEntry) {
        self.entries.insert(entry.filename, entry.url);
    }

    pub fn url(&self, filename: &str) -> Option<&str> {
        self.entries.get(filename).map(String::as_str)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = RemoteFileEntry> + '_ {
        self.entries.iter().map(|(filename, url)| RemoteFileEntry {
            filename: filename.clone(),
            url: url.clone(),
        })
    }
}

impl FromIterator<RemoteFileEntry> for RemoteListing {
    fn from_iter<I: IntoIterator<Item = RemoteFileEntry>>(iter: I) -> Self {
        let mut listing = RemoteListing::new();
        for entry in iter {
            listing.insert(entry);
        }
        listing
    }
}

/// Current store state for one key under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectEntry {
    /// Key relative to the listed prefix
    pub key: String,
    pub fingerprint: String,
}

/// Which step of a per-file transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Fetch,
    Upload,
    Delete,
}

/// A failure scoped to a single filename, collected during sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFileError {
    pub filename: String,
    pub operation: FileOperation,
    pub kind: ErrorKind,
    pub message: String,
}

impl PerFileError {
    pub fn new(filename: impl Into<String>, operation: FileOperation, err: &MirrorError) -> Self {
        Self {
            filename: filename.into(),
            operation,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub bucket: String,
    pub prefix: String,
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
    pub errors: Vec<PerFileError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    /// True when no per-file error was recorded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of store mutations performed
    pub fn changes(&self) -> usize {
        self.uploaded.len() + self.deleted.len()
    }
}
