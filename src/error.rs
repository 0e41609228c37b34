//! Error types for Mirrorcast

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Mirrorcast operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Main error type for Mirrorcast
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Fetch failed for {url}{}: {message}", fmt_status(.status))]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Object store authentication error: {0}")]
    StoreAuth(String),

    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Coarse error category, kept after the error itself is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    StoreAuth,
    StoreUnavailable,
    NotFound,
    Other,
}

impl MirrorError {
    /// Build a fetch error from a reqwest failure
    pub fn fetch(url: impl Into<String>, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else {
            err.to_string()
        };
        MirrorError::Fetch {
            url: url.into(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// Build a fetch error for a non-success HTTP status
    pub fn fetch_status(url: impl Into<String>, status: u16) -> Self {
        MirrorError::Fetch {
            url: url.into(),
            status: Some(status),
            message: "unexpected response status".to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::Fetch { .. } => ErrorKind::Fetch,
            MirrorError::StoreAuth(_) => ErrorKind::StoreAuth,
            MirrorError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            MirrorError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MirrorError::Fetch { .. } | MirrorError::StoreUnavailable(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MirrorError::NotFound { .. })
    }
}
