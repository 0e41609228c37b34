//! Store notification types
//!
//! Inbound webhook bodies follow the S3 event notification layout that
//! MinIO and AWS both emit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook body: `{"Records": [{"s3": {"bucket": {...}, "object": {...}}}]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreEventPayload {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

/// One record of a store event
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded object key
    pub key: String,
}

impl StoreEventPayload {
    /// One notification per record, in record order
    pub fn notifications(&self) -> Vec<Notification> {
        let received_at = Utc::now();
        self.records
            .iter()
            .map(|record| Notification {
                bucket: record.s3.bucket.name.clone(),
                object_key: decode_object_key(&record.s3.object.key),
                event_name: record.event_name.clone(),
                received_at,
            })
            .collect()
    }
}

/// A "new object" notification relayed to live clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub bucket: String,
    pub object_key: String,
    pub event_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(bucket: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_key: object_key.into(),
            event_name: None,
            received_at: Utc::now(),
        }
    }

    /// Text pushed to WebSocket clients
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "New file dropped: {} in bucket '{}'",
            self.object_key, self.bucket
        )
    }
}

/// Undo the form encoding S3 applies to keys in event records
fn decode_object_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => key.to_string(),
    }
}
