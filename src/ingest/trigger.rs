//! Sync trigger: population pull followed by the file sync
//!
//! The two steps are independent failure domains and report separately.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::population::pull_population;
use crate::config::{SourceConfig, DEFAULT_BUCKET, POPULATION_PREFIX};
use crate::sync::SyncEngine;
use crate::types::SyncReport;

/// Trigger input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(rename = "bucketName", alias = "bucket-name", default)]
    pub bucket_name: Option<String>,
}

/// Trigger output, shaped like a function-invocation response
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: TriggerBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
}

impl TriggerResponse {
    fn ok(report: SyncReport) -> Self {
        Self {
            status_code: 200,
            body: TriggerBody {
                message: "Sync completed.".to_string(),
                report: Some(report),
            },
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status_code: 500,
            body: TriggerBody {
                message,
                report: None,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Everything a trigger run needs
pub struct TriggerContext {
    pub engine: Arc<SyncEngine>,
    pub population_url: String,
    pub population_prefix: String,
    /// Store prefix the listing is mirrored into
    pub sync_prefix: String,
}

impl TriggerContext {
    pub fn new(engine: Arc<SyncEngine>, source: &SourceConfig) -> Self {
        Self {
            engine,
            population_url: source.population_url.clone(),
            population_prefix: POPULATION_PREFIX.to_string(),
            sync_prefix: source.store_prefix(),
        }
    }
}

/// Ensure the bucket, pull population data, then sync the listing
pub async fn run_trigger(ctx: &TriggerContext, request: TriggerRequest) -> TriggerResponse {
    let bucket = request
        .bucket_name
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
    let store = ctx.engine.store();

    if let Err(e) = store.create_bucket_if_absent(&bucket).await {
        tracing::error!("Bucket preparation failed: {}", e);
        return TriggerResponse::failed(format!("Error preparing bucket: {}", e));
    }

    if let Err(e) = pull_population(
        ctx.engine.remote().as_ref(),
        store.as_ref(),
        &bucket,
        &ctx.population_prefix,
        &ctx.population_url,
    )
    .await
    {
        tracing::error!("Population pull failed: {}", e);
        return TriggerResponse::failed(format!("Error pulling population data: {}", e));
    }

    match ctx.engine.sync(&bucket, &ctx.sync_prefix).await {
        Ok(report) => {
            if !report.is_clean() {
                tracing::warn!(
                    "Sync completed with {} per-file errors",
                    report.errors.len()
                );
            }
            TriggerResponse::ok(report)
        }
        Err(e) => {
            tracing::error!("File sync failed: {}", e);
            TriggerResponse::failed(format!("Error syncing time-series files: {}", e))
        }
    }
}
