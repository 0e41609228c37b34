//! Background sync worker
//!
//! Runs the sync engine on a fixed interval and on demand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::SyncEngine;
use crate::error::{MirrorError, Result};
use crate::types::SyncReport;

/// Commands for the sync worker
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a pass now
    SyncNow,
    /// Stop the worker
    Stop,
}

/// Snapshot of the worker's progress
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub runs: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<SyncReport>,
}

/// Background sync worker
pub struct SyncWorker {
    sender: mpsc::Sender<SyncCommand>,
    status: Arc<Mutex<SyncStatus>>,
}

impl SyncWorker {
    /// Start the worker; the first pass runs immediately
    pub fn start(engine: Arc<SyncEngine>, bucket: String, prefix: String, every: Duration) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SyncCommand>(16);
        let status = Arc::new(Mutex::new(SyncStatus::default()));
        let worker_status = status.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    cmd = receiver.recv() => {
                        match cmd {
                            Some(SyncCommand::SyncNow) => {
                                Self::do_sync(&engine, &bucket, &prefix, &worker_status).await;
                            }
                            Some(SyncCommand::Stop) | None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        Self::do_sync(&engine, &bucket, &prefix, &worker_status).await;
                    }
                }
            }

            tracing::info!("Sync worker stopped");
        });

        Self { sender, status }
    }

    async fn do_sync(
        engine: &SyncEngine,
        bucket: &str,
        prefix: &str,
        status: &Mutex<SyncStatus>,
    ) {
        status.lock().is_syncing = true;

        let result = engine.sync(bucket, prefix).await;

        let mut status = status.lock();
        status.is_syncing = false;
        status.runs += 1;
        match result {
            Ok(report) => {
                status.last_sync = Some(report.finished_at);
                status.last_error = None;
                status.last_report = Some(report);
            }
            Err(e) => {
                tracing::error!("Scheduled sync of s3://{}/{} failed: {}", bucket, prefix, e);
                status.last_error = Some(e.to_string());
            }
        }
    }

    /// Trigger a sync
    pub async fn sync_now(&self) -> Result<()> {
        self.send(SyncCommand::SyncNow).await
    }

    /// Stop the worker
    pub async fn stop(&self) -> Result<()> {
        self.send(SyncCommand::Stop).await
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().clone()
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.status.lock().last_report.clone()
    }

    /// Shared handle to the status, for readers that outlive `self`
    pub fn status_handle(&self) -> Arc<Mutex<SyncStatus>> {
        self.status.clone()
    }

    async fn send(&self, cmd: SyncCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| MirrorError::Sync("Worker channel closed".to_string()))
    }
}
