//! Object-store synchronization
//!
//! Mirrors a remote file listing into a bucket prefix: uploads new and
//! changed files (content fingerprinted), deletes files gone upstream, and
//! reports per-file failures without aborting the pass.

mod engine;
pub mod fingerprint;
pub mod plan;
mod worker;

pub use engine::{normalize_prefix, SyncEngine};
pub use fingerprint::fingerprint;
pub use plan::SyncPlan;
pub use worker::{SyncCommand, SyncStatus, SyncWorker};
