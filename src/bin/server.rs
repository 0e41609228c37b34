//! Mirrorcast server
//!
//! Run with: mirrorcast-server
//!
//! Serves the live-update WebSocket, the store webhook and the sync trigger,
//! and optionally runs the sync on a schedule.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mirrorcast::config::{SourceArgs, StoreArgs, DEFAULT_BUCKET};
use mirrorcast::ingest::TriggerContext;
use mirrorcast::realtime::{Broadcaster, RealtimeServer, ServerState};
use mirrorcast::remote::HttpRemoteSource;
use mirrorcast::storage;
use mirrorcast::sync::{SyncEngine, SyncWorker};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "mirrorcast-server")]
#[command(about = "Live store notifications, webhook relay and sync trigger")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "MIRRORCAST_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Run the file sync every N seconds (0 = disabled)
    #[arg(long, env = "MIRRORCAST_SYNC_INTERVAL_SECS", default_value = "0")]
    sync_interval_secs: u64,

    /// Bucket the scheduled sync writes to
    #[arg(long, env = "MIRRORCAST_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// Messages buffered per WebSocket client
    #[arg(long, env = "MIRRORCAST_SUBSCRIBER_CAPACITY", default_value = "64")]
    subscriber_capacity: usize,

    /// How long a broadcast waits on a full client before dropping it (ms)
    #[arg(long, env = "MIRRORCAST_SEND_TIMEOUT_MS", default_value = "5000")]
    send_timeout_ms: u64,

    /// Log output format
    #[arg(long, env = "MIRRORCAST_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    source: SourceArgs,
}

fn init_tracing(format: LogFormat) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());

    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let source_config = args.source.to_config();
    let store = storage::connect(&args.store.to_config())
        .await
        .context("failed to configure object store")?;

    let client = HttpRemoteSource::build_client()?;
    let remote = HttpRemoteSource::new(client, &source_config)?;

    let engine = Arc::new(
        SyncEngine::new(store, Arc::new(remote)).with_options(args.source.sync_options()),
    );

    let broadcaster = Broadcaster::with_limits(
        args.subscriber_capacity,
        Duration::from_millis(args.send_timeout_ms),
    );

    let mut state = ServerState::new(broadcaster).with_trigger(Arc::new(TriggerContext::new(
        engine.clone(),
        &source_config,
    )));

    // Keep the worker alive for the lifetime of the server
    let _worker = if args.sync_interval_secs > 0 {
        let interval = Duration::from_secs(args.sync_interval_secs);
        tracing::info!(
            "Scheduled sync enabled (interval: {}s, bucket: {})",
            interval.as_secs(),
            args.bucket
        );
        let worker = SyncWorker::start(
            engine,
            args.bucket.clone(),
            source_config.store_prefix(),
            interval,
        );
        state = state.with_sync_status(worker.status_handle());
        Some(worker)
    } else {
        None
    };

    tracing::info!("Mirrorcast server starting...");
    RealtimeServer::new(state, args.bind)
        .start()
        .await
        .context("server error")?;

    Ok(())
}
