//! Mirrorcast CLI
//!
//! One-shot sync, trigger and report commands against the configured store.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mirrorcast::analysis::{run_report, ReportOptions};
use mirrorcast::config::{SourceArgs, StoreArgs, DEFAULT_BUCKET};
use mirrorcast::ingest::{run_trigger, TriggerContext, TriggerRequest};
use mirrorcast::remote::{HttpRemoteSource, RemoteSource};
use mirrorcast::storage;
use mirrorcast::sync::SyncEngine;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "mirrorcast")]
#[command(about = "Mirror a remote file listing into an object store")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the remote listing into the bucket and print the report
    Sync {
        #[arg(short, long, default_value = DEFAULT_BUCKET)]
        bucket: String,
        /// Store prefix (defaults to the listing path)
        #[arg(short, long)]
        prefix: Option<String>,
    },
    /// Prepare the bucket, pull population data, then sync
    Trigger {
        #[arg(short, long)]
        bucket: Option<String>,
    },
    /// Print the files the remote listing resolves to
    ListRemote,
    /// Print the analysis report over the staged data
    Report {
        #[arg(short, long, default_value = DEFAULT_BUCKET)]
        bucket: String,
        #[arg(long, default_value = "PRS30006032")]
        series_id: String,
        #[arg(long, default_value = "Q01")]
        period: String,
    },
}

fn init_tracing(format: LogFormat) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let source_config = cli.source.to_config();
    let client = HttpRemoteSource::build_client()?;
    let remote = Arc::new(HttpRemoteSource::new(client, &source_config)?);

    match cli.command {
        Commands::ListRemote => {
            let listing = remote
                .list_files()
                .await
                .with_context(|| format!("listing {}", remote.listing_url()))?;
            for entry in listing.entries() {
                println!("{}\t{}", entry.filename, entry.url);
            }
        }

        Commands::Sync { bucket, prefix } => {
            let store = storage::connect(&cli.store.to_config()).await?;
            let engine = SyncEngine::new(store, remote).with_options(cli.source.sync_options());
            let prefix = prefix.unwrap_or_else(|| source_config.store_prefix());

            let report = engine.sync(&bucket, &prefix).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                anyhow::bail!("{} files failed to sync", report.errors.len());
            }
        }

        Commands::Trigger { bucket } => {
            let store = storage::connect(&cli.store.to_config()).await?;
            let engine =
                Arc::new(SyncEngine::new(store, remote).with_options(cli.source.sync_options()));
            let ctx = TriggerContext::new(engine, &source_config);

            let response = run_trigger(
                &ctx,
                TriggerRequest {
                    bucket_name: bucket,
                },
            )
            .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_success() {
                anyhow::bail!("{}", response.body.message);
            }
        }

        Commands::Report {
            bucket,
            series_id,
            period,
        } => {
            let store = storage::connect(&cli.store.to_config()).await?;
            let options = ReportOptions {
                series_id,
                period,
                ..Default::default()
            };
            let report = run_report(store.as_ref(), &bucket, &options)
                .await
                .context("building report")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
