//! protego-scraper - scheduled ingestion service
//!
//! Fetches drug labels and clinical trial studies on a schedule (daily at
//! 02:00 UTC by default) and stores each entity once in the shared database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use protego_common::config::{LogFormat, LoggingConfig, ProtegoConfig};
use protego_common::db::{SqliteStore, Store};
use protego_common::events::EventBus;
use protego_common::schedule::Schedule;
use protego_common::scheduler::{RunOutcome, Scheduler};
use protego_scraper::{IngestionGate, IngestionJob, Source, SourceAdapter};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for protego-scraper
#[derive(Parser, Debug)]
#[command(name = "protego-scraper")]
#[command(about = "Scheduled ingestion of public medical sources")]
#[command(version)]
struct Args {
    /// Configuration file (overrides PROTEGO_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configuration file)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Run one ingestion pass and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) = ProtegoConfig::resolve_and_load(args.config.clone())
        .context("Failed to load configuration")?;
    if let Some(path) = args.database {
        config.database.path = path;
    }

    init_tracing(&config.logging);
    config_source.log();

    info!(
        "Starting protego-scraper v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database: {}", config.database.path.display());

    if !config.scraper.enabled {
        info!("Scraper disabled in configuration, exiting");
        return Ok(());
    }

    let store = Arc::new(
        SqliteStore::open(&config.database)
            .await
            .context("Failed to open database")?,
    );
    let events = EventBus::default();

    let adapters: Vec<Arc<dyn SourceAdapter>> =
        Source::from_config(&config.scraper, &config.network)?
            .into_iter()
            .map(|source| Arc::new(source) as Arc<dyn SourceAdapter>)
            .collect();
    if adapters.is_empty() {
        warn!("No sources enabled; runs will do nothing");
    }
    for adapter in &adapters {
        info!(source = adapter.name(), source_type = %adapter.source_type(), "Source enabled");
    }

    let gate = Arc::new(IngestionGate::new(store.clone(), events.clone()));
    let job = Arc::new(IngestionJob::new(adapters, gate));
    let schedule = Schedule::from_config(&config.scraper.schedule)?;
    let scheduler = Arc::new(
        Scheduler::new(job, schedule, events).with_run_on_start(config.scraper.run_on_start),
    );

    if args.once {
        let outcome = scheduler.run_now().await;
        store.close().await;
        return match outcome {
            Ok(RunOutcome::Completed(report)) => {
                let totals = report.totals();
                info!(
                    inserted = totals.inserted,
                    skipped = totals.skipped,
                    failed = totals.failed,
                    "Ingestion pass complete"
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Ok(RunOutcome::Failed(reason)) => bail!("Ingestion pass failed: {}", reason),
            Err(reason) => bail!("Ingestion pass rejected: {}", reason),
        };
    }

    info!(schedule = %scheduler.schedule(), "Ingestion scheduled");
    let timer = scheduler.start();

    shutdown_signal().await;
    info!("Shutting down");
    scheduler.shutdown();
    if let Err(e) = timer.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    if tokio::time::timeout(Duration::from_secs(30), scheduler.wait_idle())
        .await
        .is_err()
    {
        warn!("In-flight ingestion did not stop within 30s");
    }
    info!(records = store.count_scraped_records().await.unwrap_or(0), "Shutdown complete");
    store.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
