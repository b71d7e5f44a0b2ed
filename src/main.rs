//! Tidewatch main entry point
//!
//! Command-line interface for the Tidewatch acquisition pipeline.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidewatch::adapter::build_http_client;
use tidewatch::classify::{Classifier, LlmClassifier, NeutralClassifier};
use tidewatch::config::{load_config_with_hash, Config};
use tidewatch::crawler::{CrawlSession, PageFetcher};
use tidewatch::detect::{ChangeDetector, IntegrityChecker};
use tidewatch::download::DownloadManager;
use tidewatch::limiter::RateLimiter;
use tidewatch::schedule::{run_incremental_dataset_task, TaskRunner};
use tidewatch::storage::{SourceType, SqliteStorage, Storage};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Tidewatch: incremental data acquisition and drift detection
///
/// Tidewatch discovers structured data sources on the configured domains,
/// downloads them resumably, and keeps verifying that the local copy still
/// matches the origin.
#[derive(Parser, Debug)]
#[command(name = "tidewatch")]
#[command(version)]
#[command(about = "Incremental data acquisition and drift detection", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover data sources starting from the configured seed URLs
    Crawl,

    /// Download or resume sources waiting for work
    Download {
        /// Resume a single source by id instead of the whole queue
        #[arg(long)]
        source: Option<i64>,
    },

    /// Compare fresh origin snapshots against stored data
    DetectChanges {
        /// Limit detection to a single source
        #[arg(long)]
        source: Option<i64>,
    },

    /// Verify stored data integrity against the origin
    Verify {
        /// Verify a single source and print its full report
        #[arg(long)]
        source: Option<i64>,
    },

    /// Run the periodic maintenance tasks until interrupted
    Schedule,

    /// Show per-source progress and recent activity
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let storage = Arc::new(Mutex::new(storage));
    let client = build_http_client()?;

    register_configured_sources(&config, &storage)?;

    match cli.command {
        Command::Crawl => handle_crawl(&config, &storage, client).await?,
        Command::Download { source } => {
            handle_download(&config, &storage, client, source).await?
        }
        Command::DetectChanges { source } => {
            handle_detect_changes(&storage, client, source).await?
        }
        Command::Verify { source } => handle_verify(&storage, client, source).await?,
        Command::Schedule => handle_schedule(&config, &storage, client).await,
        Command::Stats => handle_stats(&storage)?,
    }

    Ok(())
}

/// Watch channel flipped to `true` on Ctrl-C
///
/// Long-running loops check it cooperatively between iterations.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = stop_tx.send(true);
        }
    });
    stop_rx
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidewatch=info,warn"),
            1 => EnvFilter::new("tidewatch=debug,info"),
            2 => EnvFilter::new("tidewatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Registers the `[[source]]` entries from the config file
fn register_configured_sources(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
) -> anyhow::Result<()> {
    for entry in &config.sources {
        let source_type = SourceType::from_db_string(&entry.source_type)
            .ok_or_else(|| anyhow::anyhow!("Unknown source type: {}", entry.source_type))?;
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let parsed = url::Url::parse(&entry.url)?;
        let domain = tidewatch::extract_domain(&parsed).unwrap_or_default();

        let mut storage = storage.lock().unwrap();
        let source_id =
            storage.create_source(&entry.url, source_type, &domain, metadata.as_ref())?;
        tracing::debug!(source_id, url = %entry.url, "Configured source registered");
    }
    Ok(())
}

fn build_classifier(config: &Config) -> anyhow::Result<Arc<dyn Classifier>> {
    match &config.classifier {
        Some(classifier_config) => {
            tracing::info!(
                endpoint = %classifier_config.endpoint,
                model = %classifier_config.model,
                "Using LLM classifier"
            );
            Ok(Arc::new(LlmClassifier::new(classifier_config)?))
        }
        None => {
            tracing::info!("No classifier configured, using neutral verdicts");
            Ok(Arc::new(NeutralClassifier))
        }
    }
}

async fn handle_crawl(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
) -> anyhow::Result<()> {
    let classifier = build_classifier(config)?;
    let fetcher = PageFetcher::new(
        client,
        Duration::from_millis(config.crawl.request_delay_ms),
    );
    let mut session = CrawlSession::new(
        config.crawl.clone(),
        fetcher,
        classifier,
        Arc::clone(storage),
    )
    .with_stop_signal(shutdown_signal());

    let stats = session.run().await?;

    println!("Crawl finished:");
    println!("  Pages crawled:    {}", stats.total_crawled);
    println!("  Data sources:     {}", stats.relevant_found);
    println!("  API endpoints:    {}", stats.api_endpoints);
    println!("  Registries:       {}", stats.registries);
    println!("  Data files:       {}", stats.data_files);
    println!("  RSS feeds:        {}", stats.rss_feeds);
    println!("  Errors:           {}", stats.errors);
    Ok(())
}

fn build_manager(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
) -> Arc<DownloadManager> {
    let limiter = Arc::new(RateLimiter::new(config.limits.requests_per_minute));
    Arc::new(
        DownloadManager::new(
            Arc::clone(storage),
            client,
            limiter,
            config.download.clone(),
            config.limits.worker_pool_size,
        )
        .with_stop_signal(shutdown_signal()),
    )
}

async fn handle_download(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
    source: Option<i64>,
) -> anyhow::Result<()> {
    let manager = build_manager(config, storage, client);

    match source {
        Some(source_id) => {
            let total = manager.resume_download(source_id).await?;
            println!("Source {}: {} records stored", source_id, total);
        }
        None => {
            let summary = manager.download_all_pending().await?;
            println!(
                "Downloads finished: {} succeeded, {} failed",
                summary.succeeded, summary.failed
            );
        }
    }
    Ok(())
}

async fn handle_detect_changes(
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
    source: Option<i64>,
) -> anyhow::Result<()> {
    let detector = ChangeDetector::new(Arc::clone(storage), client);

    match source {
        Some(source_id) => {
            let events = detector.detect_changes(source_id).await?;
            println!("Source {}: {} changes detected", source_id, events.len());
        }
        None => {
            let all_changes = detector.detect_changes_all_sources().await?;
            let total: usize = all_changes.values().map(Vec::len).sum();
            println!(
                "{} changes detected across {} sources",
                total,
                all_changes.len()
            );
        }
    }
    Ok(())
}

async fn handle_verify(
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
    source: Option<i64>,
) -> anyhow::Result<()> {
    let checker = IntegrityChecker::new(Arc::clone(storage), client);

    match source {
        Some(source_id) => {
            let report = checker.verify_source(source_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            let summaries = checker.verify_all_sources().await?;
            println!("Verification results:");
            for summary in &summaries {
                println!(
                    "  [{}] {:.1}%  {} (missing: {}, mismatched: {}, extra: {})",
                    summary.status,
                    summary.integrity_score * 100.0,
                    summary.source_url,
                    summary.missing_count,
                    summary.mismatched_count,
                    summary.extra_count,
                );
            }
        }
    }
    Ok(())
}

async fn handle_schedule(
    config: &Config,
    storage: &Arc<Mutex<SqliteStorage>>,
    client: reqwest::Client,
) {
    let schedule = &config.schedule;
    let mut runner = TaskRunner::new(Duration::from_secs(schedule.tick_secs));

    let detector = Arc::new(ChangeDetector::new(Arc::clone(storage), client.clone()));
    runner.register(
        "change_detection",
        Duration::from_secs(schedule.change_detection_interval_hours * 3600),
        move || {
            let detector = Arc::clone(&detector);
            async move { detector.detect_changes_all_sources().await.map(|_| ()) }
        },
    );

    let checker = Arc::new(IntegrityChecker::new(Arc::clone(storage), client));
    runner.register(
        "integrity_verification",
        Duration::from_secs(schedule.verification_interval_hours * 3600),
        move || {
            let checker = Arc::clone(&checker);
            async move { checker.verify_all_sources().await.map(|_| ()) }
        },
    );

    let dataset_storage = Arc::clone(storage);
    let min_new_samples = schedule.min_new_samples as u64;
    runner.register(
        "incremental_dataset",
        Duration::from_secs(schedule.incremental_dataset_interval_hours * 3600),
        move || {
            let storage = Arc::clone(&dataset_storage);
            async move { run_incremental_dataset_task(&storage, min_new_samples).map(|_| ()) }
        },
    );

    runner.run(shutdown_signal()).await;
}

fn handle_stats(storage: &Arc<Mutex<SqliteStorage>>) -> anyhow::Result<()> {
    let storage = storage.lock().unwrap();
    let sources = storage.get_active_sources()?;

    println!("Sources ({}):", sources.len());
    for source in &sources {
        let stored = storage.count_records(source.id)?;
        let total = source
            .total_records
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  [{}] {} ({}) {}/{} records",
            source.status, source.url, source.source_type, stored, total
        );
    }

    let since = chrono::Utc::now() - chrono::Duration::hours(24);
    let recent = storage.get_changes_since(None, since)?;
    println!("\nChanges in the last 24h: {}", recent.len());

    match storage.latest_dataset_version()? {
        Some(version) => println!(
            "Latest dataset version: {} ({} samples, created {})",
            version.name, version.sample_count, version.created_at
        ),
        None => println!("No dataset versions recorded yet"),
    }

    Ok(())
}
