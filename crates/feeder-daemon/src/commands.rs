//! Command implementations for the shard feeder.
//!
//! Handles:
//! - run: Load config, open the checkpoint store, sync every shard once
//! - checkpoints: Print the stored per-shard watermarks

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use feeder_indexing::{
    CheckpointStore, HttpIndexSink, IndexClient, MySqlCredentials, MySqlShardDirectory,
    MySqlShardSource, Orchestrator, ProgressReporter, ProgressSink, RunSummary, RunState,
    ShardDirectory, StdoutProgressSink, SyncConfig, SyncError,
};
use feeder_types::Settings;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    checkpoint_path: Option<&str>,
    batch_size: Option<usize>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = log_level {
        settings.log_level = log_level.to_string();
    }
    if let Some(path) = checkpoint_path {
        settings.checkpoint_path = path.to_string();
    }
    if let Some(size) = batch_size {
        settings.batch_size = size;
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_checkpoints(settings: &Settings) -> Result<CheckpointStore> {
    let path = settings.expanded_checkpoint_path();
    info!("Opening checkpoint store at {:?}", path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create checkpoint directory")?;
    }

    CheckpointStore::open(&path).context("Failed to open checkpoint store")
}

/// Run the orchestrator over `directory` with a progress reporter alongside.
///
/// The reporter is stopped, after one final line, whether or not the run
/// succeeded. Returns the run result and the progress sink.
pub async fn sync_all<S>(
    orchestrator: &Orchestrator,
    directory: &dyn ShardDirectory,
    progress_interval: Duration,
    progress: S,
) -> (Result<RunSummary, SyncError>, Option<S>)
where
    S: ProgressSink + Send + 'static,
{
    let done = CancellationToken::new();
    let reporter = ProgressReporter::new(orchestrator.state().clone(), progress_interval)
        .spawn(progress, done.clone());

    let started = Instant::now();
    let result = orchestrator.run_from_directory(directory).await;
    let elapsed = started.elapsed();

    done.cancel();
    let progress = match reporter.await {
        Ok(sink) => Some(sink),
        Err(e) => {
            warn!(error = %e, "Progress reporter task failed");
            None
        }
    };

    info!("total time: {:.3}s", elapsed.as_secs_f64());
    (result, progress)
}

/// Sync every shard once.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open the checkpoint store
/// 3. Build the shard directory, shard source and index client
/// 4. Run all shards with the progress reporter, then exit
pub async fn run_feeder(
    config_path: Option<&str>,
    log_level: Option<&str>,
    checkpoint_path: Option<&str>,
    batch_size: Option<usize>,
) -> Result<RunSummary> {
    let settings = load_settings(config_path, log_level, checkpoint_path, batch_size)?;
    init_logging(&settings.log_level)?;

    info!("Shard feeder starting...");
    info!("Configuration:");
    info!("  Checkpoint path: {}", settings.checkpoint_path);
    info!("  Indexer URL: {}", settings.indexer_url);
    info!(
        "  Master: {}@{}:{}/{}",
        settings.master.user, settings.master.host, settings.master.port, settings.master.database
    );
    info!("  Batch size: {}", settings.batch_size);

    let checkpoints = open_checkpoints(&settings)?;
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    let state = Arc::new(RunState::new());
    let sink = HttpIndexSink::new(settings.indexer_url.as_str(), timeout)
        .context("Failed to create index client")?;
    let client = IndexClient::new(Arc::new(sink), state.clone());

    let directory = MySqlShardDirectory::from_settings(&settings.master, timeout);
    let source = MySqlShardSource::new(
        MySqlCredentials::new(settings.master.user.as_str(), settings.master.password.as_str()),
        timeout,
    );

    let orchestrator = Orchestrator::new(checkpoints.clone(), Arc::new(source), client, state)
        .with_config(SyncConfig::default().with_batch_size(settings.batch_size));

    let (result, _) = sync_all(
        &orchestrator,
        &directory,
        Duration::from_millis(settings.progress_interval_ms),
        StdoutProgressSink,
    )
    .await;

    let summary = result.context("Sync run aborted")?;
    checkpoints.flush().context("Failed to flush checkpoint store")?;

    if summary.failed > 0 {
        warn!(failed = summary.failed, "Some shards failed and will be retried next run");
    }
    Ok(summary)
}

/// Print stored checkpoints, one line per shard.
pub fn show_checkpoints(config_path: Option<&str>, checkpoint_path: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, None, checkpoint_path, None)?;
    let checkpoints = open_checkpoints(&settings)?;

    let list = checkpoints.list().context("Failed to read checkpoints")?;
    if list.is_empty() {
        println!("No checkpoints stored");
        return Ok(());
    }

    for checkpoint in &list {
        println!(
            "shard {}: watermark {}, last run {} records, total {} records, last synced {}",
            checkpoint.shard_id,
            checkpoint.watermark,
            checkpoint.last_run_count,
            checkpoint.indexed_count,
            checkpoint.last_synced_time.to_rfc3339()
        );
    }

    let stats = checkpoints.stats().context("Failed to read storage stats")?;
    println!(
        "{} checkpoints, {} bytes on disk",
        stats.checkpoint_count, stats.disk_usage_bytes
    );
    Ok(())
}
