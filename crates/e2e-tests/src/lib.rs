//! End-to-end test infrastructure for the shard feeder.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the full shard-to-indexer sync.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use feeder_indexing::mock::{MemoryShard, MemoryShardSource};
use feeder_indexing::{
    ChangeRow, CheckpointStore, IndexClient, IndexSink, Orchestrator, RunState, ShardSource,
    SyncConfig,
};
use feeder_types::Watermark;

/// Shared test harness for E2E tests.
///
/// Owns a checkpoint store in a temp directory that outlives any number of
/// orchestrator runs, so tests can run the feeder repeatedly against it.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Path of the RocksDB checkpoint directory
    pub checkpoint_path: PathBuf,
    /// Shared checkpoint store
    pub checkpoints: CheckpointStore,
}

impl TestHarness {
    /// Create a new test harness with temp directory and checkpoint store.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let checkpoint_path = temp_dir.path().join("checkpoints");
        let checkpoints =
            CheckpointStore::open(&checkpoint_path).expect("Failed to open checkpoint store");

        Self {
            _temp_dir: temp_dir,
            checkpoint_path,
            checkpoints,
        }
    }

    /// Build an orchestrator for one run, with fresh run counters.
    pub fn orchestrator(
        &self,
        source: Arc<dyn ShardSource>,
        sink: Arc<dyn IndexSink>,
        batch_size: usize,
    ) -> Orchestrator {
        let state = Arc::new(RunState::new());
        let client = IndexClient::new(sink, state.clone());
        Orchestrator::new(self.checkpoints.clone(), source, client, state)
            .with_config(SyncConfig::default().with_batch_size(batch_size))
    }

    /// Stored watermark for a shard (epoch if never synced).
    pub fn watermark(&self, shard_id: u32) -> Watermark {
        self.checkpoints
            .get(shard_id)
            .expect("Failed to read checkpoint")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory source holding a single shard.
pub fn single_shard(shard_id: u32, shard: MemoryShard) -> Arc<MemoryShardSource> {
    Arc::new(MemoryShardSource::new().with_shard(shard_id, shard))
}

/// Timestamp `offset_secs` seconds after 2024-01-01T00:00:00Z.
pub fn ts(offset_secs: i64) -> Watermark {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base timestamp");
    Watermark::from_datetime(base + Duration::seconds(offset_secs))
}

/// Create N change rows one second apart, starting at `ts(first_offset)`.
///
/// Titles are `"{prefix} {i}"`; every third row carries a DOI and every
/// fifth an ISBN.
pub fn change_rows(prefix: &str, first_offset: i64, count: usize) -> Vec<ChangeRow> {
    (0..count)
        .map(|i| {
            let mut row = ChangeRow::new(
                format!("{prefix} {i}"),
                format!("Author{i}"),
                ts(first_offset + i as i64),
            );
            if i % 3 == 0 {
                row = row.with_doi(format!("10.1000/{prefix}.{i}"));
            }
            if i % 5 == 0 {
                row = row.with_isbn(format!("978-{i:04}"));
            }
            row
        })
        .collect()
}
