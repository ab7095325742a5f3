//! Per-shard checkpoint tracking.
//!
//! A checkpoint records the watermark of the last fully delivered pass over a
//! shard. It is read once when a shard starts and written once when the shard
//! finishes without error.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use feeder_storage::{ShardKey, Storage, StorageStats};
use feeder_types::{ShardId, Watermark};

use crate::error::SyncError;

/// Checkpoint for one shard.
///
/// Persisted to storage so the next run resumes from `watermark`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCheckpoint {
    pub shard_id: ShardId,

    /// Latest source modification time fully delivered (ISO-8601)
    pub watermark: Watermark,

    /// When the last successful pass finished (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_synced_time: DateTime<Utc>,

    /// Records delivered by the last successful pass
    pub last_run_count: u64,

    /// Records delivered since checkpoint creation
    pub indexed_count: u64,

    /// When this checkpoint was first created (milliseconds since epoch)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ShardCheckpoint {
    /// Create a checkpoint at the epoch sentinel
    pub fn new(shard_id: ShardId) -> Self {
        let now = Utc::now();
        Self {
            shard_id,
            watermark: Watermark::epoch(),
            last_synced_time: now,
            last_run_count: 0,
            indexed_count: 0,
            created_at: now,
        }
    }

    /// Record a successful pass.
    ///
    /// The watermark never moves backwards; a lower value is ignored.
    pub fn advance(&mut self, watermark: Watermark, records: u64) {
        if watermark < self.watermark {
            warn!(
                shard_id = self.shard_id,
                stored = %self.watermark,
                proposed = %watermark,
                "Refusing to move watermark backwards"
            );
        } else {
            self.watermark = watermark;
        }
        self.last_synced_time = Utc::now();
        self.last_run_count = records;
        self.indexed_count += records;
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec(self).map_err(SyncError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(bytes).map_err(SyncError::from)
    }
}

/// Durable shard id -> watermark mapping.
///
/// Only the orchestrator's single shard sequence touches the store, so no
/// locking is layered on top of RocksDB. Every error is fatal to the run.
#[derive(Clone)]
pub struct CheckpointStore {
    storage: Arc<Storage>,
}

impl CheckpointStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Open (creating if absent) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let storage = Storage::open(path)?;
        Ok(Self::new(Arc::new(storage)))
    }

    /// Watermark to resume from, or the epoch sentinel if the shard was never synced.
    pub fn get(&self, shard_id: ShardId) -> Result<Watermark, SyncError> {
        Ok(self
            .get_checkpoint(shard_id)?
            .map(|checkpoint| checkpoint.watermark)
            .unwrap_or_else(Watermark::epoch))
    }

    /// Upsert a shard's watermark. Durable when this returns.
    pub fn set(
        &self,
        shard_id: ShardId,
        watermark: Watermark,
    ) -> Result<ShardCheckpoint, SyncError> {
        self.commit(shard_id, watermark, 0)
    }

    /// Record a successful pass that delivered `records` records.
    pub fn commit(
        &self,
        shard_id: ShardId,
        watermark: Watermark,
        records: u64,
    ) -> Result<ShardCheckpoint, SyncError> {
        let mut checkpoint = self
            .get_checkpoint(shard_id)?
            .unwrap_or_else(|| ShardCheckpoint::new(shard_id));
        checkpoint.advance(watermark, records);

        self.storage
            .put_checkpoint(ShardKey::new(shard_id), &checkpoint.to_bytes()?)?;
        debug!(
            shard_id = shard_id,
            watermark = %checkpoint.watermark,
            "Saved checkpoint"
        );
        Ok(checkpoint)
    }

    /// Full checkpoint record for a shard, if one exists.
    pub fn get_checkpoint(&self, shard_id: ShardId) -> Result<Option<ShardCheckpoint>, SyncError> {
        match self.storage.get_checkpoint(ShardKey::new(shard_id))? {
            Some(bytes) => Ok(Some(ShardCheckpoint::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All checkpoints, ascending by shard id.
    pub fn list(&self) -> Result<Vec<ShardCheckpoint>, SyncError> {
        self.storage
            .list_checkpoints()?
            .into_iter()
            .map(|(_, bytes)| ShardCheckpoint::from_bytes(&bytes))
            .collect()
    }

    /// Flush buffered writes to disk.
    pub fn flush(&self) -> Result<(), SyncError> {
        self.storage.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StorageStats, SyncError> {
        Ok(self.storage.get_stats()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn wm(value: &str) -> Watermark {
        Watermark::parse(value).unwrap()
    }

    fn create_test_store() -> (CheckpointStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_checkpoint_new() {
        let checkpoint = ShardCheckpoint::new(7);
        assert_eq!(checkpoint.shard_id, 7);
        assert!(checkpoint.watermark.is_epoch());
        assert_eq!(checkpoint.indexed_count, 0);
    }

    #[test]
    fn test_checkpoint_advance() {
        let mut checkpoint = ShardCheckpoint::new(1);

        checkpoint.advance(wm("2024-01-01T00:00:00.000Z"), 10);
        assert_eq!(checkpoint.watermark, wm("2024-01-01T00:00:00.000Z"));
        assert_eq!(checkpoint.last_run_count, 10);
        assert_eq!(checkpoint.indexed_count, 10);

        checkpoint.advance(wm("2024-02-01T00:00:00.000Z"), 5);
        assert_eq!(checkpoint.last_run_count, 5);
        assert_eq!(checkpoint.indexed_count, 15);
    }

    #[test]
    fn test_checkpoint_never_regresses() {
        let mut checkpoint = ShardCheckpoint::new(1);
        checkpoint.advance(wm("2024-02-01T00:00:00.000Z"), 1);
        checkpoint.advance(wm("2023-01-01T00:00:00.000Z"), 1);
        assert_eq!(checkpoint.watermark, wm("2024-02-01T00:00:00.000Z"));
    }

    #[test]
    fn test_checkpoint_json_format() {
        let mut checkpoint = ShardCheckpoint::new(3);
        checkpoint.advance(wm("2024-03-01T12:30:45.123Z"), 2);
        let json_str = String::from_utf8(checkpoint.to_bytes().unwrap()).unwrap();

        assert!(json_str.contains("\"shard_id\":3"));
        assert!(json_str.contains("\"watermark\":\"2024-03-01T12:30:45.123Z\""));
        assert!(json_str.contains("\"last_synced_time\":"));

        let decoded = ShardCheckpoint::from_bytes(json_str.as_bytes()).unwrap();
        assert_eq!(decoded.watermark, checkpoint.watermark);
        assert_eq!(decoded.indexed_count, 2);
    }

    #[test]
    fn test_store_get_missing_is_epoch() {
        let (store, _temp) = create_test_store();
        assert_eq!(store.get(42).unwrap(), Watermark::epoch());
        assert!(store.get_checkpoint(42).unwrap().is_none());
    }

    #[test]
    fn test_store_set_then_get() {
        let (store, _temp) = create_test_store();
        store.set(1, wm("2024-05-05T05:05:05.555Z")).unwrap();
        assert_eq!(store.get(1).unwrap(), wm("2024-05-05T05:05:05.555Z"));
        // Other shards are unaffected
        assert_eq!(store.get(2).unwrap(), Watermark::epoch());
    }

    #[test]
    fn test_store_commit_accumulates() {
        let (store, _temp) = create_test_store();
        store.commit(1, wm("2024-01-01T00:00:00.000Z"), 3).unwrap();
        let checkpoint = store.commit(1, wm("2024-01-02T00:00:00.000Z"), 4).unwrap();

        assert_eq!(checkpoint.indexed_count, 7);
        assert_eq!(checkpoint.last_run_count, 4);

        // Stored timestamps are millisecond precision, so compare the payload
        let stored = store.get_checkpoint(1).unwrap().unwrap();
        assert_eq!(stored.watermark, checkpoint.watermark);
        assert_eq!(stored.indexed_count, 7);
        assert_eq!(
            stored.created_at.timestamp_millis(),
            checkpoint.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CheckpointStore::open(temp_dir.path()).unwrap();
            store.set(9, wm("2024-06-01T00:00:00.000Z")).unwrap();
        }
        let store = CheckpointStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get(9).unwrap(), wm("2024-06-01T00:00:00.000Z"));
    }

    #[test]
    fn test_store_list() {
        let (store, _temp) = create_test_store();
        store.set(20, wm("2024-01-01T00:00:00.000Z")).unwrap();
        store.set(4, wm("2024-01-01T00:00:00.000Z")).unwrap();
        store.flush().unwrap();

        let ids: Vec<ShardId> = store.list().unwrap().iter().map(|c| c.shard_id).collect();
        assert_eq!(ids, vec![4, 20]);
        assert_eq!(store.stats().unwrap().checkpoint_count, 2);
    }
}
