//! RocksDB wrapper for checkpoint storage.
//!
//! Provides:
//! - Database open with column family setup (created if missing)
//! - Synced single-key checkpoint writes
//! - Single-key and full-scan checkpoint reads

use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::path::Path;
use tracing::{debug, info};

use crate::column_families::{build_cf_descriptors, CF_CHECKPOINTS};
use crate::error::StorageError;
use crate::keys::ShardKey;

/// Durable storage for feeder checkpoints
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn checkpoints_cf(&self) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_CHECKPOINTS)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_CHECKPOINTS.to_string()))
    }

    /// Store a shard checkpoint.
    ///
    /// The write is synced to the WAL before returning.
    pub fn put_checkpoint(
        &self,
        key: ShardKey,
        checkpoint_bytes: &[u8],
    ) -> Result<(), StorageError> {
        let cf = self.checkpoints_cf()?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);

        self.db
            .put_cf_opt(cf, key.to_bytes(), checkpoint_bytes, &write_opts)?;
        debug!(shard_id = key.shard_id, "Stored checkpoint");
        Ok(())
    }

    /// Get a shard checkpoint
    pub fn get_checkpoint(&self, key: ShardKey) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.checkpoints_cf()?;
        let result = self.db.get_cf(cf, key.to_bytes())?;
        Ok(result)
    }

    /// All stored checkpoints, ordered by shard id.
    pub fn list_checkpoints(&self) -> Result<Vec<(ShardKey, Vec<u8>)>, StorageError> {
        let cf = self.checkpoints_cf()?;
        let prefix = ShardKey::prefix();

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            results.push((ShardKey::from_bytes(&key)?, value.to_vec()));
        }

        Ok(results)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        self.db.flush_cf(self.checkpoints_cf()?)?;
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let cf = self.checkpoints_cf()?;

        let mut checkpoint_count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            checkpoint_count += 1;
        }

        Ok(StorageStats {
            checkpoint_count,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }

        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of shards with a stored checkpoint
    pub checkpoint_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
