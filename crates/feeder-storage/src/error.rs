//! Checkpoint storage errors.

use thiserror::Error;

/// Failures of the checkpoint database.
///
/// Every variant is fatal to a sync run: without a trustworthy checkpoint
/// store the feeder cannot know where each shard should resume.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Database was opened without the checkpoints column family
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Stored key is not a `shard:<id>` key
    #[error("Invalid shard key: {0}")]
    Key(String),

    /// Stored checkpoint record could not be encoded or decoded
    #[error("Checkpoint encoding error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
