//! Error types for the sync engine.
//!
//! Errors are split by blast radius: [`ShardError`] aborts only the shard
//! being synced, [`SyncError`] aborts the whole run.

use feeder_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors local to one shard's sync pass.
///
/// The orchestrator counts and logs these, leaves the shard's checkpoint
/// untouched, and moves on to the next shard.
#[derive(Error, Debug)]
pub enum ShardError {
    /// Could not open (or cleanly use) the shard's database connection
    #[error("Shard connection error: {0}")]
    Connection(String),

    /// Change query or row iteration failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// Indexing request failed
    #[error("Index delivery error: {0}")]
    IndexDelivery(String),
}

impl ShardError {
    pub fn kind(&self) -> ShardErrorKind {
        match self {
            ShardError::Connection(_) => ShardErrorKind::Connection,
            ShardError::Stream(_) => ShardErrorKind::Stream,
            ShardError::IndexDelivery(_) => ShardErrorKind::IndexDelivery,
        }
    }
}

/// Classification of a shard-local failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardErrorKind {
    Connection,
    Stream,
    IndexDelivery,
}

impl std::fmt::Display for ShardErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardErrorKind::Connection => write!(f, "connection"),
            ShardErrorKind::Stream => write!(f, "stream"),
            ShardErrorKind::IndexDelivery => write!(f, "index_delivery"),
        }
    }
}

/// Errors that abort the whole run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Shard directory could not be enumerated
    #[error("Directory error: {0}")]
    Directory(String),

    /// Checkpoint store could not be opened, read or written
    #[error("Checkpoint store error: {0}")]
    CheckpointStore(#[from] StorageError),

    /// Index client could not be constructed
    #[error("Index client error: {0}")]
    IndexClient(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::CheckpointStore(StorageError::from(err))
    }
}
