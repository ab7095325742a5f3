//! Storage layer for the shard feeder.
//!
//! Provides RocksDB-backed storage with:
//! - A dedicated column family for per-shard checkpoints
//! - Zero-padded shard keys so iteration follows shard order
//! - Synced writes, so a stored checkpoint survives a process crash

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::ShardKey;
