//! Column family definitions for RocksDB.
//!
//! - checkpoints: per-shard sync watermarks (default compaction)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for per-shard checkpoints
pub const CF_CHECKPOINTS: &str = "checkpoints";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_CHECKPOINTS];

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![ColumnFamilyDescriptor::new(
        CF_CHECKPOINTS,
        Options::default(),
    )]
}
