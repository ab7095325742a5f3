//! Run-wide counters shared with the progress reporter.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use feeder_types::ShardId;

/// Counters for one run.
///
/// Written by the orchestrator's shard sequence, read (and the interval
/// counter reset) by the progress reporter. Plain atomics are enough: no
/// reader needs a consistent view across counters.
#[derive(Debug, Default)]
pub struct RunState {
    indexed_since_report: AtomicU64,
    indexed_total: AtomicU64,
    current_shard: AtomicU32,
    failed_shards: AtomicU32,
}

/// Point-in-time view of [`RunState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSnapshot {
    pub current_shard: ShardId,
    pub failed_shards: u32,
    pub indexed_total: u64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count records accepted by the indexer.
    pub fn record_indexed(&self, count: u64) {
        self.indexed_since_report.fetch_add(count, Ordering::Relaxed);
        self.indexed_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_current_shard(&self, shard_id: ShardId) {
        self.current_shard.store(shard_id, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_shards.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the per-interval counter.
    pub fn take_indexed_since_report(&self) -> u64 {
        self.indexed_since_report.swap(0, Ordering::Relaxed)
    }

    pub fn failed_shards(&self) -> u32 {
        self.failed_shards.load(Ordering::Relaxed)
    }

    pub fn indexed_total(&self) -> u64 {
        self.indexed_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            current_shard: self.current_shard.load(Ordering::Relaxed),
            failed_shards: self.failed_shards(),
            indexed_total: self.indexed_total(),
        }
    }
}
