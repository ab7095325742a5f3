//! In-memory shard directory, shard source and index sink for testing.
//!
//! Lets the orchestrator run end to end without MySQL or an indexer, with
//! switches for the failure modes the sync engine has to isolate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use feeder_types::{IndexRecord, ShardDescriptor, ShardId, Watermark};

use crate::client::IndexSink;
use crate::error::{ShardError, SyncError};
use crate::source::{ChangeRow, ShardConnection, ShardDirectory, ShardSource};

/// Contents and failure switches for one in-memory shard.
#[derive(Debug, Clone, Default)]
pub struct MemoryShard {
    pub rows: Vec<ChangeRow>,
    /// Refuse the connection
    pub fail_connect: bool,
    /// Yield a stream error after this many rows
    pub fail_after: Option<usize>,
    /// Report an error when the connection is closed
    pub fail_close: bool,
}

impl MemoryShard {
    pub fn with_rows(rows: Vec<ChangeRow>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    pub fn failing_after(rows: Vec<ChangeRow>, count: usize) -> Self {
        Self {
            rows,
            fail_after: Some(count),
            ..Default::default()
        }
    }
}

/// Shard source backed by [`MemoryShard`]s.
///
/// Counts connections opened and closed, and rows handed to consumers, so
/// tests can check the connection lifecycle and row intake.
#[derive(Default)]
pub struct MemoryShardSource {
    shards: BTreeMap<ShardId, MemoryShard>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    rows_pulled: Arc<AtomicUsize>,
}

impl MemoryShardSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shard(mut self, shard_id: ShardId, shard: MemoryShard) -> Self {
        self.shards.insert(shard_id, shard);
        self
    }

    /// Descriptors for every configured shard, all `up`.
    pub fn descriptors(&self) -> Vec<ShardDescriptor> {
        self.shards
            .keys()
            .map(|&id| ShardDescriptor::new(id, "127.0.0.1", 3306, format!("shard_{id}")))
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn rows_pulled(&self) -> usize {
        self.rows_pulled.load(Ordering::SeqCst)
    }

    /// Shared handle to the pulled-rows counter.
    pub fn rows_pulled_counter(&self) -> Arc<AtomicUsize> {
        self.rows_pulled.clone()
    }
}

#[async_trait]
impl ShardSource for MemoryShardSource {
    async fn connect(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Box<dyn ShardConnection>, ShardError> {
        let data = self.shards.get(&shard.shard_id).ok_or_else(|| {
            ShardError::Connection(format!("unknown database {}", shard.database))
        })?;

        if data.fail_connect {
            return Err(ShardError::Connection(format!(
                "connection refused: {}:{}",
                shard.address, shard.port
            )));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryShardConnection {
            shard_id: shard.shard_id,
            shard: data.clone(),
            closes: self.closes.clone(),
            rows_pulled: self.rows_pulled.clone(),
        }))
    }
}

struct MemoryShardConnection {
    shard_id: ShardId,
    shard: MemoryShard,
    closes: Arc<AtomicUsize>,
    rows_pulled: Arc<AtomicUsize>,
}

#[async_trait]
impl ShardConnection for MemoryShardConnection {
    fn changes_since(&mut self, from: Watermark) -> BoxStream<'_, Result<ChangeRow, ShardError>> {
        let mut items: Vec<Result<ChangeRow, ShardError>> = self
            .shard
            .rows
            .iter()
            .filter(|row| row.modified >= from)
            .cloned()
            .map(Ok)
            .collect();

        if let Some(count) = self.shard.fail_after {
            items.truncate(count);
            items.push(Err(ShardError::Stream(format!(
                "shard {} lost connection during query",
                self.shard_id
            ))));
        }

        let rows_pulled = self.rows_pulled.clone();
        stream::iter(items)
            .inspect(move |item| {
                if item.is_ok() {
                    rows_pulled.fetch_add(1, Ordering::SeqCst);
                }
            })
            .boxed()
    }

    async fn close(self: Box<Self>) -> Result<(), ShardError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.shard.fail_close {
            return Err(ShardError::Connection(format!(
                "shard {} close failed",
                self.shard_id
            )));
        }
        Ok(())
    }
}

/// Shard directory returning a fixed list.
#[derive(Default)]
pub struct MemoryShardDirectory {
    shards: Vec<ShardDescriptor>,
    fail: bool,
}

impl MemoryShardDirectory {
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            shards,
            fail: false,
        }
    }

    /// A directory whose master database is unreachable.
    pub fn failing() -> Self {
        Self {
            shards: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ShardDirectory for MemoryShardDirectory {
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SyncError> {
        if self.fail {
            return Err(SyncError::Directory("master database unreachable".to_string()));
        }
        Ok(self.shards.clone())
    }
}

/// Index sink that keeps every delivered batch.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<IndexRecord>>>,
    attempts: AtomicUsize,
    fail_on: Option<usize>,
    probe: Option<Arc<AtomicUsize>>,
    probe_readings: Mutex<Vec<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the delivery attempt with this zero-based index.
    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on: Some(attempt),
            ..Default::default()
        }
    }

    /// Read `counter` at every delivery attempt.
    pub fn with_probe(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.probe = Some(counter);
        self
    }

    pub fn batches(&self) -> Vec<Vec<IndexRecord>> {
        lock(&self.batches).clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batches).iter().map(Vec::len).collect()
    }

    pub fn batch_count(&self) -> usize {
        lock(&self.batches).len()
    }

    /// All delivered records, in delivery order.
    pub fn records(&self) -> Vec<IndexRecord> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }

    /// Probe counter values, one per delivery attempt.
    pub fn probe_readings(&self) -> Vec<usize> {
        lock(&self.probe_readings).clone()
    }
}

#[async_trait]
impl IndexSink for RecordingSink {
    async fn deliver(&self, records: &[IndexRecord]) -> Result<(), ShardError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(probe) = &self.probe {
            lock(&self.probe_readings).push(probe.load(Ordering::SeqCst));
        }

        if self.fail_on == Some(attempt) {
            return Err(ShardError::IndexDelivery(
                "HTTP 500 Internal Server Error: indexer unavailable".to_string(),
            ));
        }

        lock(&self.batches).push(records.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
