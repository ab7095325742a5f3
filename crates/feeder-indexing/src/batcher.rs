//! Fixed-size batching in front of the index client.

use tracing::trace;

use feeder_types::IndexRecord;

use crate::client::IndexClient;
use crate::error::ShardError;

/// Default number of records per indexing request.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Counts for one shard's batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: u64,
    pub records: u64,
}

/// Accumulates records and sends them in batches of `threshold`.
///
/// `push` awaits the delivery of a full batch before returning, so the
/// caller does not pull the next record until the indexer has accepted the
/// previous batch. Records reach the indexer in arrival order.
pub struct Batcher<'a> {
    client: &'a IndexClient,
    threshold: usize,
    pending: Vec<IndexRecord>,
    stats: BatchStats,
}

impl<'a> Batcher<'a> {
    pub fn new(client: &'a IndexClient, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            client,
            threshold,
            pending: Vec::with_capacity(threshold),
            stats: BatchStats::default(),
        }
    }

    /// Add a record, sending the batch once it is full.
    pub async fn push(&mut self, record: IndexRecord) -> Result<(), ShardError> {
        self.pending.push(record);
        if self.pending.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send whatever is left. Nothing is sent when the batch is empty.
    pub async fn finish(mut self) -> Result<BatchStats, ShardError> {
        self.flush().await?;
        Ok(self.stats)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    async fn flush(&mut self) -> Result<(), ShardError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        self.client.send(&self.pending).await?;
        self.stats.batches += 1;
        self.stats.records += self.pending.len() as u64;
        trace!(
            batch = self.stats.batches,
            records = self.pending.len(),
            "Flushed batch"
        );
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSink;
    use crate::state::RunState;
    use std::sync::Arc;

    fn record(i: usize) -> IndexRecord {
        IndexRecord::new(format!("title {i}"), "Author", None, None)
    }

    fn client(sink: Arc<RecordingSink>) -> IndexClient {
        IndexClient::new(sink, Arc::new(RunState::new()))
    }

    #[tokio::test]
    async fn test_batches_in_order() {
        let sink = Arc::new(RecordingSink::new());
        let client = client(sink.clone());
        let mut batcher = Batcher::new(&client, DEFAULT_BATCH_SIZE);

        for i in 0..1203 {
            batcher.push(record(i)).await.unwrap();
        }
        let stats = batcher.finish().await.unwrap();

        assert_eq!(sink.batch_sizes(), vec![500, 500, 203]);
        assert_eq!(stats, BatchStats { batches: 3, records: 1203 });

        let titles: Vec<String> = sink.records().into_iter().map(|r| r.title).collect();
        let expected: Vec<String> = (0..1203).map(|i| format!("title {i}")).collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_batch() {
        let sink = Arc::new(RecordingSink::new());
        let client = client(sink.clone());
        let mut batcher = Batcher::new(&client, 2);

        for i in 0..4 {
            batcher.push(record(i)).await.unwrap();
        }
        assert_eq!(batcher.pending(), 0);
        batcher.finish().await.unwrap();

        assert_eq!(sink.batch_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_empty_sends_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let client = client(sink.clone());

        let stats = Batcher::new(&client, 10).finish().await.unwrap();

        assert_eq!(stats, BatchStats::default());
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let sink = Arc::new(RecordingSink::failing_on(1));
        let client = client(sink.clone());
        let mut batcher = Batcher::new(&client, 2);

        batcher.push(record(0)).await.unwrap();
        batcher.push(record(1)).await.unwrap();
        batcher.push(record(2)).await.unwrap();
        let err = batcher.push(record(3)).await.unwrap_err();

        assert!(matches!(err, ShardError::IndexDelivery(_)));
        assert_eq!(sink.batch_count(), 1);
    }
}
