//! Pull-based change streaming for one shard.
//!
//! [`ShardStreamer`] turns the shard's row stream into [`IndexRecord`]s while
//! keeping a running maximum of the source modification time. The maximum is
//! seeded with the starting watermark, so the final watermark is never below
//! it, and is only handed out once the stream is exhausted.

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, trace};

use feeder_types::{IndexRecord, ShardId, Watermark};

use crate::error::ShardError;
use crate::source::{ChangeRow, ShardConnection};

/// Forward-only, non-restartable record stream for one shard pass.
pub struct ShardStreamer<'a> {
    shard_id: ShardId,
    rows: BoxStream<'a, Result<ChangeRow, ShardError>>,
    start: Watermark,
    max_seen: Watermark,
    rows_read: u64,
    exhausted: bool,
}

impl<'a> ShardStreamer<'a> {
    /// Wrap an existing row stream.
    pub fn new(
        shard_id: ShardId,
        from: Watermark,
        rows: BoxStream<'a, Result<ChangeRow, ShardError>>,
    ) -> Self {
        Self {
            shard_id,
            rows,
            start: from,
            max_seen: from,
            rows_read: 0,
            exhausted: false,
        }
    }

    /// Start the change query on `connection` from `from`.
    pub fn open(
        connection: &'a mut dyn ShardConnection,
        shard_id: ShardId,
        from: Watermark,
    ) -> Self {
        debug!(shard_id = shard_id, from = %from, "Starting change stream");
        let rows = connection.changes_since(from);
        Self::new(shard_id, from, rows)
    }

    /// Pull the next record. `Ok(None)` marks the end of the stream.
    pub async fn next_record(&mut self) -> Result<Option<IndexRecord>, ShardError> {
        if self.exhausted {
            return Ok(None);
        }

        match self.rows.next().await {
            Some(Ok(row)) => {
                if row.modified > self.max_seen {
                    self.max_seen = row.modified;
                }
                self.rows_read += 1;
                trace!(shard_id = self.shard_id, modified = %row.modified, "Row");
                Ok(Some(row.to_record()))
            }
            Some(Err(e)) => Err(e),
            None => {
                self.exhausted = true;
                debug!(
                    shard_id = self.shard_id,
                    rows = self.rows_read,
                    "Change stream exhausted"
                );
                Ok(None)
            }
        }
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Highest timestamp observed so far, if any row was read.
    ///
    /// Not a resume point: only [`ShardStreamer::finish`] yields one.
    pub fn observed_max(&self) -> Option<Watermark> {
        (self.rows_read > 0).then_some(self.max_seen)
    }

    /// Final watermark of a fully consumed stream.
    pub fn finish(self) -> Result<Watermark, ShardError> {
        if !self.exhausted {
            return Err(ShardError::Stream(format!(
                "shard {} stream finished before end of rows ({} read)",
                self.shard_id, self.rows_read
            )));
        }
        debug_assert!(self.max_seen >= self.start);
        Ok(self.max_seen)
    }
}
