//! Sequential shard sync loop.
//!
//! Shards are processed one at a time in ascending id order. A shard-local
//! failure is counted and logged and leaves that shard's checkpoint alone;
//! only directory and checkpoint store failures stop the run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use feeder_types::{ShardDescriptor, ShardId, Watermark};

use crate::batcher::{BatchStats, Batcher, DEFAULT_BATCH_SIZE};
use crate::checkpoint::CheckpointStore;
use crate::client::IndexClient;
use crate::error::{ShardError, ShardErrorKind, SyncError};
use crate::source::{ShardConnection, ShardDirectory, ShardSource};
use crate::state::RunState;
use crate::streamer::ShardStreamer;

/// Configuration for the sync loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records per indexing request
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// Result of one shard pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardOutcome {
    /// Stream exhausted, every batch delivered, checkpoint committed.
    Synced {
        watermark: Watermark,
        records_indexed: u64,
        batches: u64,
    },
    /// Pass aborted; the stored checkpoint was not touched.
    Failed {
        kind: ShardErrorKind,
        message: String,
        /// Highest timestamp seen before the failure, never persisted
        partial_watermark_discarded: Option<Watermark>,
    },
}

impl ShardOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, ShardOutcome::Synced { .. })
    }
}

/// Totals for a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: u32,
    pub synced: u32,
    pub failed: u32,
    pub records_indexed: u64,
    pub outcomes: Vec<(ShardId, ShardOutcome)>,
}

impl RunSummary {
    fn add(&mut self, shard_id: ShardId, outcome: ShardOutcome) {
        self.attempted += 1;
        match &outcome {
            ShardOutcome::Synced {
                records_indexed, ..
            } => {
                self.synced += 1;
                self.records_indexed += records_indexed;
            }
            ShardOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push((shard_id, outcome));
    }

    pub fn outcome(&self, shard_id: ShardId) -> Option<&ShardOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == shard_id)
            .map(|(_, outcome)| outcome)
    }
}

/// Keep `up` shards only, ascending by id.
pub fn eligible_shards(shards: Vec<ShardDescriptor>) -> Vec<ShardDescriptor> {
    let mut eligible: Vec<ShardDescriptor> = shards
        .into_iter()
        .filter(|shard| {
            if !shard.is_eligible() {
                debug!(shard_id = shard.shard_id, state = %shard.state, "Skipping shard");
            }
            shard.is_eligible()
        })
        .collect();
    eligible.sort_by_key(|shard| shard.shard_id);
    eligible
}

/// Drives every shard through stream, batch and delivery.
pub struct Orchestrator {
    checkpoints: CheckpointStore,
    source: Arc<dyn ShardSource>,
    client: IndexClient,
    state: Arc<RunState>,
    config: SyncConfig,
}

impl Orchestrator {
    pub fn new(
        checkpoints: CheckpointStore,
        source: Arc<dyn ShardSource>,
        client: IndexClient,
        state: Arc<RunState>,
    ) -> Self {
        Self {
            checkpoints,
            source,
            client,
            state,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// List shards from `directory`, then sync them.
    pub async fn run_from_directory(
        &self,
        directory: &dyn ShardDirectory,
    ) -> Result<RunSummary, SyncError> {
        let shards = directory.list_shards().await?;
        info!(shards = shards.len(), "Listed shards");
        self.run(shards).await
    }

    /// Sync every eligible shard in ascending id order.
    pub async fn run(&self, shards: Vec<ShardDescriptor>) -> Result<RunSummary, SyncError> {
        let shards = eligible_shards(shards);
        let mut summary = RunSummary::default();

        for shard in &shards {
            let outcome = self.sync_shard(shard).await?;
            summary.add(shard.shard_id, outcome);
        }

        info!(
            attempted = summary.attempted,
            synced = summary.synced,
            failed = summary.failed,
            records = summary.records_indexed,
            "Run complete"
        );
        Ok(summary)
    }

    /// Sync one shard.
    ///
    /// Shard-local failures come back as [`ShardOutcome::Failed`]; the error
    /// branch is reserved for checkpoint store failures.
    pub async fn sync_shard(&self, shard: &ShardDescriptor) -> Result<ShardOutcome, SyncError> {
        let shard_id = shard.shard_id;
        self.state.set_current_shard(shard_id);
        let from = self.checkpoints.get(shard_id)?;
        info!(shard_id = shard_id, from = %from, "Syncing shard");

        let mut connection = match self.source.connect(shard).await {
            Ok(connection) => connection,
            Err(e) => return Ok(self.fail(shard_id, e, None)),
        };

        let result = self.stream_shard(&mut *connection, shard_id, from).await;
        let closed = connection.close().await;

        match result {
            Ok((watermark, stats)) => {
                if let Err(e) = closed {
                    warn!(shard_id = shard_id, error = %e, "Failed to close shard connection");
                }
                let checkpoint = self.checkpoints.commit(shard_id, watermark, stats.records)?;
                info!(
                    shard_id = shard_id,
                    watermark = %checkpoint.watermark,
                    records = stats.records,
                    batches = stats.batches,
                    "Shard synced"
                );
                Ok(ShardOutcome::Synced {
                    watermark: checkpoint.watermark,
                    records_indexed: stats.records,
                    batches: stats.batches,
                })
            }
            Err((e, partial)) => {
                if let Err(close_err) = closed {
                    warn!(
                        shard_id = shard_id,
                        error = %close_err,
                        "Failed to close shard connection"
                    );
                }
                Ok(self.fail(shard_id, e, partial))
            }
        }
    }

    async fn stream_shard(
        &self,
        connection: &mut dyn ShardConnection,
        shard_id: ShardId,
        from: Watermark,
    ) -> Result<(Watermark, BatchStats), (ShardError, Option<Watermark>)> {
        let mut streamer = ShardStreamer::open(connection, shard_id, from);
        let mut batcher = Batcher::new(&self.client, self.config.batch_size);

        loop {
            match streamer.next_record().await {
                Ok(Some(record)) => {
                    if let Err(e) = batcher.push(record).await {
                        return Err((e, streamer.observed_max()));
                    }
                }
                Ok(None) => break,
                Err(e) => return Err((e, streamer.observed_max())),
            }
        }

        let stats = batcher
            .finish()
            .await
            .map_err(|e| (e, streamer.observed_max()))?;
        let watermark = streamer.finish().map_err(|e| (e, None))?;
        Ok((watermark, stats))
    }

    fn fail(&self, shard_id: ShardId, e: ShardError, partial: Option<Watermark>) -> ShardOutcome {
        self.state.record_failure();
        error!(
            shard_id = shard_id,
            kind = %e.kind(),
            error = %e,
            discarded = ?partial.map(|w| w.to_string()),
            "Shard failed, checkpoint unchanged"
        );
        ShardOutcome::Failed {
            kind: e.kind(),
            message: e.to_string(),
            partial_watermark_discarded: partial,
        }
    }
}
