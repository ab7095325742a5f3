//! Incremental shard-to-index sync engine.
//!
//! This crate moves items changed since the last run from every data shard
//! into the external search indexer, one shard at a time.
//!
//! ## Key Components
//!
//! - [`CheckpointStore`]: Durable per-shard watermarks
//! - [`ShardStreamer`]: Pull-based change stream with a running watermark
//! - [`Batcher`]: Fixed-size batching that pauses row intake during delivery
//! - [`IndexClient`]: Batch delivery through an [`IndexSink`]
//! - [`Orchestrator`]: Sequential shard loop with per-shard failure isolation
//! - [`ProgressReporter`]: Interval progress lines from [`RunState`]
//!
//! ## Flow
//!
//! For each eligible shard, in ascending id order:
//! 1. Read the shard's watermark (epoch if never synced)
//! 2. Stream rows modified at or after it, batching records for the indexer
//! 3. On success, persist the highest timestamp seen as the new watermark
//! 4. On failure, count it, keep the old watermark, and move on
//!
//! ## Example
//!
//! ```ignore
//! use feeder_indexing::{CheckpointStore, IndexClient, Orchestrator, RunState};
//!
//! let state = Arc::new(RunState::new());
//! let client = IndexClient::new(sink, state.clone());
//! let orchestrator = Orchestrator::new(checkpoints, source, client, state);
//! let summary = orchestrator.run_from_directory(&directory).await?;
//! ```

pub mod batcher;
pub mod checkpoint;
pub mod client;
pub mod error;
pub mod mock;
pub mod mysql;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod state;
pub mod streamer;

pub use batcher::{BatchStats, Batcher, DEFAULT_BATCH_SIZE};
pub use checkpoint::{CheckpointStore, ShardCheckpoint};
pub use client::{HttpIndexSink, IndexClient, IndexSink};
pub use error::{ShardError, ShardErrorKind, SyncError};
pub use mysql::{MySqlCredentials, MySqlShardDirectory, MySqlShardSource};
pub use orchestrator::{eligible_shards, Orchestrator, RunSummary, ShardOutcome, SyncConfig};
pub use progress::{
    ProgressLine, ProgressReporter, ProgressSink, StdoutProgressSink, DEFAULT_PROGRESS_INTERVAL,
};
pub use source::{ChangeRow, ShardConnection, ShardDirectory, ShardSource};
pub use state::{RunSnapshot, RunState};
pub use streamer::ShardStreamer;
