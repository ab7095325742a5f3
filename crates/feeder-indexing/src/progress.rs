//! Periodic progress output.
//!
//! The reporter runs on its own task, reading [`RunState`] on a fixed
//! interval. It never touches the orchestrator beyond those atomic reads.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use feeder_types::ShardId;

use crate::state::RunState;

/// Default time between progress lines.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressLine {
    pub current_shard: ShardId,
    pub failed_shards: u32,
    pub indexed_total: u64,
    pub indexed_per_second: u64,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "current shard: {}, failed shards: {}, indexed total: {}, indexed per second: {}",
            self.current_shard, self.failed_shards, self.indexed_total, self.indexed_per_second
        )
    }
}

/// Destination for progress lines.
pub trait ProgressSink {
    fn on_progress(&mut self, line: &ProgressLine);
}

/// Prints each line to standard output.
#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_progress(&mut self, line: &ProgressLine) {
        println!("{line}");
    }
}

impl ProgressSink for Vec<ProgressLine> {
    fn on_progress(&mut self, line: &ProgressLine) {
        self.push(*line);
    }
}

/// Interval-driven reader of [`RunState`].
pub struct ProgressReporter {
    state: Arc<RunState>,
    interval: Duration,
}

impl ProgressReporter {
    pub fn new(state: Arc<RunState>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Build a line from the current counters, resetting the interval count.
    pub fn report(&self) -> ProgressLine {
        let interval_count = self.state.take_indexed_since_report();
        let snapshot = self.state.snapshot();
        let millis = self.interval.as_millis().max(1) as u64;

        ProgressLine {
            current_shard: snapshot.current_shard,
            failed_shards: snapshot.failed_shards,
            indexed_total: snapshot.indexed_total,
            indexed_per_second: interval_count.saturating_mul(1000) / millis,
        }
    }

    /// Report every interval until `done` fires, then report once more.
    ///
    /// Returns the sink so callers can inspect what was written.
    pub async fn run<S: ProgressSink>(self, mut sink: S, done: CancellationToken) -> S {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => {
                    sink.on_progress(&self.report());
                    debug!("Progress reporter stopped");
                    break;
                }
                _ = ticker.tick() => {
                    sink.on_progress(&self.report());
                }
            }
        }

        sink
    }

    /// Run on a new task.
    pub fn spawn<S>(self, sink: S, done: CancellationToken) -> JoinHandle<S>
    where
        S: ProgressSink + Send + 'static,
    {
        tokio::spawn(self.run(sink, done))
    }
}
