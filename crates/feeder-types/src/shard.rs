//! Shard directory entries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a data shard.
pub type ShardId = u32;

/// Lifecycle state reported by the shard directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShardState {
    /// Shard is online and may be synced
    Up,
    /// Any other state (down, readonly, ...)
    Other(String),
}

impl ShardState {
    pub fn is_up(&self) -> bool {
        matches!(self, ShardState::Up)
    }
}

impl From<&str> for ShardState {
    fn from(value: &str) -> Self {
        match value {
            "up" => ShardState::Up,
            other => ShardState::Other(other.to_string()),
        }
    }
}

impl From<String> for ShardState {
    fn from(value: String) -> Self {
        ShardState::from(value.as_str())
    }
}

impl From<ShardState> for String {
    fn from(state: ShardState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardState::Up => write!(f, "up"),
            ShardState::Other(state) => write!(f, "{state}"),
        }
    }
}

/// Connection info for one shard, as listed by the shard directory.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub shard_id: ShardId,
    /// Host address of the shard's database server
    pub address: String,
    pub port: u16,
    /// Database name on the shard host
    pub database: String,
    pub state: ShardState,
}

impl ShardDescriptor {
    pub fn new(
        shard_id: ShardId,
        address: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            shard_id,
            address: address.into(),
            port,
            database: database.into(),
            state: ShardState::Up,
        }
    }

    pub fn with_state(mut self, state: impl Into<ShardState>) -> Self {
        self.state = state.into();
        self
    }

    /// Only shards in the `up` state are synced.
    pub fn is_eligible(&self) -> bool {
        self.state.is_up()
    }
}
