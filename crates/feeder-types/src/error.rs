//! Error types for the shard feeder.

use thiserror::Error;

/// Unified error type for feeder domain operations.
#[derive(Debug, Error)]
pub enum FeederError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
