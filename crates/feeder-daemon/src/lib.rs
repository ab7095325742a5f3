//! Shard feeder library exports.
//!
//! This crate provides the CLI binary for the shard feeder.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, checkpoints)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{init_logging, load_settings, run_feeder, show_checkpoints, sync_all};
