//! Shard Feeder
//!
//! Incrementally pushes changed items from every data shard into the search
//! indexer, then exits.
//!
//! # Usage
//!
//! ```bash
//! shard-feeder [run] [--checkpoint-path PATH] [--batch-size N]
//! shard-feeder checkpoints
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/shard-feeder/config.toml)
//! 3. Environment variables (FEEDER_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use feeder_daemon::{run_feeder, show_checkpoints, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command_or_default() {
        Commands::Run {
            checkpoint_path,
            batch_size,
        } => {
            run_feeder(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                checkpoint_path.as_deref(),
                batch_size,
            )
            .await?;
        }
        Commands::Checkpoints { checkpoint_path } => {
            show_checkpoints(cli.config.as_deref(), checkpoint_path.as_deref())?;
        }
    }

    Ok(())
}
