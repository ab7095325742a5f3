//! CLI argument parsing for the shard feeder.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Shard Feeder
///
/// Pushes items changed since the last run from every data shard into the
/// search indexer.
#[derive(Parser, Debug)]
#[command(name = "shard-feeder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/shard-feeder/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Defaults to `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Feeder commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sync every shard once, then exit
    Run {
        /// Override checkpoint database path
        #[arg(long)]
        checkpoint_path: Option<String>,

        /// Override records per indexing request
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Show stored shard checkpoints
    Checkpoints {
        /// Checkpoint database path (default from config)
        #[arg(long)]
        checkpoint_path: Option<String>,
    },
}

impl Cli {
    /// The requested command, `run` with no overrides if none was given.
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run {
            checkpoint_path: None,
            batch_size: None,
        })
    }
}
