//! Configuration loading for the shard feeder.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/shard-feeder/config.toml`.

use std::fmt;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::FeederError;

/// Connection settings for the master database.
///
/// The same credentials are used for every shard database.
#[derive(Clone, Serialize, Deserialize)]
pub struct MasterSettings {
    #[serde(default = "default_master_host")]
    pub host: String,

    #[serde(default = "default_master_port")]
    pub port: u16,

    #[serde(default = "default_master_user")]
    pub user: String,

    /// Password (prefer FEEDER_MASTER__PASSWORD over the config file)
    #[serde(default)]
    pub password: String,

    /// Database holding the `shards` and `shardHosts` tables
    #[serde(default = "default_master_database")]
    pub database: String,
}

fn default_master_host() -> String {
    "localhost".to_string()
}

fn default_master_port() -> u16 {
    3306
}

fn default_master_user() -> String {
    "root".to_string()
}

fn default_master_database() -> String {
    "zotero_master".to_string()
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            host: default_master_host(),
            port: default_master_port(),
            user: default_master_user(),
            password: String::new(),
            database: default_master_database(),
        }
    }
}

impl fmt::Debug for MasterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB checkpoint directory
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,

    /// Endpoint receiving batches of index records
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,

    /// Master database connection
    #[serde(default)]
    pub master: MasterSettings,

    /// Records per indexer request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between progress lines (milliseconds)
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Timeout for a single indexer request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_checkpoint_path() -> String {
    ProjectDirs::from("", "", "shard-feeder")
        .map(|p| p.data_local_dir().join("checkpoints"))
        .unwrap_or_else(|| PathBuf::from("./checkpoints"))
        .to_string_lossy()
        .to_string()
}

fn default_indexer_url() -> String {
    "http://localhost:8080/index".to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            checkpoint_path: default_checkpoint_path(),
            indexer_url: default_indexer_url(),
            master: MasterSettings::default(),
            batch_size: default_batch_size(),
            progress_interval_ms: default_progress_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/shard-feeder/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (FEEDER_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, FeederError> {
        let config_dir = ProjectDirs::from("", "", "shard-feeder")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("checkpoint_path", default_checkpoint_path())
            .map_err(|e| FeederError::Config(e.to_string()))?
            .set_default("indexer_url", default_indexer_url())
            .map_err(|e| FeederError::Config(e.to_string()))?
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(|e| FeederError::Config(e.to_string()))?
            .set_default("progress_interval_ms", default_progress_interval_ms() as i64)
            .map_err(|e| FeederError::Config(e.to_string()))?
            .set_default("request_timeout_secs", default_request_timeout_secs() as i64)
            .map_err(|e| FeederError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| FeederError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: FEEDER_INDEXER_URL, FEEDER_MASTER__HOST, FEEDER_MASTER__PASSWORD, etc.
        builder = builder.add_source(
            Environment::with_prefix("FEEDER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| FeederError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| FeederError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the sync loop cannot run with.
    pub fn validate(&self) -> Result<(), FeederError> {
        if self.batch_size == 0 {
            return Err(FeederError::Config("batch_size must be > 0".to_string()));
        }
        if self.progress_interval_ms == 0 {
            return Err(FeederError::Config(
                "progress_interval_ms must be > 0".to_string(),
            ));
        }
        if self.indexer_url.trim().is_empty() {
            return Err(FeederError::Config("indexer_url must be set".to_string()));
        }
        Ok(())
    }

    /// Expand ~ in checkpoint_path to the home directory
    pub fn expanded_checkpoint_path(&self) -> PathBuf {
        if let Some(rest) = self.checkpoint_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.checkpoint_path)
    }
}
