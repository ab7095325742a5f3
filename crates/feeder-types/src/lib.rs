//! # feeder-types
//!
//! Shared domain types for the shard feeder.
//!
//! This crate defines the data structures passed between the feeder crates:
//! - Watermarks: per-shard resume points
//! - Index records: the documents delivered to the search indexer
//! - Shard descriptors: connection info for one data shard
//! - Settings: configuration types
//!
//! ## Usage
//!
//! ```rust
//! use feeder_types::{IndexRecord, Watermark};
//!
//! let record = IndexRecord::new("A Title", "Smith", Some("10.1/x"), Some("978-1"));
//! assert_eq!(record.identifiers, "10.1/x,978-1");
//! assert_eq!(Watermark::epoch().to_string(), "1970-01-01T00:00:00.000Z");
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod shard;
pub mod watermark;

pub use config::{MasterSettings, Settings};
pub use error::FeederError;
pub use record::{join_identifiers, IndexRecord};
pub use shard::{ShardDescriptor, ShardId, ShardState};
pub use watermark::Watermark;
