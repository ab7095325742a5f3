//! Seams to the shard databases.
//!
//! [`ShardDirectory`] lists the shards, [`ShardSource`] opens a connection to
//! one of them, and [`ShardConnection`] runs the change query. The MySQL
//! implementations live in [`crate::mysql`]; in-memory ones in [`crate::mock`].

use async_trait::async_trait;
use futures::stream::BoxStream;

use feeder_types::{IndexRecord, ShardDescriptor, Watermark};

use crate::error::{ShardError, SyncError};

/// One row of the change query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub title: String,
    /// First creator's surname (empty if the source value is NULL)
    pub name: String,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    /// Source modification timestamp of the item
    pub modified: Watermark,
}

impl ChangeRow {
    pub fn new(title: impl Into<String>, name: impl Into<String>, modified: Watermark) -> Self {
        Self {
            title: title.into(),
            name: name.into(),
            doi: None,
            isbn: None,
            modified,
        }
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    /// Convert to the record shape the indexer receives.
    pub fn to_record(&self) -> IndexRecord {
        IndexRecord::new(
            self.title.as_str(),
            self.name.as_str(),
            self.doi.as_deref(),
            self.isbn.as_deref(),
        )
    }
}

/// Lists the shards to sync.
#[async_trait]
pub trait ShardDirectory: Send + Sync {
    /// Enumerate shards. Failure is fatal to the run.
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SyncError>;
}

/// Opens connections to individual shards.
#[async_trait]
pub trait ShardSource: Send + Sync {
    async fn connect(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Box<dyn ShardConnection>, ShardError>;
}

/// An open connection to one shard.
///
/// Held for the whole shard pass and closed exactly once afterwards.
#[async_trait]
pub trait ShardConnection: Send {
    /// Lazily stream items modified at or after `from`.
    ///
    /// Rows are produced only as the stream is polled, so a consumer that
    /// stops polling (while a batch is being delivered) stops row intake.
    fn changes_since(&mut self, from: Watermark) -> BoxStream<'_, Result<ChangeRow, ShardError>>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<(), ShardError>;
}
