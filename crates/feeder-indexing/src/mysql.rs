//! MySQL shard directory and shard source.
//!
//! One connection to the master database lists the shards; one connection per
//! shard, opened with the same credentials, streams that shard's changes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, info};

use feeder_types::{MasterSettings, ShardDescriptor, ShardId, ShardState, Watermark};

use crate::error::{ShardError, SyncError};
use crate::source::{ChangeRow, ShardConnection, ShardDirectory, ShardSource};

/// Item fields holding a title-like value.
pub const TITLE_FIELD_IDS: [u32; 4] = [110, 111, 112, 113];
pub const DOI_FIELD_ID: u32 = 26;
pub const ISBN_FIELD_ID: u32 = 11;
/// Item types never indexed: notes and attachments.
pub const EXCLUDED_ITEM_TYPES: [u32; 2] = [1, 14];

/// Items modified at or after `?`, one row per item, first creator only.
pub const CHANGE_QUERY: &str = "\
SELECT itmd1.value AS title, itmd2.value AS doi, itmd3.value AS isbn, \
creators.lastName AS name, itm.serverDateModified AS shardDate \
FROM itemCreators, creators, items AS itm \
LEFT JOIN itemData AS itmd1 ON (itmd1.itemID = itm.itemID AND itmd1.fieldID IN (110,111,112,113)) \
LEFT JOIN itemData AS itmd2 ON (itmd2.itemID = itm.itemID AND itmd2.fieldID = 26) \
LEFT JOIN itemData AS itmd3 ON (itmd3.itemID = itm.itemID AND itmd3.fieldID = 11) \
WHERE itm.serverDateModified >= ? \
AND itm.itemTypeID != 1 AND itm.itemTypeID != 14 \
AND itemCreators.itemID = itm.itemID AND itemCreators.orderindex = 0 \
AND creators.creatorID = itemCreators.creatorID \
AND itmd1.value IS NOT NULL \
GROUP BY itm.itemID";

/// Port assumed when a shard host has none recorded.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Shards that are up on hosts that are up.
pub const DIRECTORY_QUERY: &str = "\
SELECT CAST(s.shardID AS UNSIGNED) AS shardID, sh.address, \
CAST(sh.port AS UNSIGNED) AS port, s.db, CAST(s.state AS CHAR) AS state \
FROM shards AS s LEFT JOIN shardHosts AS sh USING (shardHostID) \
WHERE s.state = 'up' AND sh.state = 'up' ORDER BY shardID";

/// Login shared by the master and every shard.
#[derive(Debug)]
pub struct MySqlCredentials {
    pub user: String,
    pub password: SecretString,
}

impl MySqlCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: SecretString::from(password.into()),
        }
    }

    fn connect_options(&self, host: &str, port: u16, database: &str) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(database)
    }
}

async fn connect(
    options: MySqlConnectOptions,
    timeout: Duration,
) -> Result<MySqlConnection, String> {
    match tokio::time::timeout(timeout, options.connect()).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}

/// Lists shards from the master database.
pub struct MySqlShardDirectory {
    host: String,
    port: u16,
    database: String,
    credentials: MySqlCredentials,
    timeout: Duration,
}

impl MySqlShardDirectory {
    pub fn from_settings(master: &MasterSettings, timeout: Duration) -> Self {
        Self {
            host: master.host.clone(),
            port: master.port,
            database: master.database.clone(),
            credentials: MySqlCredentials::new(master.user.as_str(), master.password.as_str()),
            timeout,
        }
    }
}

#[async_trait]
impl ShardDirectory for MySqlShardDirectory {
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SyncError> {
        let options = self
            .credentials
            .connect_options(&self.host, self.port, &self.database);
        let mut conn = connect(options, self.timeout)
            .await
            .map_err(|e| SyncError::Directory(format!("connect to master: {e}")))?;

        let rows = sqlx::query(DIRECTORY_QUERY)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| SyncError::Directory(e.to_string()))?;

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Failed to close master connection");
        }

        let shards = rows
            .iter()
            .map(decode_shard_row)
            .collect::<Result<Vec<_>, _>>()?;
        info!(host = %self.host, shards = shards.len(), "Loaded shard directory");
        Ok(shards)
    }
}

fn decode_shard_row(row: &MySqlRow) -> Result<ShardDescriptor, SyncError> {
    let decode = |e: sqlx::Error| SyncError::Directory(format!("bad shard row: {e}"));

    shard_descriptor(
        row.try_get("shardID").map_err(decode)?,
        row.try_get("address").map_err(decode)?,
        row.try_get("port").map_err(decode)?,
        row.try_get("db").map_err(decode)?,
        row.try_get("state").map_err(decode)?,
    )
}

/// Build a descriptor from directory columns. A NULL port falls back to
/// [`DEFAULT_MYSQL_PORT`]; a NULL address becomes empty.
fn shard_descriptor(
    shard_id: u64,
    address: Option<String>,
    port: Option<u64>,
    database: String,
    state: String,
) -> Result<ShardDescriptor, SyncError> {
    let shard_id = ShardId::try_from(shard_id)
        .map_err(|_| SyncError::Directory(format!("shard id {shard_id} out of range")))?;
    let port = match port {
        Some(port) => u16::try_from(port)
            .map_err(|_| SyncError::Directory(format!("shard {shard_id} has invalid port")))?,
        None => DEFAULT_MYSQL_PORT,
    };

    Ok(ShardDescriptor::new(shard_id, address.unwrap_or_default(), port, database)
        .with_state(ShardState::from(state)))
}

/// Opens shard connections with the master credentials.
pub struct MySqlShardSource {
    credentials: MySqlCredentials,
    timeout: Duration,
}

impl MySqlShardSource {
    pub fn new(credentials: MySqlCredentials, timeout: Duration) -> Self {
        Self {
            credentials,
            timeout,
        }
    }
}

#[async_trait]
impl ShardSource for MySqlShardSource {
    async fn connect(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Box<dyn ShardConnection>, ShardError> {
        let options = self
            .credentials
            .connect_options(&shard.address, shard.port, &shard.database);
        let conn = connect(options, self.timeout).await.map_err(|e| {
            ShardError::Connection(format!(
                "{}:{}/{}: {}",
                shard.address, shard.port, shard.database, e
            ))
        })?;

        debug!(shard_id = shard.shard_id, address = %shard.address, "Connected to shard");
        Ok(Box::new(MySqlShardConnection { conn }))
    }
}

struct MySqlShardConnection {
    conn: MySqlConnection,
}

#[async_trait]
impl ShardConnection for MySqlShardConnection {
    fn changes_since(&mut self, from: Watermark) -> BoxStream<'_, Result<ChangeRow, ShardError>> {
        sqlx::query(CHANGE_QUERY)
            .bind(from.as_datetime())
            .fetch(&mut self.conn)
            .map(|row| match row {
                Ok(row) => decode_change_row(&row),
                Err(e) => Err(ShardError::Stream(e.to_string())),
            })
            .boxed()
    }

    async fn close(self: Box<Self>) -> Result<(), ShardError> {
        self.conn
            .close()
            .await
            .map_err(|e| ShardError::Connection(e.to_string()))
    }
}

fn decode_change_row(row: &MySqlRow) -> Result<ChangeRow, ShardError> {
    let decode = |e: sqlx::Error| ShardError::Stream(format!("bad change row: {e}"));

    // DateTime<Utc> decodes from both DATETIME and TIMESTAMP columns
    let modified: DateTime<Utc> = row.try_get("shardDate").map_err(decode)?;

    Ok(change_row(
        row.try_get("title").map_err(decode)?,
        row.try_get("name").map_err(decode)?,
        row.try_get("doi").map_err(decode)?,
        row.try_get("isbn").map_err(decode)?,
        modified,
    ))
}

/// Build a change row from query columns. A NULL surname becomes empty and
/// empty identifiers are treated as absent.
fn change_row(
    title: String,
    name: Option<String>,
    doi: Option<String>,
    isbn: Option<String>,
    modified: DateTime<Utc>,
) -> ChangeRow {
    let present = |value: Option<String>| value.filter(|v| !v.is_empty());

    ChangeRow {
        title,
        name: name.unwrap_or_default(),
        doi: present(doi),
        isbn: present(isbn),
        modified: Watermark::from_datetime(modified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_change_query_filters() {
        for id in TITLE_FIELD_IDS {
            assert!(CHANGE_QUERY.contains(&id.to_string()));
        }
        assert!(CHANGE_QUERY.contains(&format!("fieldID = {DOI_FIELD_ID})")));
        assert!(CHANGE_QUERY.contains(&format!("fieldID = {ISBN_FIELD_ID})")));
        for item_type in EXCLUDED_ITEM_TYPES {
            assert!(CHANGE_QUERY.contains(&format!("itm.itemTypeID != {item_type}")));
        }
        assert!(CHANGE_QUERY.contains("serverDateModified >= ?"));
        assert!(CHANGE_QUERY.contains("orderindex = 0"));
        assert!(CHANGE_QUERY.ends_with("GROUP BY itm.itemID"));
    }

    #[test]
    fn test_directory_query_filters_up() {
        assert!(DIRECTORY_QUERY.contains("s.state = 'up' AND sh.state = 'up'"));
        assert!(DIRECTORY_QUERY.ends_with("ORDER BY shardID"));
    }

    fn assert_decodes_from_mysql<T>()
    where
        T: for<'r> sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
    {
    }

    #[test]
    fn test_column_types_decodable() {
        assert_decodes_from_mysql::<DateTime<Utc>>();
        assert_decodes_from_mysql::<Option<String>>();
        assert_decodes_from_mysql::<Option<u64>>();
    }

    #[test]
    fn test_change_row_null_handling() {
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
            + chrono::Duration::microseconds(250_999);
        let doi = Some("10.1/x".to_string());
        let row = change_row("Title".to_string(), None, doi, None, modified);

        assert_eq!(row.name, "");
        assert_eq!(row.doi.as_deref(), Some("10.1/x"));
        assert_eq!(row.isbn, None);
        assert_eq!(row.modified.to_string(), "2024-05-01T09:30:00.250Z");
        assert_eq!(row.to_record().identifiers, "10.1/x");
    }

    #[test]
    fn test_change_row_empty_identifiers_dropped() {
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let row = change_row(
            "Title".to_string(),
            Some("Knuth".to_string()),
            Some(String::new()),
            Some("978-1".to_string()),
            modified,
        );

        assert_eq!(row.name, "Knuth");
        assert_eq!(row.doi, None);
        assert_eq!(row.to_record().identifiers, "978-1");
    }

    #[test]
    fn test_shard_descriptor_defaults() {
        let shard = shard_descriptor(4, None, None, "shard_4".to_string(), "up".to_string())
            .unwrap();

        assert_eq!(shard.shard_id, 4);
        assert_eq!(shard.address, "");
        assert_eq!(shard.port, DEFAULT_MYSQL_PORT);
        assert_eq!(shard.database, "shard_4");
        assert_eq!(shard.state, ShardState::Up);
    }

    #[test]
    fn test_shard_descriptor_out_of_range() {
        let err = shard_descriptor(
            1,
            Some("db1".to_string()),
            Some(70_000),
            "shard_1".to_string(),
            "up".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Directory(_)));

        let err = shard_descriptor(u64::MAX, None, Some(3306), "x".to_string(), "up".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_credentials_redacted() {
        let credentials = MySqlCredentials::new("feeder", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("feeder"));
        assert!(!debug.contains("hunter2"));
    }
}
