//! Delivery of record batches to the search indexer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use feeder_types::IndexRecord;

use crate::error::{ShardError, SyncError};
use crate::state::RunState;

/// Transport to the external indexing service.
///
/// Implementations make one delivery attempt per call. Any failure aborts the
/// issuing shard; there are no retries.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Deliver a non-empty batch.
    async fn deliver(&self, records: &[IndexRecord]) -> Result<(), ShardError>;

    /// Get the name of this sink for logging.
    fn name(&self) -> &str;
}

/// Indexer reached over HTTP.
///
/// Each batch is one POST with a JSON array body of
/// `{"title", "name", "identifiers"}` objects. Any non-2xx response is an
/// error.
pub struct HttpIndexSink {
    client: Client,
    url: String,
}

impl HttpIndexSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::IndexClient(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IndexSink for HttpIndexSink {
    async fn deliver(&self, records: &[IndexRecord]) -> Result<(), ShardError> {
        let response = self
            .client
            .post(&self.url)
            .json(records)
            .send()
            .await
            .map_err(|e| ShardError::IndexDelivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ShardError::IndexDelivery(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Sends batches through an [`IndexSink`] and counts what was accepted.
#[derive(Clone)]
pub struct IndexClient {
    sink: Arc<dyn IndexSink>,
    state: Arc<RunState>,
}

impl IndexClient {
    pub fn new(sink: Arc<dyn IndexSink>, state: Arc<RunState>) -> Self {
        Self { sink, state }
    }

    /// Deliver one batch. An empty batch succeeds without a request.
    pub async fn send(&self, batch: &[IndexRecord]) -> Result<(), ShardError> {
        if batch.is_empty() {
            return Ok(());
        }

        self.sink.deliver(batch).await?;
        self.state.record_indexed(batch.len() as u64);
        debug!(sink = %self.sink.name(), records = batch.len(), "Delivered batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSink;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn records(count: usize) -> Vec<IndexRecord> {
        (0..count)
            .map(|i| IndexRecord::new(format!("title {i}"), "Author", Some("10.1/x"), None))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let sink = Arc::new(RecordingSink::new());
        let state = Arc::new(RunState::new());
        let client = IndexClient::new(sink.clone(), state.clone());

        client.send(&[]).await.unwrap();

        assert_eq!(sink.batch_count(), 0);
        assert_eq!(state.indexed_total(), 0);
    }

    #[tokio::test]
    async fn test_success_counts_records() {
        let sink = Arc::new(RecordingSink::new());
        let state = Arc::new(RunState::new());
        let client = IndexClient::new(sink.clone(), state.clone());

        client.send(&records(3)).await.unwrap();

        assert_eq!(sink.batch_sizes(), vec![3]);
        assert_eq!(state.indexed_total(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_not_counted() {
        let sink = Arc::new(RecordingSink::failing_on(0));
        let state = Arc::new(RunState::new());
        let client = IndexClient::new(sink.clone(), state.clone());

        let err = client.send(&records(2)).await.unwrap_err();

        assert!(matches!(err, ShardError::IndexDelivery(_)));
        assert_eq!(state.indexed_total(), 0);
    }

    #[tokio::test]
    async fn test_http_sink_posts_json_array() {
        let server = MockServer::start().await;
        let batch = records(2);

        Mock::given(method("POST"))
            .and(path("/index"))
            .and(body_json(serde_json::json!([
                {"title": "title 0", "name": "Author", "identifiers": "10.1/x"},
                {"title": "title 1", "name": "Author", "identifiers": "10.1/x"}
            ])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpIndexSink::new(format!("{}/index", server.uri()), Duration::from_secs(5))
            .unwrap();
        sink.deliver(&batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_sink_non_success_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let sink = HttpIndexSink::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = sink.deliver(&records(1)).await.unwrap_err();

        assert!(matches!(err, ShardError::IndexDelivery(_)));
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_http_sink_transport_error() {
        // Nothing listens on this port once the server is dropped
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };

        let sink = HttpIndexSink::new(uri, Duration::from_secs(2)).unwrap();
        let err = sink.deliver(&records(1)).await.unwrap_err();
        assert!(matches!(err, ShardError::IndexDelivery(_)));
    }
}
