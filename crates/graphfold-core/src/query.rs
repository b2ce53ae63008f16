//! Seam to the external query layer.
//!
//! Session handling, transport retries and the wire protocol live behind
//! [`QueryRunner`]; the engine only sees an asynchronous stream of records.

use crate::value::Record;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Query parameters (`{"limit": 30}`, `{"id": 42}`, ...).
pub type Params = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("query failed: {0}")]
    Failed(String),
    #[error("unknown query: {0}")]
    UnknownQuery(String),
    #[error("query stream disconnected")]
    Disconnected,
}

/// Ordered, asynchronous sequence of records for one query.
#[derive(Debug)]
pub struct RecordStream {
    rx: mpsc::Receiver<Result<Record, QueryError>>,
}

/// Producer half of a [`RecordStream`].
pub type RecordSender = mpsc::Sender<Result<Record, QueryError>>;

impl RecordStream {
    pub fn channel(capacity: usize) -> (RecordSender, RecordStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, RecordStream { rx })
    }

    /// A stream that yields `records` and then ends.
    pub fn from_records(records: Vec<Record>) -> RecordStream {
        Self::from_results(records.into_iter().map(Ok).collect())
    }

    /// A stream that yields each item in order (errors included) and ends.
    pub fn from_results(items: Vec<Result<Record, QueryError>>) -> RecordStream {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // capacity covers every item, so this cannot fail
            let _ = tx.try_send(item);
        }
        RecordStream { rx }
    }

    /// Next record; `None` once the producer is done.
    pub async fn next(&mut self) -> Option<Result<Record, QueryError>> {
        self.rx.recv().await
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Record>, QueryError> {
        let mut records = Vec::new();
        while let Some(item) = self.next().await {
            records.push(item?);
        }
        Ok(records)
    }
}

/// Runs queries against the graph database.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, query: &str, params: Params) -> Result<RecordStream, QueryError>;
}
