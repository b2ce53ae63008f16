//! Recorded query results, replayed through [`QueryRunner`].
//!
//! ```json
//! {
//!   "queries": {
//!     "MATCH (n) RETURN n": { "default": [[{ "node": { "identity": 1, "labels": ["A"] } }]] },
//!     "RETURN size($id)":   { "by_identity": { "1": [[{ "scalar": 4 }]] } }
//!   }
//! }
//! ```
//!
//! Used by the CLI to replay captured sessions and by tests to script the
//! database side.

use crate::error::Result;
use crate::query::{Params, QueryError, QueryRunner, RecordStream};
use crate::value::Record;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFixture {
    /// Rows returned when no identity-specific rows match.
    #[serde(default)]
    pub default: Vec<Record>,
    /// Rows keyed by the identity parameter's value.
    #[serde(default)]
    pub by_identity: BTreeMap<String, Vec<Record>>,
    /// Fail the query up front with this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Fail the stream after yielding this many rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_after: Option<usize>,
    #[serde(default)]
    pub delay_ms: u64,
    /// Extra delay per identity, to force out-of-order resolution.
    #[serde(default)]
    pub identity_delay_ms: BTreeMap<String, u64>,
}

impl QueryFixture {
    pub fn rows(records: Vec<Record>) -> Self {
        Self {
            default: records,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn for_identity(mut self, identity: i64, records: Vec<Record>) -> Self {
        self.by_identity.insert(identity.to_string(), records);
        self
    }

    pub fn delayed_for(mut self, identity: i64, delay_ms: u64) -> Self {
        self.identity_delay_ms.insert(identity.to_string(), delay_ms);
        self
    }

    pub fn fail_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub queries: BTreeMap<String, QueryFixture>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: &str, fixture: QueryFixture) -> Self {
        self.queries.insert(query.to_string(), fixture);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::GraphError::configuration("fixture", e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub query: String,
    pub params: Params,
}

/// [`QueryRunner`] that answers from a [`FixtureSet`] and logs every call.
#[derive(Debug)]
pub struct FixtureRunner {
    fixtures: FixtureSet,
    parameter: String,
    calls: Mutex<Vec<QueryCall>>,
}

impl FixtureRunner {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self {
            fixtures,
            parameter: "id".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Name of the parameter that selects `by_identity` rows.
    pub fn with_parameter(mut self, parameter: &str) -> Self {
        self.parameter = parameter.to_string();
        self
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.query == query).count()
    }
}

#[async_trait]
impl QueryRunner for FixtureRunner {
    async fn run(&self, query: &str, params: Params) -> std::result::Result<RecordStream, QueryError> {
        self.calls.lock().push(QueryCall {
            query: query.to_string(),
            params: params.clone(),
        });

        let fixture = self
            .fixtures
            .queries
            .get(query)
            .ok_or_else(|| QueryError::UnknownQuery(query.to_string()))?;

        let identity = params.get(&self.parameter).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        let delay = fixture.delay_ms
            + identity
                .as_ref()
                .and_then(|id| fixture.identity_delay_ms.get(id))
                .copied()
                .unwrap_or(0);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(message) = &fixture.fail {
            return Err(QueryError::Failed(message.clone()));
        }

        let rows = identity
            .as_ref()
            .and_then(|id| fixture.by_identity.get(id))
            .unwrap_or(&fixture.default);

        let mut items: Vec<_> = rows.iter().cloned().map(Ok).collect();
        if let Some(limit) = fixture.fail_after {
            items.truncate(limit);
            items.push(Err(QueryError::Failed(format!(
                "stream interrupted after {limit} rows"
            ))));
        }
        Ok(RecordStream::from_results(items))
    }
}
