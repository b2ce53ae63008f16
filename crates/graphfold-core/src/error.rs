//! Error taxonomy for the ingestion engine.
//!
//! Per-entity problems (enrichment failures, dangling edges) are absorbed and
//! surfaced as warnings; only configuration and stream-level failures reach
//! the caller as `Err`.

use crate::identity::LocalId;
use crate::query::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Malformed configuration (e.g. an option bag that is not an object).
    #[error("configuration error for `{entity_type}`: {message}")]
    Configuration {
        entity_type: String,
        message: String,
    },

    /// The primary record stream failed.
    #[error("ingestion failed: {0}")]
    Ingestion(#[from] QueryError),

    /// A secondary (enrichment) query failed or returned an unexpected shape.
    #[error("enrichment of node {local_id} failed: {message}")]
    Enrichment { local_id: LocalId, message: String },

    /// An edge referenced an endpoint identity that was never observed.
    #[error("edge {edge} references unknown node identity {missing}")]
    Identity { edge: String, missing: i64 },

    /// The render cycle was aborted before completion.
    #[error("render cycle {generation} aborted")]
    Aborted { generation: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn configuration(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Whether the error is local to one entity and must not block completion.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Enrichment { .. } | Self::Identity { .. })
    }
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
