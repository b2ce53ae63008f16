//! Normalizes heterogeneous records into node and edge observations.
//!
//! Within one record every node observation precedes every edge
//! observation, so an edge's endpoints always resolve by the time the edge
//! is folded into the dataset.

use crate::value::{Identity, Node, Path, Properties, Record, Relationship, Value};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication key of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKey {
    Relationship(Identity),
    /// Path relationship delivered without an identity.
    Synthetic {
        source: Identity,
        target: Identity,
        rel_type: String,
    },
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKey::Relationship(id) => write!(f, "rel#{id}"),
            EdgeKey::Synthetic {
                source,
                target,
                rel_type,
            } => write!(f, "({source})-[:{rel_type}]->({target})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeObservation {
    pub identity: Identity,
    pub labels: Vec<String>,
    pub properties: Properties,
    /// Placeholder for a relationship endpoint the record did not carry.
    pub stub: bool,
}

impl From<&Node> for NodeObservation {
    fn from(node: &Node) -> Self {
        Self {
            identity: node.identity,
            labels: node.labels.clone(),
            properties: node.properties.clone(),
            stub: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeObservation {
    pub key: EdgeKey,
    pub source: Identity,
    pub target: Identity,
    pub rel_type: String,
    pub properties: Properties,
}

impl From<&Relationship> for EdgeObservation {
    fn from(rel: &Relationship) -> Self {
        Self {
            key: EdgeKey::Relationship(rel.identity),
            source: rel.start,
            target: rel.end,
            rel_type: rel.rel_type.clone(),
            properties: rel.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Node(NodeObservation),
    Edge(EdgeObservation),
}

#[derive(Default)]
struct Walk {
    nodes: Vec<NodeObservation>,
    edges: Vec<EdgeObservation>,
    seen: AHashSet<Identity>,
    endpoints: Vec<Identity>,
}

impl Walk {
    fn node(&mut self, node: &Node) {
        self.seen.insert(node.identity);
        self.nodes.push(node.into());
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Node(node) => self.node(node),
            Value::Relationship(rel) => {
                self.endpoints.push(rel.start);
                self.endpoints.push(rel.end);
                self.edges.push(rel.into());
            }
            Value::Path(path) => self.path(path),
            Value::List(items) => items.iter().for_each(|item| self.value(item)),
            Value::Scalar(_) => {}
        }
    }

    fn path(&mut self, path: &Path) {
        self.node(&path.start);
        for segment in &path.segments {
            self.node(&segment.start);
            self.node(&segment.end);

            let rel = &segment.relationship;
            let (a, b) = (segment.start.identity, segment.end.identity);
            let (source, target) = match (rel.start, rel.end) {
                (Some(s), Some(e)) if (s, e) == (a, b) || (s, e) == (b, a) => (s, e),
                (Some(s), Some(e)) => {
                    tracing::warn!(
                        rel_type = %rel.rel_type,
                        start = %s,
                        end = %e,
                        segment_start = %a,
                        segment_end = %b,
                        "path relationship endpoints do not match its segment; using traversal order"
                    );
                    (a, b)
                }
                _ => (a, b),
            };
            let key = match rel.identity {
                Some(id) => EdgeKey::Relationship(id),
                None => EdgeKey::Synthetic {
                    source,
                    target,
                    rel_type: rel.rel_type.clone(),
                },
            };
            self.edges.push(EdgeObservation {
                key,
                source,
                target,
                rel_type: rel.rel_type.clone(),
                properties: rel.properties.clone(),
            });
        }
        self.node(&path.end);
    }

    fn finish(mut self) -> Vec<Observation> {
        for identity in std::mem::take(&mut self.endpoints) {
            if self.seen.insert(identity) {
                self.nodes.push(NodeObservation {
                    identity,
                    labels: Vec::new(),
                    properties: Properties::new(),
                    stub: true,
                });
            }
        }
        self.nodes
            .into_iter()
            .map(Observation::Node)
            .chain(self.edges.into_iter().map(Observation::Edge))
            .collect()
    }
}

/// Walks records into observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordWalker;

impl RecordWalker {
    pub fn walk(record: &Record) -> Vec<Observation> {
        let mut walk = Walk::default();
        for value in record.iter() {
            walk.value(value);
        }
        walk.finish()
    }
}
