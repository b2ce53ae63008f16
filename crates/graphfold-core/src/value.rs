//! Query-result values as delivered by a graph-database driver.
//!
//! Records are heterogeneous: a single row may mix nodes, relationships,
//! paths, lists of those, and plain scalars.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Property map attached to nodes and relationships.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Database-assigned identity of a node or relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(i64);

impl Identity {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }
}

impl From<i64> for Identity {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub identity: Identity,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    pub fn new(identity: impl Into<Identity>, labels: &[&str]) -> Self {
        Self {
            identity: identity.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub identity: Identity,
    pub start: Identity,
    pub end: Identity,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(
        identity: impl Into<Identity>,
        rel_type: &str,
        start: &Node,
        end: &Node,
    ) -> Self {
        Self {
            identity: identity.into(),
            start: start.identity,
            end: end.identity,
            rel_type: rel_type.to_string(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// A relationship as bound inside a path segment.
///
/// Drivers may omit the identity and the direction of relationships that
/// only appear inside paths; the segment's nodes supply what is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRelationship {
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub start: Option<Identity>,
    #[serde(default)]
    pub end: Option<Identity>,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl From<Relationship> for SegmentRelationship {
    fn from(rel: Relationship) -> Self {
        Self {
            identity: Some(rel.identity),
            start: Some(rel.start),
            end: Some(rel.end),
            rel_type: rel.rel_type,
            properties: rel.properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub start: Node,
    pub relationship: SegmentRelationship,
    pub end: Node,
}

/// One connected walk: `start -[r1]- n1 -[r2]- ... - end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub start: Node,
    pub end: Node,
    #[serde(default)]
    pub segments: Vec<PathSegment>,
}

impl Path {
    /// Build a path through `nodes`, joining consecutive nodes with a
    /// relationship of `rel_type`. Relationship identities are taken from
    /// `rel_ids` (one per hop).
    pub fn through(nodes: &[Node], rel_type: &str, rel_ids: &[i64]) -> Option<Self> {
        let start = nodes.first()?.clone();
        let end = nodes.last()?.clone();
        let segments = nodes
            .windows(2)
            .zip(rel_ids)
            .map(|(pair, id)| PathSegment {
                start: pair[0].clone(),
                relationship: Relationship::new(*id, rel_type, &pair[0], &pair[1]).into(),
                end: pair[1].clone(),
            })
            .collect();
        Some(Self {
            start,
            end,
            segments,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    List(Vec<Value>),
    Scalar(serde_json::Value),
}

impl Value {
    /// Numeric view of a scalar (integers and floats).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Relationship> for Value {
    fn from(rel: Relationship) -> Self {
        Value::Relationship(rel)
    }
}

impl From<Path> for Value {
    fn from(path: Path) -> Self {
        Value::Path(path)
    }
}

/// One row of a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn scalar(value: impl Into<serde_json::Value>) -> Self {
        Self {
            values: vec![Value::Scalar(value.into())],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl FromIterator<Value> for Record {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
