//! The renderer-agnostic dataset and the builder that folds observations
//! into it.
//!
//! Nodes and edges are keyed by [`LocalId`]; both registries live inside the
//! [`Dataset`] so ids stay stable for as long as the dataset is not cleared.

use crate::config::{OptionBag, StyleConfig};
use crate::error::{GraphError, Result};
use crate::identity::{IdentityRegistry, LocalId};
use crate::value::{Identity, Properties};
use crate::walker::{EdgeKey, EdgeObservation, NodeObservation, Observation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub local_id: LocalId,
    pub identity: Identity,
    pub labels: Vec<String>,
    pub caption: String,
    /// Size metric: from the `size` option, or from a size query once it
    /// resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Where `value` came from; `None` exactly when `value` is `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<serde_json::Value>,
    /// HTML tooltip listing the properties.
    pub title: String,
    #[serde(default, skip_serializing_if = "OptionBag::is_empty")]
    pub style: OptionBag,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub local_id: LocalId,
    pub key: EdgeKey,
    pub source: LocalId,
    pub target: LocalId,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub caption: String,
    pub value: f64,
    pub title: String,
    #[serde(default, skip_serializing_if = "OptionBag::is_empty")]
    pub style: OptionBag,
    pub properties: Properties,
}

/// Origin of a node's size value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// From the `size` option (or the 1.0 fallback); recomputed on every
    /// observation.
    Derived,
    /// Resolved by a size query; observations never replace it.
    Enriched,
}

/// What a single fold did to the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    NodeAdded(LocalId),
    NodeUpdated(LocalId),
    EdgeAdded(LocalId),
    EdgeUpdated(LocalId),
}

// ============================================================================
// Dataset
// ============================================================================

/// Unique nodes and edges. Every edge's endpoints are present as nodes.
#[derive(Debug, Default)]
pub struct Dataset {
    nodes: BTreeMap<LocalId, GraphNode>,
    edges: BTreeMap<LocalId, GraphEdge>,
    node_ids: IdentityRegistry<Identity>,
    edge_ids: IdentityRegistry<EdgeKey>,
}

/// Dataset shared between the engine and its observers.
pub type SharedDataset = Arc<RwLock<Dataset>>;

/// Owned, serializable copy of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedDataset {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn node(&self, id: LocalId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: LocalId) -> Option<&GraphEdge> {
        self.edges.get(&id)
    }

    pub fn node_by_identity(&self, identity: Identity) -> Option<&GraphNode> {
        self.node_ids
            .lookup(&identity)
            .and_then(|id| self.nodes.get(&id))
    }

    pub fn edge_by_key(&self, key: &EdgeKey) -> Option<&GraphEdge> {
        self.edge_ids.lookup(key).and_then(|id| self.edges.get(&id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Drop every entity and restart local id numbering.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.node_ids.clear();
        self.edge_ids.clear();
    }

    pub fn snapshot(&self) -> DatasetSnapshot {
        DatasetSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Set a node's value; returns whether anything changed.
    pub(crate) fn set_node_value(&mut self, id: LocalId, value: f64) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                let changed = node.value != Some(value);
                node.value = Some(value);
                node.value_source = Some(ValueSource::Enriched);
                changed
            }
            _ => false,
        }
    }
}

// ============================================================================
// Attribute derivation
// ============================================================================

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tooltip(properties: &Properties) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("<strong>{k}:</strong> {}<br>", display_value(v)))
        .collect()
}

/// Literal number, or the numeric value of the named property.
fn numeric_option(option: Option<&serde_json::Value>, properties: &Properties) -> Option<f64> {
    match option? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(key) => properties.get(key).and_then(|v| v.as_f64()),
        _ => None,
    }
}

struct NodeAttributes {
    caption: String,
    value: Option<f64>,
    group: Option<serde_json::Value>,
    title: String,
    style: OptionBag,
}

fn node_attributes(labels: &[String], properties: &Properties, styles: &StyleConfig) -> NodeAttributes {
    let (label, options) = styles.node_options(labels);
    let empty = OptionBag::new();
    let options = options.unwrap_or(&empty);

    let caption = options
        .caption()
        .and_then(|c| c.as_str())
        .and_then(|key| properties.get(key))
        .map(display_value)
        .filter(|c| !c.is_empty())
        .or_else(|| label.map(str::to_string))
        .unwrap_or_default();

    // Nodes with a size query get their value from the query.
    let value = if options.size_query().is_some() {
        None
    } else {
        Some(numeric_option(options.size(), properties).unwrap_or(1.0))
    };

    let group = options.community().map(|key| {
        properties
            .get(key)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::from(0))
    });

    NodeAttributes {
        caption,
        value,
        group,
        title: tooltip(properties),
        style: options.style(),
    }
}

struct EdgeAttributes {
    caption: String,
    value: f64,
    title: String,
    style: OptionBag,
}

fn edge_attributes(rel_type: &str, properties: &Properties, styles: &StyleConfig) -> EdgeAttributes {
    let empty = OptionBag::new();
    let options = styles.relationship_options(rel_type).unwrap_or(&empty);

    let caption = match options.caption() {
        Some(serde_json::Value::Bool(false)) => String::new(),
        Some(serde_json::Value::String(key)) => {
            properties.get(key).map(display_value).unwrap_or_default()
        }
        _ => rel_type.to_string(),
    };

    EdgeAttributes {
        caption,
        value: numeric_option(options.thickness(), properties).unwrap_or(1.0),
        title: tooltip(properties),
        style: options.style(),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Folds observations into a [`Dataset`], deduplicating by identity.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    styles: Arc<StyleConfig>,
}

impl DatasetBuilder {
    pub fn new(styles: Arc<StyleConfig>) -> Self {
        Self { styles }
    }

    pub fn styles(&self) -> &StyleConfig {
        &self.styles
    }

    /// Fold one observation. `Ok(None)` means the observation added nothing
    /// new; `Err` is a recoverable [`GraphError::Identity`] and the
    /// observation was dropped.
    pub fn apply(&self, dataset: &mut Dataset, observation: Observation) -> Result<Option<Mutation>> {
        match observation {
            Observation::Node(node) => Ok(self.apply_node(dataset, node)),
            Observation::Edge(edge) => self.apply_edge(dataset, edge),
        }
    }

    fn apply_node(&self, dataset: &mut Dataset, obs: NodeObservation) -> Option<Mutation> {
        let local_id = dataset.node_ids.local_id_for(&obs.identity);

        let Some(existing) = dataset.nodes.get_mut(&local_id) else {
            let attrs = node_attributes(&obs.labels, &obs.properties, &self.styles);
            dataset.nodes.insert(
                local_id,
                GraphNode {
                    local_id,
                    identity: obs.identity,
                    labels: obs.labels,
                    caption: attrs.caption,
                    value_source: attrs.value.map(|_| ValueSource::Derived),
                    value: attrs.value,
                    group: attrs.group,
                    title: attrs.title,
                    style: attrs.style,
                    properties: obs.properties,
                },
            );
            tracing::trace!(%local_id, identity = %obs.identity, stub = obs.stub, "node added");
            return Some(Mutation::NodeAdded(local_id));
        };

        let before = existing.clone();
        for label in obs.labels {
            if !existing.labels.contains(&label) {
                existing.labels.push(label);
            }
        }
        existing.properties.extend(obs.properties);

        let attrs = node_attributes(&existing.labels, &existing.properties, &self.styles);
        if !attrs.caption.is_empty() {
            existing.caption = attrs.caption;
        }
        // derived values follow the current options; a declared size query
        // clears them until it resolves
        if existing.value_source != Some(ValueSource::Enriched) {
            existing.value_source = attrs.value.map(|_| ValueSource::Derived);
            existing.value = attrs.value;
        }
        if attrs.group.is_some() {
            existing.group = attrs.group;
        }
        if !existing.properties.is_empty() {
            existing.title = attrs.title;
        }
        if !attrs.style.is_empty() {
            existing.style = attrs.style;
        }

        (*existing != before).then_some(Mutation::NodeUpdated(local_id))
    }

    fn apply_edge(&self, dataset: &mut Dataset, obs: EdgeObservation) -> Result<Option<Mutation>> {
        let endpoint = |identity: Identity| {
            dataset.node_ids.lookup(&identity).ok_or_else(|| GraphError::Identity {
                edge: obs.key.to_string(),
                missing: identity.raw(),
            })
        };
        let source = endpoint(obs.source)?;
        let target = endpoint(obs.target)?;

        let local_id = dataset.edge_ids.local_id_for(&obs.key);
        let Some(existing) = dataset.edges.get_mut(&local_id) else {
            let attrs = edge_attributes(&obs.rel_type, &obs.properties, &self.styles);
            tracing::trace!(%local_id, key = %obs.key, "edge added");
            dataset.edges.insert(
                local_id,
                GraphEdge {
                    local_id,
                    key: obs.key,
                    source,
                    target,
                    rel_type: obs.rel_type,
                    caption: attrs.caption,
                    value: attrs.value,
                    title: attrs.title,
                    style: attrs.style,
                    properties: obs.properties,
                },
            );
            return Ok(Some(Mutation::EdgeAdded(local_id)));
        };

        let before = existing.clone();
        existing.properties.extend(obs.properties);
        let attrs = edge_attributes(&existing.rel_type, &existing.properties, &self.styles);
        if !attrs.caption.is_empty() {
            existing.caption = attrs.caption;
        }
        existing.value = attrs.value;
        existing.title = attrs.title;
        existing.style = attrs.style;

        Ok((*existing != before).then_some(Mutation::EdgeUpdated(local_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffectiveConfig, LabelPolicy};
    use crate::value::{Node, Path, Record, Relationship};
    use crate::walker::RecordWalker;
    use serde_json::json;

    fn styles(labels: serde_json::Value, relationships: serde_json::Value) -> Arc<StyleConfig> {
        Arc::new(StyleConfig {
            labels: EffectiveConfig::merge(labels.as_object().unwrap()).unwrap(),
            relationships: EffectiveConfig::merge(relationships.as_object().unwrap()).unwrap(),
            label_policy: LabelPolicy::FirstLabel,
        })
    }

    fn fold(builder: &DatasetBuilder, dataset: &mut Dataset, record: &Record) -> Vec<Mutation> {
        RecordWalker::walk(record)
            .into_iter()
            .filter_map(|o| builder.apply(dataset, o).ok().flatten())
            .collect()
    }

    #[test]
    fn same_identity_is_stored_once() {
        let builder = DatasetBuilder::new(styles(json!({}), json!({})));
        let mut dataset = Dataset::new();
        let a = Node::new(1, &["A"]);
        let b = Node::new(2, &["A"]);

        fold(&builder, &mut dataset, &Record::new(vec![a.clone().into()]));
        let path = Path::through(&[a, b], "T", &[10]).unwrap();
        fold(&builder, &mut dataset, &Record::new(vec![path.into()]));

        assert_eq!(dataset.node_count(), 2);
        assert_eq!(dataset.edge_count(), 1);
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().identity, Identity::new(1));
    }

    #[test]
    fn caption_and_size_follow_label_options() {
        let builder = DatasetBuilder::new(styles(
            json!({
                "Person": { "caption": "name", "size": "rank", "community": "team", "color": "red" },
                "default": { "size": 3 }
            }),
            json!({}),
        ));
        let mut dataset = Dataset::new();
        let ada = Node::new(1, &["Person"])
            .with_property("name", "Ada")
            .with_property("rank", 0.5);
        let other = Node::new(2, &["Thing"]);
        fold(&builder, &mut dataset, &Record::new(vec![ada.into(), other.into()]));

        let ada = dataset.node_by_identity(Identity::new(1)).unwrap();
        assert_eq!(ada.caption, "Ada");
        assert_eq!(ada.value, Some(0.5));
        assert_eq!(ada.group, Some(json!(0)));
        assert_eq!(ada.style.get("color"), Some(&json!("red")));
        assert!(ada.title.contains("<strong>name:</strong> Ada<br>"));

        let thing = dataset.node_by_identity(Identity::new(2)).unwrap();
        assert_eq!(thing.caption, "Thing");
        assert_eq!(thing.value, Some(3.0));
    }

    #[test]
    fn first_label_decides_options() {
        let builder = DatasetBuilder::new(styles(
            json!({ "A": { "caption": "a" }, "B": { "caption": "b" } }),
            json!({}),
        ));
        let mut dataset = Dataset::new();
        let node = Node::new(1, &["B", "A"])
            .with_property("a", "from-a")
            .with_property("b", "from-b");
        fold(&builder, &mut dataset, &Record::new(vec![node.into()]));
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().caption, "from-b");
    }

    #[test]
    fn edge_captions_and_thickness() {
        let builder = DatasetBuilder::new(styles(
            json!({}),
            json!({
                "KNOWS": { "caption": "since", "thickness": "weight" },
                "HIDDEN": { "caption": false, "thickness": 4 }
            }),
        ));
        let mut dataset = Dataset::new();
        let a = Node::new(1, &["P"]);
        let b = Node::new(2, &["P"]);
        let knows = Relationship::new(10, "KNOWS", &a, &b)
            .with_property("since", 1999)
            .with_property("weight", 2.5);
        let hidden = Relationship::new(11, "HIDDEN", &b, &a);
        let plain = Relationship::new(12, "LIKES", &a, &b);
        fold(
            &builder,
            &mut dataset,
            &Record::new(vec![a.into(), b.into(), knows.into(), hidden.into(), plain.into()]),
        );

        let edges: Vec<_> = dataset.edges().collect();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].caption, "1999");
        assert_eq!(edges[0].value, 2.5);
        assert_eq!(edges[1].caption, "");
        assert_eq!(edges[1].value, 4.0);
        assert_eq!(edges[1].source, LocalId::new(2));
        assert_eq!(edges[2].caption, "LIKES");
        assert_eq!(edges[2].value, 1.0);
    }

    #[test]
    fn stub_is_filled_in_by_a_later_observation() {
        let builder = DatasetBuilder::new(styles(json!({ "P": { "caption": "name" } }), json!({})));
        let mut dataset = Dataset::new();
        let a = Node::new(1, &["P"]).with_property("name", "a");
        let b = Node::new(2, &["P"]).with_property("name", "b");

        let first = fold(
            &builder,
            &mut dataset,
            &Record::new(vec![Relationship::new(10, "T", &a, &b).into()]),
        );
        assert!(first.contains(&Mutation::NodeAdded(LocalId::new(1))));
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().caption, "");

        let second = fold(&builder, &mut dataset, &Record::new(vec![a.into()]));
        assert_eq!(second, vec![Mutation::NodeUpdated(LocalId::new(1))]);
        let node = dataset.node(LocalId::new(1)).unwrap();
        assert_eq!(node.caption, "a");
        assert_eq!(node.labels, vec!["P".to_string()]);
    }

    #[test]
    fn repeat_observation_without_news_is_silent() {
        let builder = DatasetBuilder::new(styles(json!({}), json!({})));
        let mut dataset = Dataset::new();
        let record = Record::new(vec![Node::new(1, &["A"]).into()]);
        assert_eq!(fold(&builder, &mut dataset, &record).len(), 1);
        assert!(fold(&builder, &mut dataset, &record).is_empty());
    }

    #[test]
    fn enrichment_value_survives_reobservation() {
        let builder = DatasetBuilder::new(styles(json!({ "A": { "sizeQuery": "q" } }), json!({})));
        let mut dataset = Dataset::new();
        let record = Record::new(vec![Node::new(1, &["A"]).with_property("x", 1).into()]);
        fold(&builder, &mut dataset, &record);
        assert!(dataset.set_node_value(LocalId::new(1), 7.0));
        fold(
            &builder,
            &mut dataset,
            &Record::new(vec![Node::new(1, &["A"]).with_property("y", 2).into()]),
        );
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().value, Some(7.0));
    }

    #[test]
    fn stub_value_is_dropped_once_a_size_query_applies() {
        let builder = DatasetBuilder::new(styles(json!({ "A": { "sizeQuery": "q" } }), json!({})));
        let a = Node::new(1, &["A"]);
        let b = Node::new(2, &["A"]);
        let rel = Record::new(vec![Relationship::new(10, "T", &a, &b).into()]);
        let nodes = [Record::new(vec![a.into()]), Record::new(vec![b.into()])];

        let mut rel_first = Dataset::new();
        fold(&builder, &mut rel_first, &rel);
        let stub = rel_first.node(LocalId::new(1)).unwrap();
        assert_eq!((stub.value, stub.value_source), (Some(1.0), Some(ValueSource::Derived)));
        for record in &nodes {
            fold(&builder, &mut rel_first, record);
        }

        let mut nodes_first = Dataset::new();
        for record in nodes.iter().chain([&rel]) {
            fold(&builder, &mut nodes_first, record);
        }

        for dataset in [&rel_first, &nodes_first] {
            for node in dataset.nodes() {
                assert_eq!(node.value, None);
                assert_eq!(node.value_source, None);
            }
        }
    }

    #[test]
    fn enriched_value_is_never_replaced_by_a_derived_one() {
        let builder = DatasetBuilder::new(styles(
            json!({ "default": { "sizeQuery": "q" }, "B": { "sizeQuery": "" } }),
            json!({}),
        ));
        let mut dataset = Dataset::new();
        let a = Node::new(1, &["B"]);
        let b = Node::new(2, &["B"]);
        fold(
            &builder,
            &mut dataset,
            &Record::new(vec![Relationship::new(10, "T", &a, &b).into()]),
        );
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().value, None);
        assert!(dataset.set_node_value(LocalId::new(1), 4.0));

        fold(&builder, &mut dataset, &Record::new(vec![a.into(), b.into()]));
        let enriched = dataset.node(LocalId::new(1)).unwrap();
        assert_eq!(enriched.value, Some(4.0));
        assert_eq!(enriched.value_source, Some(ValueSource::Enriched));
        let derived = dataset.node(LocalId::new(2)).unwrap();
        assert_eq!((derived.value, derived.value_source), (Some(1.0), Some(ValueSource::Derived)));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let builder = DatasetBuilder::new(styles(json!({}), json!({})));
        let mut dataset = Dataset::new();
        let a = Node::new(1, &[]);
        let b = Node::new(2, &[]);
        let observation = Observation::Edge((&Relationship::new(5, "T", &a, &b)).into());
        let err = builder.apply(&mut dataset, observation).unwrap_err();
        assert!(matches!(err, GraphError::Identity { missing: 1, .. }));
        assert!(err.is_recoverable());
        assert_eq!(dataset.edge_count(), 0);
    }

    #[test]
    fn clear_restarts_local_ids() {
        let builder = DatasetBuilder::new(styles(json!({}), json!({})));
        let mut dataset = Dataset::new();
        fold(&builder, &mut dataset, &Record::new(vec![Node::new(8, &[]).into()]));
        dataset.clear();
        assert!(dataset.is_empty());
        fold(&builder, &mut dataset, &Record::new(vec![Node::new(9, &[]).into()]));
        assert_eq!(dataset.node(LocalId::new(1)).unwrap().identity, Identity::new(9));
    }
}
