//! Engine configuration and per-entity-type option merging.
//!
//! Callers describe styling per label and per relationship type:
//!
//! ```json
//! {
//!   "labels":        { "Person": { "caption": "name" }, "default": { "size": "pagerank" } },
//!   "relationships": { "KNOWS":  { "thickness": "weight" }, "default": { "caption": false } }
//! }
//! ```
//!
//! The reserved `default` bucket is folded into every concrete type
//! (`{...default, ...specific}`) once, at engine construction. Types that
//! only show up while ingesting resolve to the default bucket, which is the
//! same result an eager merge would have produced.

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Reserved key holding options shared by every entity type.
pub const DEFAULT_CONFIG_KEY: &str = "default";

/// Raw caller-supplied map: entity type name → option bag.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

pub const OPT_CAPTION: &str = "caption";
pub const OPT_SIZE: &str = "size";
pub const OPT_SIZE_QUERY: &str = "sizeQuery";
/// Alias accepted for [`OPT_SIZE_QUERY`].
pub const OPT_SIZE_CYPHER: &str = "sizeCypher";
pub const OPT_COMMUNITY: &str = "community";
pub const OPT_THICKNESS: &str = "thickness";

const RECOGNIZED_OPTIONS: &[&str] = &[
    OPT_CAPTION,
    OPT_SIZE,
    OPT_SIZE_QUERY,
    OPT_SIZE_CYPHER,
    OPT_COMMUNITY,
    OPT_THICKNESS,
];

fn default_query_limit() -> i64 {
    30
}

fn default_enrichment_parameter() -> String {
    "id".to_string()
}

// ============================================================================
// Option bags
// ============================================================================

/// Options for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionBag(serde_json::Map<String, serde_json::Value>);

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn caption(&self) -> Option<&serde_json::Value> {
        self.get(OPT_CAPTION)
    }

    pub fn size(&self) -> Option<&serde_json::Value> {
        self.get(OPT_SIZE)
    }

    pub fn community(&self) -> Option<&str> {
        self.get(OPT_COMMUNITY).and_then(|v| v.as_str())
    }

    pub fn thickness(&self) -> Option<&serde_json::Value> {
        self.get(OPT_THICKNESS)
    }

    /// Secondary query whose single returned value becomes the node's value.
    pub fn size_query(&self) -> Option<&str> {
        self.get(OPT_SIZE_QUERY)
            .or_else(|| self.get(OPT_SIZE_CYPHER))
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
    }

    /// Options the engine does not interpret, passed through to the renderer.
    pub fn style(&self) -> OptionBag {
        OptionBag(
            self.0
                .iter()
                .filter(|(k, _)| !RECOGNIZED_OPTIONS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// `{...base, ...overrides}`; neither input is touched.
    pub fn merged(base: &OptionBag, overrides: &OptionBag) -> OptionBag {
        let mut out = base.0.clone();
        for (k, v) in &overrides.0 {
            out.insert(k.clone(), v.clone());
        }
        OptionBag(out)
    }

    fn from_value(entity_type: &str, raw: &serde_json::Value) -> Result<Self> {
        match raw {
            serde_json::Value::Object(map) => Ok(OptionBag(map.clone())),
            other => Err(GraphError::configuration(
                entity_type,
                format!("option bag must be an object, got `{other}`"),
            )),
        }
    }
}

/// One entry of a caller configuration map.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityConfigEntry {
    Default(OptionBag),
    Specific { name: String, options: OptionBag },
}

impl EntityConfigEntry {
    pub fn classify(name: &str, raw: &serde_json::Value) -> Result<Self> {
        let options = OptionBag::from_value(name, raw)?;
        if name == DEFAULT_CONFIG_KEY {
            Ok(Self::Default(options))
        } else {
            Ok(Self::Specific {
                name: name.to_string(),
                options,
            })
        }
    }
}

// ============================================================================
// Effective configuration
// ============================================================================

/// Merged options per entity type. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveConfig {
    merged: BTreeMap<String, OptionBag>,
    default: Option<OptionBag>,
}

impl EffectiveConfig {
    /// Merge the default bucket into every concrete entry of `raw`.
    pub fn merge(raw: &ConfigMap) -> Result<Self> {
        let mut default = None;
        let mut specific = Vec::new();
        for (name, value) in raw {
            match EntityConfigEntry::classify(name, value)? {
                EntityConfigEntry::Default(options) => default = Some(options),
                EntityConfigEntry::Specific { name, options } => specific.push((name, options)),
            }
        }

        let merged = specific
            .into_iter()
            .map(|(name, options)| {
                let effective = match &default {
                    Some(base) => OptionBag::merged(base, &options),
                    None => options,
                };
                (name, effective)
            })
            .collect();

        Ok(Self { merged, default })
    }

    /// Options for `entity_type`, falling back to the default bucket for
    /// types without an explicit entry.
    pub fn resolve(&self, entity_type: &str) -> Option<&OptionBag> {
        self.merged
            .get(entity_type)
            .or(self.default.as_ref())
    }

    /// Options only for types with an explicit entry.
    pub fn get(&self, entity_type: &str) -> Option<&OptionBag> {
        self.merged.get(entity_type)
    }

    pub fn default_options(&self) -> Option<&OptionBag> {
        self.default.as_ref()
    }

    /// Concrete (non-default) entity types.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.merged.keys().map(String::as_str)
    }
}

/// Which of a node's labels decides its options when it carries several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// First label in the order delivered by the data source.
    #[default]
    FirstLabel,
    LastLabel,
    /// First label with an explicit entry, else the first label.
    FirstConfigured,
}

impl LabelPolicy {
    pub fn deciding_label<'a>(
        &self,
        labels: &'a [String],
        config: &EffectiveConfig,
    ) -> Option<&'a str> {
        let label = match self {
            LabelPolicy::FirstLabel => labels.first(),
            LabelPolicy::LastLabel => labels.last(),
            LabelPolicy::FirstConfigured => labels
                .iter()
                .find(|l| config.get(l).is_some())
                .or_else(|| labels.first()),
        };
        label.map(String::as_str)
    }
}

/// Effective label and relationship options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleConfig {
    pub labels: EffectiveConfig,
    pub relationships: EffectiveConfig,
    pub label_policy: LabelPolicy,
}

impl StyleConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            labels: EffectiveConfig::merge(&config.labels)?,
            relationships: EffectiveConfig::merge(&config.relationships)?,
            label_policy: config.label_policy,
        })
    }

    /// Deciding label and its options for a node.
    pub fn node_options<'a>(&self, labels: &'a [String]) -> (Option<&'a str>, Option<&OptionBag>) {
        match self.label_policy.deciding_label(labels, &self.labels) {
            Some(label) => (Some(label), self.labels.resolve(label)),
            None => (None, self.labels.default_options()),
        }
    }

    pub fn relationship_options(&self, rel_type: &str) -> Option<&OptionBag> {
        self.relationships.resolve(rel_type)
    }
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Caller-facing configuration for a [`crate::GraphEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Primary query issued by `render`.
    #[serde(default)]
    pub initial_query: String,
    /// Passed to the primary query as the `limit` parameter.
    #[serde(default = "default_query_limit")]
    pub query_limit: i64,
    #[serde(default)]
    pub labels: ConfigMap,
    #[serde(default)]
    pub relationships: ConfigMap,
    #[serde(default)]
    pub label_policy: LabelPolicy,
    /// Parameter name the node identity is bound to in size queries.
    #[serde(default = "default_enrichment_parameter")]
    pub enrichment_parameter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_query: String::new(),
            query_limit: default_query_limit(),
            labels: ConfigMap::new(),
            relationships: ConfigMap::new(),
            label_policy: LabelPolicy::default(),
            enrichment_parameter: default_enrichment_parameter(),
        }
    }
}

impl EngineConfig {
    pub fn with_query(query: &str) -> Self {
        Self {
            initial_query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GraphError::configuration("engine", e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }
}
