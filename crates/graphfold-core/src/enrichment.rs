//! Per-node secondary queries ("size queries").
//!
//! The coordinator is a bookkeeping arena: it decides which nodes need a
//! query, hands out [`EnrichmentRequest`]s for the engine to run, and
//! settles their results. It never touches the dataset itself.

use crate::config::StyleConfig;
use crate::dataset::GraphNode;
use crate::identity::LocalId;
use crate::query::{Params, QueryRunner};
use crate::value::{Identity, Record, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    /// Settled; `applied` is false when the query returned no rows.
    Resolved { applied: bool },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentTask {
    pub local_id: LocalId,
    pub identity: Identity,
    pub query: String,
    pub state: TaskState,
}

impl EnrichmentTask {
    pub fn is_pending(&self) -> bool {
        self.state == TaskState::Pending
    }
}

/// A query to run for one node, stamped with the cycle that issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    pub generation: u64,
    pub local_id: LocalId,
    pub identity: Identity,
    pub query: String,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Value(f64),
    /// The query returned no rows.
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub generation: u64,
    pub local_id: LocalId,
    pub outcome: EnrichmentOutcome,
}

impl EnrichmentRequest {
    /// Run the query and reduce its rows to an outcome.
    pub async fn execute(self, runner: Arc<dyn QueryRunner>) -> EnrichmentResult {
        let outcome = match runner.run(&self.query, self.params).await {
            Ok(stream) => match stream.collect().await {
                Ok(records) => match read_value(&records) {
                    Ok(Some(value)) => EnrichmentOutcome::Value(value),
                    Ok(None) => EnrichmentOutcome::Empty,
                    Err(reason) => EnrichmentOutcome::Failed(reason),
                },
                Err(e) => EnrichmentOutcome::Failed(e.to_string()),
            },
            Err(e) => EnrichmentOutcome::Failed(e.to_string()),
        };
        EnrichmentResult {
            generation: self.generation,
            local_id: self.local_id,
            outcome,
        }
    }
}

/// The single expected value: first column of the first row, which must be
/// numeric.
pub fn read_value(records: &[Record]) -> Result<Option<f64>, String> {
    let Some(first) = records.first().and_then(|r| r.values.first()) else {
        return Ok(None);
    };
    match first {
        Value::Scalar(serde_json::Value::Null) => Ok(None),
        value => value
            .as_number()
            .map(Some)
            .ok_or_else(|| format!("expected a single numeric value, got {value:?}")),
    }
}

#[derive(Debug)]
pub struct EnrichmentCoordinator {
    tasks: BTreeMap<LocalId, EnrichmentTask>,
    generation: u64,
    parameter: String,
}

impl EnrichmentCoordinator {
    /// `parameter` is the name the node identity is bound to.
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            tasks: BTreeMap::new(),
            generation: 0,
            parameter: parameter.into(),
        }
    }

    /// Forget all tasks and accept results only from `generation`.
    pub fn begin(&mut self, generation: u64) {
        self.tasks.clear();
        self.generation = generation;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Request for `node` if its options declare a size query and none was
    /// issued for it in this cycle.
    pub fn plan(&mut self, node: &GraphNode, styles: &StyleConfig) -> Option<EnrichmentRequest> {
        let (_, options) = styles.node_options(&node.labels);
        let query = options?.size_query()?;
        if self.tasks.contains_key(&node.local_id) {
            return None;
        }

        self.tasks.insert(
            node.local_id,
            EnrichmentTask {
                local_id: node.local_id,
                identity: node.identity,
                query: query.to_string(),
                state: TaskState::Pending,
            },
        );

        let mut params = Params::new();
        params.insert(self.parameter.clone(), node.identity.raw().into());
        Some(EnrichmentRequest {
            generation: self.generation,
            local_id: node.local_id,
            identity: node.identity,
            query: query.to_string(),
            params,
        })
    }

    /// Record a result. Returns the settled task, or `None` when the result
    /// belongs to another cycle or to a task that is not pending.
    pub fn settle(&mut self, result: &EnrichmentResult) -> Option<&EnrichmentTask> {
        if result.generation != self.generation {
            tracing::debug!(
                local_id = %result.local_id,
                stale = result.generation,
                current = self.generation,
                "ignoring enrichment result from another cycle"
            );
            return None;
        }
        let task = self.tasks.get_mut(&result.local_id)?;
        if !task.is_pending() {
            return None;
        }
        task.state = match &result.outcome {
            EnrichmentOutcome::Value(_) => TaskState::Resolved { applied: true },
            EnrichmentOutcome::Empty => TaskState::Resolved { applied: false },
            EnrichmentOutcome::Failed(reason) => TaskState::Failed {
                reason: reason.clone(),
            },
        };
        Some(task)
    }

    /// Mark every pending task failed; returns how many there were.
    pub fn fail_pending(&mut self, reason: &str) -> usize {
        let mut count = 0;
        for task in self.tasks.values_mut().filter(|t| t.is_pending()) {
            task.state = TaskState::Failed {
                reason: reason.to_string(),
            };
            count += 1;
        }
        count
    }

    pub fn task(&self, local_id: LocalId) -> Option<&EnrichmentTask> {
        self.tasks.get(&local_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &EnrichmentTask> {
        self.tasks.values()
    }

    pub fn issued(&self) -> usize {
        self.tasks.len()
    }

    pub fn failed(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| matches!(t.state, TaskState::Failed { .. }))
            .count()
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.values().filter(|t| t.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffectiveConfig, LabelPolicy, OptionBag};
    use crate::value::Properties;
    use serde_json::json;

    fn styles() -> StyleConfig {
        let labels = json!({ "Sized": { "sizeQuery": "RETURN size($id)" } });
        StyleConfig {
            labels: EffectiveConfig::merge(labels.as_object().unwrap()).unwrap(),
            relationships: EffectiveConfig::default(),
            label_policy: LabelPolicy::FirstLabel,
        }
    }

    fn node(local: u64, identity: i64, labels: &[&str]) -> GraphNode {
        GraphNode {
            local_id: LocalId::new(local),
            identity: Identity::new(identity),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            caption: String::new(),
            value: None,
            value_source: None,
            group: None,
            title: String::new(),
            style: OptionBag::new(),
            properties: Properties::new(),
        }
    }

    #[test]
    fn plans_once_per_node_and_binds_identity() {
        let styles = styles();
        let mut coordinator = EnrichmentCoordinator::new("id");
        coordinator.begin(3);

        let request = coordinator.plan(&node(1, 42, &["Sized"]), &styles).unwrap();
        assert_eq!(request.generation, 3);
        assert_eq!(request.query, "RETURN size($id)");
        assert_eq!(request.params.get("id"), Some(&json!(42)));

        assert!(coordinator.plan(&node(1, 42, &["Sized"]), &styles).is_none());
        assert!(coordinator.plan(&node(2, 43, &["Plain"]), &styles).is_none());
        assert_eq!(coordinator.outstanding(), 1);
    }

    #[test]
    fn settles_value_empty_and_failure() {
        let styles = styles();
        let mut coordinator = EnrichmentCoordinator::new("id");
        coordinator.begin(1);
        for i in 1..=3 {
            coordinator.plan(&node(i, i as i64, &["Sized"]), &styles);
        }

        let outcomes = [
            EnrichmentOutcome::Value(2.0),
            EnrichmentOutcome::Empty,
            EnrichmentOutcome::Failed("boom".to_string()),
        ];
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let result = EnrichmentResult {
                generation: 1,
                local_id: LocalId::new(i as u64 + 1),
                outcome,
            };
            assert!(coordinator.settle(&result).is_some());
            assert!(coordinator.settle(&result).is_none(), "settles only once");
        }

        assert_eq!(coordinator.outstanding(), 0);
        assert_eq!(coordinator.failed(), 1);
        assert_eq!(
            coordinator.task(LocalId::new(2)).unwrap().state,
            TaskState::Resolved { applied: false }
        );
    }

    #[test]
    fn stale_results_are_ignored() {
        let styles = styles();
        let mut coordinator = EnrichmentCoordinator::new("id");
        coordinator.begin(1);
        coordinator.plan(&node(1, 1, &["Sized"]), &styles);
        coordinator.begin(2);
        coordinator.plan(&node(1, 1, &["Sized"]), &styles);

        let stale = EnrichmentResult {
            generation: 1,
            local_id: LocalId::new(1),
            outcome: EnrichmentOutcome::Value(9.0),
        };
        assert!(coordinator.settle(&stale).is_none());
        assert_eq!(coordinator.outstanding(), 1);
    }

    #[test]
    fn read_value_shapes() {
        assert_eq!(read_value(&[]), Ok(None));
        assert_eq!(read_value(&[Record::scalar(1)]), Ok(Some(1.0)));
        assert_eq!(read_value(&[Record::scalar(2.5), Record::scalar(7)]), Ok(Some(2.5)));
        assert_eq!(read_value(&[Record::scalar(serde_json::Value::Null)]), Ok(None));
        assert!(read_value(&[Record::scalar("big")]).is_err());
    }
}
