//! Render-cycle orchestration.
//!
//! One task owns every mutation. Size queries run concurrently in a
//! [`JoinSet`], but only their results come back to the owning loop, which
//! `select!`s between the next primary record, the next settled size query
//! and an abort request. Mutations are therefore applied one at a time and
//! no lock is held while handlers run.

use crate::completion::{CompletionState, CompletionTracker};
use crate::config::{EngineConfig, StyleConfig};
use crate::dataset::{Dataset, DatasetBuilder, Mutation, SharedDataset};
use crate::enrichment::{EnrichmentCoordinator, EnrichmentOutcome, EnrichmentResult};
use crate::error::{GraphError, Result};
use crate::events::{EventBus, EventHandler, EventKind, GraphEvent};
use crate::query::{Params, QueryError, QueryRunner, RecordStream};
use crate::value::Record;
use crate::walker::RecordWalker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

/// Outcome of one render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub generation: u64,
    pub record_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub enrichments_issued: usize,
    pub enrichments_failed: usize,
}

/// Aborts whichever render cycle is running when [`AbortHandle::abort`] is
/// called. Requests made while no cycle runs are ignored.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_modify(|n| *n = n.wrapping_add(1));
    }
}

enum Step {
    Record(Option<std::result::Result<Record, QueryError>>),
    Enriched(Option<std::result::Result<EnrichmentResult, JoinError>>),
    Abort,
}

async fn next_record(
    stream: &mut Option<RecordStream>,
) -> Option<std::result::Result<Record, QueryError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Builds and maintains a deduplicated graph dataset from query results.
pub struct GraphEngine {
    config: EngineConfig,
    query: String,
    styles: Arc<StyleConfig>,
    builder: DatasetBuilder,
    runner: Arc<dyn QueryRunner>,
    dataset: SharedDataset,
    events: EventBus,
    coordinator: EnrichmentCoordinator,
    tracker: CompletionTracker,
    generation: u64,
    abort_tx: Arc<watch::Sender<u64>>,
}

impl GraphEngine {
    /// Merge the label/relationship options once; malformed options fail
    /// construction.
    pub fn new(config: EngineConfig, runner: Arc<dyn QueryRunner>) -> Result<Self> {
        let styles = Arc::new(StyleConfig::from_engine_config(&config)?);
        let (abort_tx, _) = watch::channel(0);
        Ok(Self {
            query: config.initial_query.clone(),
            builder: DatasetBuilder::new(Arc::clone(&styles)),
            coordinator: EnrichmentCoordinator::new(config.enrichment_parameter.clone()),
            styles,
            config,
            runner,
            dataset: Dataset::shared(),
            events: EventBus::new(),
            tracker: CompletionTracker::new(),
            generation: 0,
            abort_tx: Arc::new(abort_tx),
        })
    }

    /// Register a handler for one kind of event.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        self.events.on(kind, handler);
    }

    pub fn dataset(&self) -> SharedDataset {
        Arc::clone(&self.dataset)
    }

    pub fn styles(&self) -> &StyleConfig {
        &self.styles
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Query run by `render` and `reload`.
    pub fn current_query(&self) -> &str {
        &self.query
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn completion_state(&self) -> CompletionState {
        self.tracker.state()
    }

    pub fn enrichment(&self) -> &EnrichmentCoordinator {
        &self.coordinator
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: Arc::clone(&self.abort_tx),
        }
    }

    /// Clear the dataset and ingest the current query.
    pub async fn render(&mut self) -> Result<RenderSummary> {
        let query = self.query.clone();
        self.run_cycle(&query, true).await
    }

    /// Replace the current query, then `render`.
    pub async fn render_with_query(&mut self, query: &str) -> Result<RenderSummary> {
        self.query = query.to_string();
        self.render().await
    }

    /// Fold `query`'s results into the existing dataset without clearing
    /// it. The current query is left unchanged.
    pub async fn update_with_query(&mut self, query: &str) -> Result<RenderSummary> {
        self.run_cycle(query, false).await
    }

    /// Re-run the current query from an empty dataset.
    pub async fn reload(&mut self) -> Result<RenderSummary> {
        self.render().await
    }

    /// Empty the dataset and forget all size-query tasks.
    pub fn clear(&mut self) {
        self.dataset.write().clear();
        self.coordinator.begin(self.generation);
    }

    async fn run_cycle(&mut self, query: &str, clear: bool) -> Result<RenderSummary> {
        self.generation += 1;
        let generation = self.generation;
        if clear {
            self.dataset.write().clear();
        }
        self.coordinator.begin(generation);
        self.tracker.begin();

        let mut abort_rx = self.abort_tx.subscribe();
        abort_rx.borrow_and_update();

        let mut params = Params::new();
        params.insert("limit".to_string(), self.config.query_limit.into());
        tracing::debug!(generation, query, clear, "render cycle started");

        let runner = Arc::clone(&self.runner);
        let opened = tokio::select! {
            biased;
            Ok(()) = abort_rx.changed() => None,
            opened = runner.run(query, params) => Some(opened),
        };
        let Some(opened) = opened else {
            return Err(self.abort_cycle(generation, JoinSet::new()));
        };

        let mut failure = None;
        let mut primary = match opened {
            Ok(stream) => Some(stream),
            Err(e) => {
                self.primary_failed(generation, &e);
                failure = Some(e);
                None
            }
        };

        let mut in_flight: JoinSet<EnrichmentResult> = JoinSet::new();
        let mut record_count = 0;

        loop {
            if self.tracker.try_complete() {
                self.emit_completion(generation, record_count);
            }
            if primary.is_none() && in_flight.is_empty() {
                break;
            }

            let step = tokio::select! {
                biased;
                Ok(()) = abort_rx.changed() => Step::Abort,
                joined = in_flight.join_next(), if !in_flight.is_empty() => Step::Enriched(joined),
                item = next_record(&mut primary), if primary.is_some() => Step::Record(item),
            };

            match step {
                Step::Abort => return Err(self.abort_cycle(generation, in_flight)),
                Step::Record(Some(Ok(record))) => {
                    record_count += 1;
                    self.ingest(&record, &mut in_flight);
                }
                Step::Record(Some(Err(e))) => {
                    self.primary_failed(generation, &e);
                    failure = Some(e);
                    primary = None;
                }
                Step::Record(None) => {
                    tracing::debug!(generation, record_count, "primary stream exhausted");
                    self.tracker.primary_done();
                    primary = None;
                }
                Step::Enriched(Some(Ok(result))) => self.apply_enrichment(result),
                Step::Enriched(Some(Err(e))) => {
                    tracing::error!(generation, error = %e, "size query task did not finish");
                }
                Step::Enriched(None) => {}
            }
        }

        // tasks whose futures died without reporting must not block completion
        let orphaned = self.coordinator.fail_pending("size query task did not finish");
        for _ in 0..orphaned {
            self.tracker.task_settled();
        }
        if self.tracker.try_complete() {
            self.emit_completion(generation, record_count);
        }

        if let Some(e) = failure {
            return Err(GraphError::Ingestion(e));
        }

        let dataset = self.dataset.read();
        Ok(RenderSummary {
            generation,
            record_count,
            node_count: dataset.node_count(),
            edge_count: dataset.edge_count(),
            enrichments_issued: self.coordinator.issued(),
            enrichments_failed: self.coordinator.failed(),
        })
    }

    fn ingest(&mut self, record: &Record, in_flight: &mut JoinSet<EnrichmentResult>) {
        for observation in RecordWalker::walk(record) {
            let applied = {
                let mut dataset = self.dataset.write();
                self.builder
                    .apply(&mut dataset, observation)
                    .map(|mutation| mutation.and_then(|m| snapshot(&dataset, m)))
            };

            match applied {
                Ok(Some(event)) => {
                    if let GraphEvent::NodeAdded(node) | GraphEvent::NodeUpdated(node) = &event {
                        if let Some(request) = self.coordinator.plan(node, &self.styles) {
                            tracing::debug!(
                                local_id = %request.local_id,
                                identity = %request.identity,
                                "issuing size query"
                            );
                            self.tracker.task_started();
                            in_flight.spawn(request.execute(Arc::clone(&self.runner)));
                        }
                    }
                    self.events.emit(&event);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "dropping observation");
                    self.events.emit(&GraphEvent::Warning {
                        generation: self.generation,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn apply_enrichment(&mut self, result: EnrichmentResult) {
        if self.coordinator.settle(&result).is_none() {
            return;
        }
        self.tracker.task_settled();

        match result.outcome {
            EnrichmentOutcome::Value(value) => {
                let event = {
                    let mut dataset = self.dataset.write();
                    if dataset.set_node_value(result.local_id, value) {
                        dataset
                            .node(result.local_id)
                            .cloned()
                            .map(GraphEvent::NodeUpdated)
                    } else {
                        None
                    }
                };
                if let Some(event) = event {
                    self.events.emit(&event);
                }
            }
            EnrichmentOutcome::Empty => {
                tracing::debug!(local_id = %result.local_id, "size query returned no rows");
            }
            EnrichmentOutcome::Failed(message) => {
                let err = GraphError::Enrichment {
                    local_id: result.local_id,
                    message,
                };
                tracing::warn!(error = %err, "size query failed");
                self.events.emit(&GraphEvent::Warning {
                    generation: result.generation,
                    message: err.to_string(),
                });
            }
        }
    }

    fn primary_failed(&mut self, generation: u64, error: &QueryError) {
        tracing::warn!(generation, error = %error, "primary query failed");
        self.tracker.primary_done();
        self.events.emit(&GraphEvent::Error {
            generation,
            message: error.to_string(),
        });
    }

    fn emit_completion(&self, generation: u64, record_count: usize) {
        let (node_count, edge_count) = {
            let dataset = self.dataset.read();
            (dataset.node_count(), dataset.edge_count())
        };
        tracing::debug!(generation, record_count, node_count, edge_count, "render cycle complete");
        self.events.emit(&GraphEvent::Completion {
            generation,
            record_count,
            node_count,
            edge_count,
        });
    }

    fn abort_cycle(&mut self, generation: u64, mut in_flight: JoinSet<EnrichmentResult>) -> GraphError {
        in_flight.abort_all();
        // anything still reporting for the aborted cycle is now stale
        self.generation += 1;
        self.coordinator.begin(self.generation);
        tracing::debug!(generation, "render cycle aborted");
        GraphError::Aborted { generation }
    }
}

/// Event describing `mutation`, carrying a copy of the entity.
fn snapshot(dataset: &Dataset, mutation: Mutation) -> Option<GraphEvent> {
    match mutation {
        Mutation::NodeAdded(id) => dataset.node(id).cloned().map(GraphEvent::NodeAdded),
        Mutation::NodeUpdated(id) => dataset.node(id).cloned().map(GraphEvent::NodeUpdated),
        Mutation::EdgeAdded(id) => dataset.edge(id).cloned().map(GraphEvent::EdgeAdded),
        Mutation::EdgeUpdated(id) => dataset.edge(id).cloned().map(GraphEvent::EdgeUpdated),
    }
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("query", &self.query)
            .field("generation", &self.generation)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
