//! Typed publish/subscribe for dataset mutations and cycle outcomes.
//!
//! Handlers run synchronously on the engine's task, in registration order,
//! after the mutation they describe is visible in the dataset.

use crate::dataset::{GraphEdge, GraphNode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NodeAdded,
    NodeUpdated,
    EdgeAdded,
    EdgeUpdated,
    Completion,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded(GraphNode),
    NodeUpdated(GraphNode),
    EdgeAdded(GraphEdge),
    EdgeUpdated(GraphEdge),
    /// Fires once per render cycle, after every mutation of the cycle.
    Completion {
        generation: u64,
        record_count: usize,
        node_count: usize,
        edge_count: usize,
    },
    /// The primary record stream failed.
    Error { generation: u64, message: String },
    /// A per-entity problem that did not stop the cycle.
    Warning { generation: u64, message: String },
}

impl GraphEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GraphEvent::NodeAdded(_) => EventKind::NodeAdded,
            GraphEvent::NodeUpdated(_) => EventKind::NodeUpdated,
            GraphEvent::EdgeAdded(_) => EventKind::EdgeAdded,
            GraphEvent::EdgeUpdated(_) => EventKind::EdgeUpdated,
            GraphEvent::Completion { .. } => EventKind::Completion,
            GraphEvent::Error { .. } => EventKind::Error,
            GraphEvent::Warning { .. } => EventKind::Warning,
        }
    }
}

/// Callback for graph events
pub type EventHandler = Box<dyn Fn(&GraphEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(EventKind, EventHandler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.push((kind, handler));
    }

    pub fn has_handlers(&self, kind: EventKind) -> bool {
        self.handlers.iter().any(|(k, _)| *k == kind)
    }

    pub fn emit(&self, event: &GraphEvent) {
        let kind = event.kind();
        for (_, handler) in self.handlers.iter().filter(|(k, _)| *k == kind) {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
