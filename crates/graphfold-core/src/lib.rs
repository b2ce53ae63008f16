//! Graphfold: graph query results → deduplicated visualization dataset
//!
//! Ingests the records returned by a graph-database query (nodes,
//! relationships, paths, freely mixed) and folds them into a set of unique
//! nodes and unique edges that any renderer can draw.
//!
//! ```text
//! ┌──────────────┐   records   ┌──────────────┐ observations ┌────────────────┐
//! │ QueryRunner  │────────────►│ RecordWalker │─────────────►│ DatasetBuilder │
//! │  (external)  │             └──────────────┘              │  + registries  │
//! └──────────────┘                                           └───────┬────────┘
//!        ▲                                                   added/updated
//!        │ size queries      ┌───────────────────────┐               │
//!        └───────────────────│ EnrichmentCoordinator │◄──────────────┤
//!                            └───────────┬───────────┘               ▼
//!                                        │ settled           ┌──────────────┐
//!                                        └──────────────────►│  Completion  │
//!                                                            │   Tracker    │
//!                                                            └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Identity dedup**: an entity observed twice (bare, in a path, as a
//!   relationship endpoint) is stored once and merged.
//! - **No dangling edges**: every edge's endpoints are present as nodes.
//! - **Single writer**: all mutations happen on the task driving the render
//!   cycle; size queries only hand results back.
//! - **Completion once**: the completion event fires exactly once per cycle,
//!   after the primary stream and every size query have settled.

pub mod completion;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod fixture;
pub mod identity;
pub mod query;
pub mod value;
pub mod walker;

pub use completion::{CompletionState, CompletionTracker};
pub use config::{
    EffectiveConfig, EngineConfig, EntityConfigEntry, LabelPolicy, OptionBag, StyleConfig,
    DEFAULT_CONFIG_KEY,
};
pub use dataset::{
    Dataset, DatasetBuilder, DatasetSnapshot, GraphEdge, GraphNode, Mutation, SharedDataset,
    ValueSource,
};
pub use engine::{AbortHandle, GraphEngine, RenderSummary};
pub use enrichment::{EnrichmentCoordinator, EnrichmentTask, TaskState};
pub use error::{GraphError, Result};
pub use events::{EventBus, EventHandler, EventKind, GraphEvent};
pub use fixture::{FixtureRunner, FixtureSet, QueryFixture};
pub use identity::{IdentityRegistry, LocalId};
pub use query::{Params, QueryError, QueryRunner, RecordStream};
pub use value::{Identity, Node, Path, PathSegment, Record, Relationship, SegmentRelationship, Value};
pub use walker::{EdgeKey, Observation, RecordWalker};
