//! # sociograph-core
//!
//! Graph mutation engine for attributed social graphs.
//!
//! An editing [`Session`] wraps one subject's graph. Every change is an
//! [`Action`] on an [`ActionStack`], so it can be undone and redone.
//! Snapshots live under a version root as `{root}/{subject}/v{n}/`; a
//! retrain hands the graph to a [`Trainer`] on a worker thread and commits
//! the result as the next version.
//!
//! ## Layers
//!
//! - `types`, `schema`, `graph`: the attributed graph and its selection
//! - `action`, `stack`: reversible commands and their history
//! - `formats`, `storage`, `version`: checkpoints and the version registry
//! - `export`, `metrics`, `training`: views for trainers and renderers
//! - `loader`: node-link JSON import
//! - `session`: the orchestrator
//!
//! The crate has no async runtime and no network dependencies.

// =============================================================================
// MODULES
// =============================================================================

pub mod action;
pub mod export;
pub mod formats;
pub mod graph;
pub mod loader;
pub mod metrics;
pub mod primitives;
pub mod schema;
pub mod session;
pub mod stack;
pub mod storage;
pub mod training;
pub mod types;
pub mod version;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    AttrKind, AttrValue, Attributes, Edge, ErrorKind, GraphError, NodeId, Position, Selection,
    SubjectId, VersionId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use action::{Action, ActionContext, ActionKind, ActionState};
pub use graph::{Graph, GraphState, SelectionObserver};
pub use schema::AttributeSchema;
pub use session::{RetrainReport, Session};
pub use stack::ActionStack;

// =============================================================================
// RE-EXPORTS: Persistence and Versions
// =============================================================================

pub use formats::{CheckpointFormat, state_from_bytes, state_to_bytes};
pub use storage::VersionRegistry;
pub use version::{SessionContext, VersionManager, VersionManifest, VersionOrigin};

// =============================================================================
// RE-EXPORTS: Collaborators
// =============================================================================

pub use export::{RenderEdge, RenderNode, RenderView, TrainingInput};
pub use loader::{LoadReport, attr_from_json, load_node_link, load_node_link_file};
pub use metrics::GraphMetrics;
pub use training::{
    CancelToken, CommandTrainer, RetrainJob, SimilarityTrainer, Trainer, TrainingOutcome,
    TrainingRequest,
};
