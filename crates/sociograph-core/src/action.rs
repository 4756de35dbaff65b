//! # Actions
//!
//! Reversible commands over a [`Graph`].
//!
//! An action carries its operands and, once applied, the record captured
//! from the graph that lets it be reverted literally. Lifecycle:
//!
//! ```text
//! Unapplied --apply--> Applied --revert--> Reverted --apply--> Applied ...
//! ```
//!
//! Any other transition is `InvalidTransition`. A failed `apply` leaves both
//! the graph and the action state unchanged.

use crate::graph::{EdgeInsertion, EdgeRemoval, Graph, NodeInsertion, NodeRemoval};
use crate::types::{Attributes, Edge, GraphError, NodeId, Selection, VersionId};
use crate::version::{SessionContext, VersionManager};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

// =============================================================================
// CONTEXT
// =============================================================================

/// Version collaborators an action may need. Only `Save` writes through them.
#[derive(Debug, Clone, Copy)]
pub struct VersionScope<'a> {
    pub manager: &'a VersionManager,
    pub context: &'a SessionContext,
}

/// Everything an action touches while applying or reverting.
#[derive(Debug)]
pub struct ActionContext<'a> {
    pub graph: &'a mut Graph,
    pub versions: Option<VersionScope<'a>>,
}

impl<'a> ActionContext<'a> {
    /// Context for purely structural work.
    pub fn graph_only(graph: &'a mut Graph) -> Self {
        Self {
            graph,
            versions: None,
        }
    }

    /// Context that can also persist through the version manager.
    pub fn with_versions(
        graph: &'a mut Graph,
        manager: &'a VersionManager,
        context: &'a SessionContext,
    ) -> Self {
        Self {
            graph,
            versions: Some(VersionScope { manager, context }),
        }
    }
}

// =============================================================================
// STATE AND KIND
// =============================================================================

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    Unapplied,
    Applied,
    Reverted,
}

impl ActionState {
    const fn name(self) -> &'static str {
        match self {
            ActionState::Unapplied => "unapplied",
            ActionState::Applied => "applied",
            ActionState::Reverted => "reverted",
        }
    }
}

/// Discriminant of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddNodes,
    AddEdges,
    RemoveNodes,
    RemoveEdges,
    Select,
    Deselect,
    ToggleNode,
    ToggleEdge,
    Save,
    Retrain,
}

impl ActionKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ActionKind::AddNodes => "add-node",
            ActionKind::AddEdges => "add-edge",
            ActionKind::RemoveNodes => "remove-node",
            ActionKind::RemoveEdges => "remove-edge",
            ActionKind::Select => "select",
            ActionKind::Deselect => "deselect",
            ActionKind::ToggleNode => "toggle-node",
            ActionKind::ToggleEdge => "toggle-edge",
            ActionKind::Save => "save",
            ActionKind::Retrain => "retrain",
        }
    }

    /// Whether the action changes nodes or edges (as opposed to selection only).
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            ActionKind::AddNodes
                | ActionKind::AddEdges
                | ActionKind::RemoveNodes
                | ActionKind::RemoveEdges
        )
    }
}

// =============================================================================
// ACTION
// =============================================================================

#[derive(Debug, Clone)]
enum Operation {
    AddNodes {
        nodes: Vec<(NodeId, Attributes)>,
        record: Option<NodeInsertion>,
    },
    AddEdges {
        edges: Vec<Edge>,
        record: Option<EdgeInsertion>,
    },
    RemoveNodes {
        ids: Vec<NodeId>,
        record: Option<NodeRemoval>,
    },
    RemoveEdges {
        edges: Vec<Edge>,
        record: Option<EdgeRemoval>,
    },
    Select {
        nodes: Vec<NodeId>,
        edges: Vec<Edge>,
        prior: Option<Selection>,
    },
    Deselect {
        prior: Option<Selection>,
    },
    ToggleNode {
        id: NodeId,
        prior: Option<Selection>,
    },
    ToggleEdge {
        edge: Edge,
        prior: Option<Selection>,
    },
    Save {
        prior: Option<Selection>,
        written: Option<PathBuf>,
    },
    Retrain {
        version: VersionId,
        prior: Option<Selection>,
    },
}

/// A reversible command.
#[derive(Debug, Clone)]
pub struct Action {
    op: Operation,
    state: ActionState,
}

impl Action {
    fn new(op: Operation) -> Self {
        Self {
            op,
            state: ActionState::Unapplied,
        }
    }

    /// Insert one node.
    #[must_use]
    pub fn add_node(id: impl Into<NodeId>, attributes: Attributes) -> Self {
        Self::add_nodes(vec![(id.into(), attributes)])
    }

    /// Insert several nodes at once.
    #[must_use]
    pub fn add_nodes(nodes: Vec<(NodeId, Attributes)>) -> Self {
        Self::new(Operation::AddNodes {
            nodes,
            record: None,
        })
    }

    /// Insert one edge.
    #[must_use]
    pub fn add_edge(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self::add_edges(vec![Edge::new(source, target)])
    }

    #[must_use]
    pub fn add_edges(edges: Vec<Edge>) -> Self {
        Self::new(Operation::AddEdges {
            edges,
            record: None,
        })
    }

    /// Remove nodes; an empty list removes the selected nodes.
    #[must_use]
    pub fn remove_nodes(ids: Vec<NodeId>) -> Self {
        Self::new(Operation::RemoveNodes { ids, record: None })
    }

    /// Remove edges; an empty list removes the selected edges.
    #[must_use]
    pub fn remove_edges(edges: Vec<Edge>) -> Self {
        Self::new(Operation::RemoveEdges {
            edges,
            record: None,
        })
    }

    /// Replace the selection.
    #[must_use]
    pub fn select(nodes: Vec<NodeId>, edges: Vec<Edge>) -> Self {
        Self::new(Operation::Select {
            nodes,
            edges,
            prior: None,
        })
    }

    #[must_use]
    pub fn deselect() -> Self {
        Self::new(Operation::Deselect { prior: None })
    }

    #[must_use]
    pub fn toggle_node(id: impl Into<NodeId>) -> Self {
        Self::new(Operation::ToggleNode {
            id: id.into(),
            prior: None,
        })
    }

    #[must_use]
    pub fn toggle_edge(edge: Edge) -> Self {
        Self::new(Operation::ToggleEdge { edge, prior: None })
    }

    /// Write the session slot of the active version.
    #[must_use]
    pub fn save() -> Self {
        Self::new(Operation::Save {
            prior: None,
            written: None,
        })
    }

    /// History marker for a completed retrain that produced `version`.
    #[must_use]
    pub fn retrain_marker(version: VersionId) -> Self {
        Self::new(Operation::Retrain {
            version,
            prior: None,
        })
    }

    // ===== ACCESSORS =====

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match &self.op {
            Operation::AddNodes { .. } => ActionKind::AddNodes,
            Operation::AddEdges { .. } => ActionKind::AddEdges,
            Operation::RemoveNodes { .. } => ActionKind::RemoveNodes,
            Operation::RemoveEdges { .. } => ActionKind::RemoveEdges,
            Operation::Select { .. } => ActionKind::Select,
            Operation::Deselect { .. } => ActionKind::Deselect,
            Operation::ToggleNode { .. } => ActionKind::ToggleNode,
            Operation::ToggleEdge { .. } => ActionKind::ToggleEdge,
            Operation::Save { .. } => ActionKind::Save,
            Operation::Retrain { .. } => ActionKind::Retrain,
        }
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        self.state
    }

    /// An applied removal that found nothing to remove.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        if self.state != ActionState::Applied {
            return false;
        }
        match &self.op {
            Operation::RemoveNodes {
                record: Some(record),
                ..
            } => record.is_empty(),
            Operation::RemoveEdges {
                record: Some(record),
                ..
            } => record.is_empty(),
            _ => false,
        }
    }

    /// Human-readable summary for history listings.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.op {
            Operation::AddNodes { nodes, .. } => match nodes.as_slice() {
                [(id, _)] => format!("add-node {}", id),
                many => format!("add-node ({} nodes)", many.len()),
            },
            Operation::AddEdges { edges, .. } => match edges.as_slice() {
                [edge] => format!("add-edge {} {}", edge.source, edge.target),
                many => format!("add-edge ({} edges)", many.len()),
            },
            Operation::RemoveNodes { ids, record } => {
                let count = record.as_ref().map_or(ids.len(), |r| r.nodes.len());
                if ids.is_empty() && record.is_none() {
                    "remove-node (selection)".to_string()
                } else {
                    format!("remove-node ({} nodes)", count)
                }
            }
            Operation::RemoveEdges { edges, record } => {
                let count = record.as_ref().map_or(edges.len(), |r| r.edges.len());
                if edges.is_empty() && record.is_none() {
                    "remove-edge (selection)".to_string()
                } else {
                    format!("remove-edge ({} edges)", count)
                }
            }
            Operation::Select { nodes, edges, .. } => {
                format!("select ({} nodes, {} edges)", nodes.len(), edges.len())
            }
            Operation::Deselect { .. } => "deselect".to_string(),
            Operation::ToggleNode { id, .. } => format!("toggle {}", id),
            Operation::ToggleEdge { edge, .. } => {
                format!("toggle {} {}", edge.source, edge.target)
            }
            Operation::Save { .. } => "save".to_string(),
            Operation::Retrain { version, .. } => format!("retrain -> {}", version),
        }
    }

    // ===== LIFECYCLE =====

    /// Perform the action and capture its revert record.
    pub fn apply(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), GraphError> {
        if self.state == ActionState::Applied {
            return Err(GraphError::InvalidTransition {
                operation: "apply",
                state: self.state.name(),
            });
        }
        let graph = &mut *ctx.graph;
        match &mut self.op {
            Operation::AddNodes { nodes, record } => {
                *record = Some(graph.add_nodes(nodes.clone())?);
            }
            Operation::AddEdges { edges, record } => {
                *record = Some(graph.add_edges(edges.clone())?);
            }
            Operation::RemoveNodes { ids, record } => {
                *record = Some(graph.remove_nodes(ids)?);
            }
            Operation::RemoveEdges { edges, record } => {
                *record = Some(graph.remove_edges(edges)?);
            }
            Operation::Select {
                nodes,
                edges,
                prior,
            } => {
                *prior = Some(graph.select(nodes, edges)?);
            }
            Operation::Deselect { prior } => {
                *prior = Some(graph.deselect());
            }
            Operation::ToggleNode { id, prior } => {
                let before = graph.selection().clone();
                graph.toggle_node_selection(id)?;
                *prior = Some(before);
            }
            Operation::ToggleEdge { edge, prior } => {
                let before = graph.selection().clone();
                graph.toggle_edge_selection(edge)?;
                *prior = Some(before);
            }
            Operation::Save { prior, written } => {
                let scope = ctx
                    .versions
                    .ok_or_else(|| GraphError::UnknownVersion("no active version".to_string()))?;
                let path = scope.manager.save(scope.context, graph.state())?;
                info!(path = %path.display(), "session saved");
                *written = Some(path);
                *prior = Some(graph.selection().clone());
            }
            Operation::Retrain { prior, .. } => {
                *prior = Some(graph.selection().clone());
            }
        }
        self.state = ActionState::Applied;
        Ok(())
    }

    /// Undo the action using the record captured by the last `apply`.
    pub fn revert(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), GraphError> {
        if self.state != ActionState::Applied {
            return Err(GraphError::InvalidTransition {
                operation: "revert",
                state: self.state.name(),
            });
        }
        let graph = &mut *ctx.graph;
        let missing = || GraphError::InvalidTransition {
            operation: "revert",
            state: "unrecorded",
        };
        match &self.op {
            Operation::AddNodes { record, .. } => {
                graph.retract_nodes(record.as_ref().ok_or_else(missing)?);
            }
            Operation::AddEdges { record, .. } => {
                graph.retract_edges(record.as_ref().ok_or_else(missing)?);
            }
            Operation::RemoveNodes { record, .. } => {
                graph.restore_nodes(record.as_ref().ok_or_else(missing)?);
            }
            Operation::RemoveEdges { record, .. } => {
                graph.restore_edges(record.as_ref().ok_or_else(missing)?);
            }
            Operation::Select { prior, .. }
            | Operation::Deselect { prior }
            | Operation::ToggleNode { prior, .. }
            | Operation::ToggleEdge { prior, .. }
            | Operation::Save { prior, .. }
            | Operation::Retrain { prior, .. } => {
                graph.restore_selection(prior.clone().ok_or_else(missing)?);
            }
        }
        self.state = ActionState::Reverted;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
