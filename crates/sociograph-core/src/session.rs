//! # Session
//!
//! One editing session over one subject.
//!
//! The session owns the [`Graph`], the [`ActionStack`], the
//! [`VersionManager`] with its [`SessionContext`], and at most one running
//! retrain. Every command goes through here, so the interlocks live here:
//!
//! - While a retrain is in flight, structural edits and undo/redo return
//!   `RetrainInFlight`; selection commands and `save` still work
//! - A completed retrain commits a new version, resets history and pushes a
//!   `retrain` marker as the first entry of the new history
//! - A failed or cancelled retrain leaves versions and history untouched

use crate::action::{Action, ActionContext};
use crate::export::{RenderView, TrainingInput};
use crate::graph::{Graph, GraphState, SelectionObserver};
use crate::metrics::GraphMetrics;
use crate::stack::ActionStack;
use crate::training::{RetrainJob, Trainer, TrainingOutcome, TrainingRequest};
use crate::types::{Attributes, Edge, GraphError, NodeId, Position, SubjectId, VersionId};
use crate::version::{SessionContext, VersionManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a completed retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub version: VersionId,
    pub parent: Option<VersionId>,
    pub trainer: String,
    pub model_artifact: Option<String>,
    pub predicted_edges: Vec<Edge>,
}

#[derive(Debug)]
struct PendingRetrain {
    job: RetrainJob,
    trainer: String,
}

/// The editing session.
#[derive(Debug)]
pub struct Session {
    graph: Graph,
    stack: ActionStack,
    versions: VersionManager,
    context: SessionContext,
    retrain: Option<PendingRetrain>,
    predictions: Vec<Edge>,
}

impl Session {
    /// Resume the current version of `subject`, or bootstrap `v0` from `source`.
    ///
    /// `source` is only used when the subject has no versions yet; `None`
    /// then bootstraps an empty graph.
    pub fn open(
        versions: VersionManager,
        subject: SubjectId,
        source: Option<GraphState>,
    ) -> Result<Self, GraphError> {
        let mut context = versions.open_session(&subject)?;
        let state = match context.current() {
            Some(current) => {
                if source.is_some() {
                    warn!(subject = %subject, version = %current, "subject already has versions, ignoring source graph");
                }
                versions.load(&subject, current)?
            }
            None => {
                let state = source.unwrap_or_default();
                versions.bootstrap(&mut context, &state)?;
                state
            }
        };
        let graph = Graph::from_state(state)?;
        let predictions = stored_predictions(&versions, &context);

        info!(
            subject = %subject,
            version = ?context.current(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "session opened"
        );
        Ok(Self {
            graph,
            stack: ActionStack::new(),
            versions,
            context,
            retrain: None,
            predictions,
        })
    }

    // ===== READ ACCESS =====

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    #[must_use]
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// Undo-history labels, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.stack.history()
    }

    /// Redo-history labels, next redo first.
    #[must_use]
    pub fn redo_history(&self) -> Vec<String> {
        self.stack.redo_history()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }

    /// Edges predicted by the retrain that produced the current version.
    #[must_use]
    pub fn predicted_edges(&self) -> &[Edge] {
        &self.predictions
    }

    #[must_use]
    pub fn metrics(&self) -> GraphMetrics {
        GraphMetrics::from_graph(&self.graph)
    }

    #[must_use]
    pub fn render_view(&self) -> RenderView {
        RenderView::from_graph(&self.graph)
    }

    #[must_use]
    pub fn training_input(&self) -> TrainingInput {
        TrainingInput::from_graph(&self.graph)
    }

    #[must_use]
    pub fn is_retraining(&self) -> bool {
        self.retrain.is_some()
    }

    /// Version the running retrain will produce.
    #[must_use]
    pub fn retrain_target(&self) -> Option<VersionId> {
        self.retrain.as_ref().map(|p| p.job.target())
    }

    /// Register a selection observer on the graph.
    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.graph.subscribe(observer);
    }

    /// Record a layout position. Not part of history.
    pub fn set_position(&mut self, id: &NodeId, position: Position) -> Result<(), GraphError> {
        self.graph.set_position(id, position)
    }

    // ===== COMMANDS =====

    fn ensure_idle(&self) -> Result<(), GraphError> {
        if self.retrain.is_some() {
            return Err(GraphError::RetrainInFlight);
        }
        Ok(())
    }

    fn submit(&mut self, action: Action) -> Result<(), GraphError> {
        if action.kind().is_structural() {
            self.ensure_idle()?;
        }
        let label = action.describe();
        let mut ctx = ActionContext::with_versions(&mut self.graph, &self.versions, &self.context);
        if self.stack.submit(action, &mut ctx)? {
            info!(action = %label, "edit committed");
        } else {
            info!(action = %label, "nothing changed, history untouched");
        }
        Ok(())
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, attributes: Attributes) -> Result<(), GraphError> {
        self.submit(Action::add_node(id, attributes))
    }

    pub fn add_nodes(&mut self, nodes: Vec<(NodeId, Attributes)>) -> Result<(), GraphError> {
        self.submit(Action::add_nodes(nodes))
    }

    pub fn add_edge(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Result<(), GraphError> {
        self.submit(Action::add_edge(source, target))
    }

    pub fn add_edges(&mut self, edges: Vec<Edge>) -> Result<(), GraphError> {
        self.submit(Action::add_edges(edges))
    }

    /// Remove nodes; an empty list removes the selected nodes.
    pub fn remove_nodes(&mut self, ids: Vec<NodeId>) -> Result<(), GraphError> {
        self.submit(Action::remove_nodes(ids))
    }

    /// Remove edges; an empty list removes the selected edges.
    pub fn remove_edges(&mut self, edges: Vec<Edge>) -> Result<(), GraphError> {
        self.submit(Action::remove_edges(edges))
    }

    pub fn select(&mut self, nodes: Vec<NodeId>, edges: Vec<Edge>) -> Result<(), GraphError> {
        self.submit(Action::select(nodes, edges))
    }

    pub fn deselect(&mut self) -> Result<(), GraphError> {
        self.submit(Action::deselect())
    }

    pub fn toggle_node(&mut self, id: impl Into<NodeId>) -> Result<(), GraphError> {
        self.submit(Action::toggle_node(id))
    }

    pub fn toggle_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        self.submit(Action::toggle_edge(edge))
    }

    /// Write the current graph into the session slot of the active version.
    pub fn save(&mut self) -> Result<(), GraphError> {
        self.submit(Action::save())
    }

    /// Undo the most recent action. Returns its label.
    pub fn undo(&mut self) -> Result<String, GraphError> {
        self.ensure_idle()?;
        let mut ctx = ActionContext::with_versions(&mut self.graph, &self.versions, &self.context);
        let label = self.stack.undo(&mut ctx)?.describe();
        info!(action = %label, "undo");
        Ok(label)
    }

    /// Redo the most recently undone action. Returns its label.
    pub fn redo(&mut self) -> Result<String, GraphError> {
        self.ensure_idle()?;
        let mut ctx = ActionContext::with_versions(&mut self.graph, &self.versions, &self.context);
        let label = self.stack.redo(&mut ctx)?.describe();
        info!(action = %label, "redo");
        Ok(label)
    }

    // ===== VERSIONS =====

    /// Load another version and make it current. History is cleared.
    pub fn activate_version(&mut self, version: VersionId) -> Result<(), GraphError> {
        self.ensure_idle()?;
        let state = self.versions.load(self.context.subject(), version)?;
        state.check_consistency()?;
        self.versions.activate(&mut self.context, version)?;
        self.graph.replace_state(state)?;
        self.stack.reset();
        self.predictions = stored_predictions(&self.versions, &self.context);
        Ok(())
    }

    // ===== RETRAIN =====

    /// Export the graph and start `trainer` on a worker thread.
    ///
    /// Returns the version the retrain will create on success.
    pub fn start_retrain(&mut self, trainer: Arc<dyn Trainer>) -> Result<VersionId, GraphError> {
        self.ensure_idle()?;
        let target = self.versions.allocate_version(self.context.subject())?;
        let request = TrainingRequest {
            subject: self.context.subject().clone(),
            base_version: self.context.current(),
            target_version: target,
            input: self.training_input(),
        };
        let name = trainer.name().to_string();
        let job = RetrainJob::spawn(trainer, request)?;
        info!(trainer = %name, target = %target, "retrain started");
        self.retrain = Some(PendingRetrain { job, trainer: name });
        Ok(target)
    }

    /// Check whether the running retrain finished, and commit it if so.
    ///
    /// `Ok(None)` while it is still running.
    pub fn poll_retrain(&mut self) -> Result<Option<RetrainReport>, GraphError> {
        let pending = self.retrain.as_mut().ok_or(GraphError::NoRetrainJob)?;
        let Some(result) = pending.job.try_poll() else {
            return Ok(None);
        };
        let trainer = self
            .retrain
            .take()
            .map(|p| p.trainer)
            .unwrap_or_default();
        self.complete_retrain(&trainer, result).map(Some)
    }

    /// Block until the running retrain finishes and commit it.
    pub fn wait_retrain(&mut self) -> Result<RetrainReport, GraphError> {
        let PendingRetrain { job, trainer } = self.retrain.take().ok_or(GraphError::NoRetrainJob)?;
        let result = job.wait();
        self.complete_retrain(&trainer, result)
    }

    /// Abandon the running retrain. Its result is discarded.
    pub fn cancel_retrain(&mut self) -> Result<(), GraphError> {
        let pending = self.retrain.take().ok_or(GraphError::NoRetrainJob)?;
        pending.job.cancel();
        info!(target = %pending.job.target(), "retrain cancelled");
        Ok(())
    }

    /// Start a retrain and wait for it.
    pub fn retrain(&mut self, trainer: Arc<dyn Trainer>) -> Result<RetrainReport, GraphError> {
        self.start_retrain(trainer)?;
        self.wait_retrain()
    }

    fn complete_retrain(
        &mut self,
        trainer: &str,
        result: Result<TrainingOutcome, GraphError>,
    ) -> Result<RetrainReport, GraphError> {
        let mut outcome = result.inspect_err(|e| warn!(error = %e, "retrain did not complete"))?;
        let graph = &self.graph;
        outcome.predicted_edges.retain(|e| {
            let known = graph.contains_node(&e.source) && graph.contains_node(&e.target);
            if !known {
                warn!(edge = %e, "prediction references an unknown node, dropping");
            }
            known
        });

        let parent = self.context.current();
        let version = self.versions.commit_retrain(
            &mut self.context,
            self.graph.state(),
            trainer,
            &outcome,
        )?;
        self.stack.reset();
        let mut ctx = ActionContext::with_versions(&mut self.graph, &self.versions, &self.context);
        self.stack.submit(Action::retrain_marker(version), &mut ctx)?;
        self.predictions = outcome.predicted_edges.clone();

        info!(version = %version, predicted = outcome.predicted_edges.len(), "retrain committed");
        Ok(RetrainReport {
            version,
            parent,
            trainer: trainer.to_string(),
            model_artifact: outcome.model_artifact,
            predicted_edges: outcome.predicted_edges,
        })
    }
}

fn stored_predictions(versions: &VersionManager, context: &SessionContext) -> Vec<Edge> {
    let Some(current) = context.current() else {
        return Vec::new();
    };
    match versions.manifest(context.subject(), current) {
        Ok(manifest) => manifest.predicted_edges,
        Err(e) => {
            warn!(version = %current, error = %e, "manifest unreadable, no stored predictions");
            Vec::new()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
