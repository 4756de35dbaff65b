//! # Action Stack
//!
//! Linear, branch-free undo/redo history.
//!
//! - `submit` applies, pushes onto undo-history and clears redo-history
//! - `undo` reverts the most recent action and moves it to redo-history
//! - `redo` re-applies the most recently undone action
//! - `reset` forgets everything (used at retrain boundaries)
//!
//! After every apply or revert the graph is re-checked; a broken selection
//! invariant is reported as `InconsistentSelection` and the transition is
//! rolled back with the action kept where it was. Removals that found
//! nothing to remove are not recorded.

use crate::action::{Action, ActionContext};
use crate::types::GraphError;
use tracing::{debug, error};

/// Undo and redo histories, most recent last.
#[derive(Debug, Default)]
pub struct ActionStack {
    undo: Vec<Action>,
    redo: Vec<Action>,
}

impl ActionStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action` and record it. Returns `false` when the action changed
    /// nothing and was not recorded; redo-history is then kept. On failure
    /// the action is discarded.
    pub fn submit(&mut self, mut action: Action, ctx: &mut ActionContext<'_>) -> Result<bool, GraphError> {
        action.apply(ctx)?;
        if let Err(e) = verify(ctx) {
            rollback(&mut action, ctx, Action::revert);
            return Err(e);
        }
        if action.is_noop() {
            debug!(action = %action.describe(), "no-op action not recorded");
            return Ok(false);
        }
        debug!(action = %action.describe(), depth = self.undo.len() + 1, "action submitted");
        self.undo.push(action);
        self.redo.clear();
        Ok(true)
    }

    /// Revert the most recent action.
    ///
    /// If the graph fails its consistency check afterwards, the action is
    /// re-applied and stays on undo-history.
    pub fn undo(&mut self, ctx: &mut ActionContext<'_>) -> Result<&Action, GraphError> {
        let mut action = self.undo.pop().ok_or(GraphError::EmptyHistory("undo"))?;
        if let Err(e) = action.revert(ctx) {
            self.undo.push(action);
            return Err(e);
        }
        if let Err(e) = verify(ctx) {
            rollback(&mut action, ctx, Action::apply);
            self.undo.push(action);
            return Err(e);
        }
        debug!(action = %action.describe(), "action undone");
        self.redo.push(action);
        self.redo.last().ok_or(GraphError::EmptyHistory("undo"))
    }

    /// Re-apply the most recently undone action.
    ///
    /// If the graph fails its consistency check afterwards, the action is
    /// reverted again and stays on redo-history.
    pub fn redo(&mut self, ctx: &mut ActionContext<'_>) -> Result<&Action, GraphError> {
        let mut action = self.redo.pop().ok_or(GraphError::EmptyHistory("redo"))?;
        if let Err(e) = action.apply(ctx) {
            self.redo.push(action);
            return Err(e);
        }
        if let Err(e) = verify(ctx) {
            rollback(&mut action, ctx, Action::revert);
            self.redo.push(action);
            return Err(e);
        }
        debug!(action = %action.describe(), "action redone");
        self.undo.push(action);
        self.undo.last().ok_or(GraphError::EmptyHistory("redo"))
    }

    /// Drop both histories. The graph is not touched.
    pub fn reset(&mut self) {
        debug!(undo = self.undo.len(), redo = self.redo.len(), "history reset");
        self.undo.clear();
        self.redo.clear();
    }

    /// Undo-history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.undo.iter().map(Action::describe).collect()
    }

    /// Redo-history, next redo first.
    #[must_use]
    pub fn redo_history(&self) -> Vec<String> {
        self.redo.iter().rev().map(Action::describe).collect()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
}

fn verify(ctx: &ActionContext<'_>) -> Result<(), GraphError> {
    ctx.graph.check_consistency().inspect_err(|e| {
        error!(error = %e, "graph invariant violated");
    })
}

/// Step `action` back to where it was before the failed transition.
fn rollback(
    action: &mut Action,
    ctx: &mut ActionContext<'_>,
    step: fn(&mut Action, &mut ActionContext<'_>) -> Result<(), GraphError>,
) {
    if let Err(e) = step(action, ctx) {
        error!(action = %action.describe(), error = %e, "rollback failed");
    }
}

// =============================================================================
// TESTS
// =============================================================================
