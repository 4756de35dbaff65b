//! # Graph Model
//!
//! The attributed graph, its selection and its layout.
//!
//! `Graph` is the only mutator of structure. Every mutating method is
//! all-or-nothing: validation happens before the first write, so an error
//! leaves the state untouched. Removals cascade incident edges, layout
//! entries and selection in the same call.
//!
//! Each structural mutation returns a record holding exactly what is needed
//! to reverse it. The reversal primitives are crate-visible and used by
//! [`crate::action`] only.

use crate::schema::AttributeSchema;
use crate::types::{AttrKind, Attributes, Edge, GraphError, NodeId, Position, Selection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

// =============================================================================
// SELECTION OBSERVER
// =============================================================================

/// Receives the new selection after every selection change.
///
/// Observers are called synchronously, in registration order, once the
/// mutation is complete.
pub trait SelectionObserver: Send + Sync {
    fn selection_changed(&mut self, selection: &Selection);
}

impl<F> SelectionObserver for F
where
    F: FnMut(&Selection) + Send + Sync,
{
    fn selection_changed(&mut self, selection: &Selection) {
        self(selection);
    }
}

// =============================================================================
// GRAPH STATE
// =============================================================================

/// Plain graph data. Equality of two states is the state equality used by
/// undo/redo.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphState {
    pub(crate) nodes: BTreeMap<NodeId, Attributes>,
    pub(crate) edges: BTreeSet<Edge>,
    pub(crate) selection: Selection,
    pub(crate) layout: BTreeMap<NodeId, Position>,
    pub(crate) schema: AttributeSchema,
}

impl GraphState {
    /// Assemble a state with an empty selection and no layout.
    #[must_use]
    pub fn from_parts(
        nodes: BTreeMap<NodeId, Attributes>,
        edges: BTreeSet<Edge>,
        schema: AttributeSchema,
    ) -> Self {
        Self {
            nodes,
            edges,
            selection: Selection::new(),
            layout: BTreeMap::new(),
            schema,
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Verify that no edge dangles and the selection only references
    /// entities that exist.
    pub fn check_consistency(&self) -> Result<(), GraphError> {
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                return Err(GraphError::InconsistentSelection(format!(
                    "edge {} references a missing node",
                    edge
                )));
            }
        }
        for node in self.selection.nodes() {
            if !self.nodes.contains_key(node) {
                return Err(GraphError::InconsistentSelection(format!(
                    "selected node '{}' is not in the graph",
                    node
                )));
            }
        }
        for edge in self.selection.edges() {
            if self.find_edge(edge).is_none() {
                return Err(GraphError::InconsistentSelection(format!(
                    "selected edge {} is not in the graph",
                    edge
                )));
            }
        }
        if let Some(id) = self.layout.keys().find(|id| !self.nodes.contains_key(*id)) {
            return Err(GraphError::InconsistentSelection(format!(
                "layout references missing node '{}'",
                id
            )));
        }
        Ok(())
    }

    /// The stored edge matching `edge` in either direction.
    fn find_edge(&self, edge: &Edge) -> Option<&Edge> {
        self.edges
            .get(edge)
            .or_else(|| self.edges.get(&edge.reversed()))
    }
}

// =============================================================================
// REVERT RECORDS
// =============================================================================

/// What an `add_nodes` call changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInsertion {
    pub ids: Vec<NodeId>,
    /// Attribute names first declared by this insertion.
    pub declared: Vec<String>,
    pub prior_selection: Selection,
}

/// What an `add_edges` call changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInsertion {
    pub edges: Vec<Edge>,
    pub prior_selection: Selection,
}

/// A node as it was just before removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedNode {
    pub id: NodeId,
    pub attributes: Attributes,
    pub position: Option<Position>,
}

/// What a `remove_nodes` call changed, including cascaded edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRemoval {
    pub nodes: Vec<RemovedNode>,
    /// Incident edges in stored direction.
    pub edges: Vec<Edge>,
    pub prior_selection: Selection,
}

impl NodeRemoval {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// What a `remove_edges` call changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRemoval {
    pub edges: Vec<Edge>,
    pub prior_selection: Selection,
}

impl EdgeRemoval {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// Graph state plus the registered selection observers.
#[derive(Default)]
pub struct Graph {
    state: GraphState,
    observers: Vec<Box<dyn SelectionObserver>>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.state.nodes.len())
            .field("edges", &self.state.edges.len())
            .field("selection", &self.state.selection)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Graph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a loaded state. The state must be consistent.
    pub fn from_state(state: GraphState) -> Result<Self, GraphError> {
        state.check_consistency()?;
        Ok(Self {
            state,
            observers: Vec::new(),
        })
    }

    /// Swap in another state, keeping observers. Observers are notified.
    pub fn replace_state(&mut self, state: GraphState) -> Result<(), GraphError> {
        state.check_consistency()?;
        self.state = state;
        self.notify();
        Ok(())
    }

    /// Register a selection observer.
    pub fn subscribe(&mut self, observer: Box<dyn SelectionObserver>) {
        self.observers.push(observer);
    }

    fn notify(&mut self) {
        let selection = &self.state.selection;
        for observer in &mut self.observers {
            observer.selection_changed(selection);
        }
    }

    // ===== READ ACCESS =====

    #[must_use]
    pub fn state(&self) -> &GraphState {
        &self.state
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.state.selection
    }

    #[must_use]
    pub fn schema(&self) -> &AttributeSchema {
        &self.state.schema
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Attributes> {
        self.state.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &Attributes)> {
        self.state.nodes.iter()
    }

    /// Stored edges in order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.state.edges.iter()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.state.edges.len()
    }

    #[must_use]
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.state.nodes.contains_key(id)
    }

    /// Undirected membership test.
    #[must_use]
    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.state.find_edge(edge).is_some()
    }

    /// The stored representative of `edge`, in stored direction.
    #[must_use]
    pub fn find_edge(&self, edge: &Edge) -> Option<&Edge> {
        self.state.find_edge(edge)
    }

    /// Edges incident to `node`.
    pub fn edges_of<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> {
        self.state.edges.iter().filter(move |e| e.touches(node))
    }

    /// Distinct neighbours of `node`, in id order. A self loop makes a node its own neighbour.
    #[must_use]
    pub fn neighbors<'a>(&'a self, node: &'a NodeId) -> BTreeSet<&'a NodeId> {
        self.edges_of(node)
            .map(|e| if &e.source == node { &e.target } else { &e.source })
            .collect()
    }

    /// Degree of `node`. A self loop counts twice.
    #[must_use]
    pub fn degree(&self, node: &NodeId) -> usize {
        self.edges_of(node)
            .map(|e| if e.is_loop() { 2 } else { 1 })
            .sum()
    }

    /// Degree of every node, in id order.
    #[must_use]
    pub fn degrees(&self) -> BTreeMap<&NodeId, usize> {
        let mut degrees: BTreeMap<&NodeId, usize> =
            self.state.nodes.keys().map(|id| (id, 0)).collect();
        for edge in &self.state.edges {
            if let Some(d) = degrees.get_mut(&edge.source) {
                *d = d.saturating_add(1);
            }
            if let Some(d) = degrees.get_mut(&edge.target) {
                *d = d.saturating_add(1);
            }
        }
        degrees
    }

    /// Smallest degree, `None` on an empty graph.
    #[must_use]
    pub fn min_degree(&self) -> Option<usize> {
        self.degrees().into_values().min()
    }

    /// Largest degree, `None` on an empty graph.
    #[must_use]
    pub fn max_degree(&self) -> Option<usize> {
        self.degrees().into_values().max()
    }

    /// Nodes with degree zero. These are the ones a retrain predicts partners for.
    #[must_use]
    pub fn hanging_nodes(&self) -> Vec<NodeId> {
        self.degrees()
            .into_iter()
            .filter(|(_, d)| *d == 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether link prediction has anything to do.
    #[must_use]
    pub fn is_predictable(&self) -> bool {
        self.min_degree() == Some(0)
    }

    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<Position> {
        self.state.layout.get(id).copied()
    }

    /// Record where the rendering collaborator placed a node. Not an undoable edit.
    pub fn set_position(&mut self, id: &NodeId, position: Position) -> Result<(), GraphError> {
        if !self.contains_node(id) {
            return Err(GraphError::InvalidReference(format!("node '{}'", id)));
        }
        self.state.layout.insert(id.clone(), position);
        Ok(())
    }

    /// See [`GraphState::check_consistency`].
    pub fn check_consistency(&self) -> Result<(), GraphError> {
        self.state.check_consistency()
    }

    // ===== STRUCTURAL MUTATION =====

    /// Insert nodes, all or nothing, and add them to the selection.
    pub fn add_nodes(
        &mut self,
        nodes: Vec<(NodeId, Attributes)>,
    ) -> Result<NodeInsertion, GraphError> {
        let mut batch: BTreeSet<&NodeId> = BTreeSet::new();
        let mut declared: BTreeMap<String, AttrKind> = BTreeMap::new();
        for (id, attrs) in &nodes {
            if self.contains_node(id) || !batch.insert(id) {
                return Err(GraphError::DuplicateEntity(format!("node '{}'", id)));
            }
            self.state.schema.check(id, attrs)?;
            for (name, kind) in self.state.schema.undeclared(attrs) {
                match declared.get(name).copied() {
                    Some(prev) if prev == kind => {}
                    Some(prev) => {
                        let numeric = [prev, kind]
                            .iter()
                            .all(|k| matches!(k, AttrKind::Int | AttrKind::Float));
                        if !numeric {
                            return Err(GraphError::SchemaViolation(format!(
                                "attribute '{}' given as both {} and {} in one insert",
                                name, prev, kind
                            )));
                        }
                        declared.insert(name.to_string(), AttrKind::Float);
                    }
                    None => {
                        declared.insert(name.to_string(), kind);
                    }
                }
            }
        }

        let prior_selection = self.state.selection.clone();
        for (name, kind) in &declared {
            self.state.schema.declare(name.clone(), *kind);
        }
        let mut ids = Vec::with_capacity(nodes.len());
        for (id, attrs) in nodes {
            self.state.selection.insert_node(id.clone());
            self.state.nodes.insert(id.clone(), attrs);
            ids.push(id);
        }
        debug!(count = ids.len(), "nodes inserted");
        self.notify();

        Ok(NodeInsertion {
            ids,
            declared: declared.into_keys().collect(),
            prior_selection,
        })
    }

    /// Insert edges, all or nothing, and add them to the selection.
    pub fn add_edges(&mut self, edges: Vec<Edge>) -> Result<EdgeInsertion, GraphError> {
        for (i, edge) in edges.iter().enumerate() {
            for endpoint in [&edge.source, &edge.target] {
                if !self.contains_node(endpoint) {
                    return Err(GraphError::InvalidReference(format!(
                        "edge {} references missing node '{}'",
                        edge, endpoint
                    )));
                }
            }
            let repeated = edges[..i].iter().any(|e| e.same_undirected(edge));
            if repeated || self.contains_edge(edge) {
                return Err(GraphError::DuplicateEntity(format!("edge {}", edge)));
            }
        }

        let prior_selection = self.state.selection.clone();
        for edge in &edges {
            self.state.edges.insert(edge.clone());
            self.state.selection.insert_edge(edge.clone());
        }
        debug!(count = edges.len(), "edges inserted");
        self.notify();

        Ok(EdgeInsertion {
            edges,
            prior_selection,
        })
    }

    /// Remove nodes with their incident edges, layout and selection.
    ///
    /// An empty `ids` removes the selected nodes. Ids that are not in the
    /// graph are skipped with a warning.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<NodeRemoval, GraphError> {
        let requested: BTreeSet<NodeId> = if ids.is_empty() {
            let selected: BTreeSet<NodeId> = self.state.selection.nodes().cloned().collect();
            if selected.is_empty() {
                return Err(GraphError::NothingSelected("nodes"));
            }
            selected
        } else {
            ids.iter().cloned().collect()
        };

        let prior_selection = self.state.selection.clone();
        let targets: BTreeSet<NodeId> = requested
            .into_iter()
            .filter(|id| {
                let present = self.contains_node(id);
                if !present {
                    warn!(node = %id, "node not in graph, skipping removal");
                }
                present
            })
            .collect();
        if targets.is_empty() {
            return Ok(NodeRemoval {
                nodes: Vec::new(),
                edges: Vec::new(),
                prior_selection,
            });
        }

        let edges: Vec<Edge> = self
            .state
            .edges
            .iter()
            .filter(|e| targets.contains(&e.source) || targets.contains(&e.target))
            .cloned()
            .collect();
        for edge in &edges {
            self.state.edges.remove(edge);
        }

        let mut nodes = Vec::with_capacity(targets.len());
        for id in targets {
            if let Some(attributes) = self.state.nodes.remove(&id) {
                let position = self.state.layout.remove(&id);
                nodes.push(RemovedNode {
                    id,
                    attributes,
                    position,
                });
            }
        }

        let removed: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        self.state.selection.retain_nodes(|n| !removed.contains(n));
        self.state
            .selection
            .retain_edges(|e| !removed.contains(&e.source) && !removed.contains(&e.target));
        debug!(nodes = nodes.len(), edges = edges.len(), "nodes removed");
        self.notify();

        Ok(NodeRemoval {
            nodes,
            edges,
            prior_selection,
        })
    }

    /// Remove edges, matched by undirected identity.
    ///
    /// An empty `edges` removes the selected edges. Edges that are not in the
    /// graph are skipped with a warning.
    pub fn remove_edges(&mut self, edges: &[Edge]) -> Result<EdgeRemoval, GraphError> {
        let requested: Vec<Edge> = if edges.is_empty() {
            let selected: Vec<Edge> = self.state.selection.edges().cloned().collect();
            if selected.is_empty() {
                return Err(GraphError::NothingSelected("edges"));
            }
            selected
        } else {
            edges.to_vec()
        };

        let prior_selection = self.state.selection.clone();
        let mut stored: Vec<Edge> = Vec::new();
        for edge in &requested {
            match self.state.find_edge(edge) {
                Some(found) if !stored.contains(found) => stored.push(found.clone()),
                Some(_) => {}
                None => warn!(edge = %edge, "edge not in graph, skipping removal"),
            }
        }
        if stored.is_empty() {
            return Ok(EdgeRemoval {
                edges: stored,
                prior_selection,
            });
        }

        for edge in &stored {
            self.state.edges.remove(edge);
            self.state.selection.remove_edge(edge);
        }
        debug!(count = stored.len(), "edges removed");
        self.notify();

        Ok(EdgeRemoval {
            edges: stored,
            prior_selection,
        })
    }

    // ===== SELECTION =====

    /// Flip the selection of a node. Returns whether it is now selected.
    pub fn toggle_node_selection(&mut self, id: &NodeId) -> Result<bool, GraphError> {
        if !self.contains_node(id) {
            return Err(GraphError::InvalidReference(format!("node '{}'", id)));
        }
        let selected = if self.state.selection.remove_node(id) {
            false
        } else {
            self.state.selection.insert_node(id.clone())
        };
        self.notify();
        Ok(selected)
    }

    /// Flip the selection of an edge. Returns whether it is now selected.
    ///
    /// Whichever directional representative is selected gets removed; a new
    /// selection keeps the direction given here.
    pub fn toggle_edge_selection(&mut self, edge: &Edge) -> Result<bool, GraphError> {
        if !self.contains_edge(edge) {
            return Err(GraphError::InvalidReference(format!("edge {}", edge)));
        }
        let selected = if self.state.selection.remove_edge(edge).is_some() {
            false
        } else {
            self.state.selection.insert_edge(edge.clone())
        };
        self.notify();
        Ok(selected)
    }

    /// Replace the selection. Every entity must exist.
    pub fn select(&mut self, nodes: &[NodeId], edges: &[Edge]) -> Result<Selection, GraphError> {
        if let Some(missing) = nodes.iter().find(|n| !self.contains_node(n)) {
            return Err(GraphError::InvalidReference(format!("node '{}'", missing)));
        }
        if let Some(missing) = edges.iter().find(|e| !self.contains_edge(e)) {
            return Err(GraphError::InvalidReference(format!("edge {}", missing)));
        }
        let prior = self.state.selection.clone();
        self.state.selection.replace_nodes(nodes.iter().cloned());
        self.state.selection.replace_edges(edges.iter().cloned());
        self.notify();
        Ok(prior)
    }

    /// Clear the selection, returning what was selected.
    pub fn deselect(&mut self) -> Selection {
        let prior = std::mem::take(&mut self.state.selection);
        self.notify();
        prior
    }

    // ===== REVERSAL PRIMITIVES =====

    pub(crate) fn retract_nodes(&mut self, record: &NodeInsertion) {
        let ids: BTreeSet<&NodeId> = record.ids.iter().collect();
        self.state
            .edges
            .retain(|e| !ids.contains(&e.source) && !ids.contains(&e.target));
        for id in &record.ids {
            self.state.nodes.remove(id);
            self.state.layout.remove(id);
        }
        self.state.schema.retract(&record.declared);
        self.restore_selection(record.prior_selection.clone());
    }

    pub(crate) fn retract_edges(&mut self, record: &EdgeInsertion) {
        for edge in &record.edges {
            self.state.edges.remove(edge);
        }
        self.restore_selection(record.prior_selection.clone());
    }

    pub(crate) fn restore_nodes(&mut self, record: &NodeRemoval) {
        for node in &record.nodes {
            self.state
                .nodes
                .insert(node.id.clone(), node.attributes.clone());
            if let Some(position) = node.position {
                self.state.layout.insert(node.id.clone(), position);
            }
        }
        for edge in &record.edges {
            self.state.edges.insert(edge.clone());
        }
        self.restore_selection(record.prior_selection.clone());
    }

    pub(crate) fn restore_edges(&mut self, record: &EdgeRemoval) {
        for edge in &record.edges {
            self.state.edges.insert(edge.clone());
        }
        self.restore_selection(record.prior_selection.clone());
    }

    pub(crate) fn restore_selection(&mut self, selection: Selection) {
        self.state.selection = selection;
        self.notify();
    }

    /// Raw state access for tests that need a corrupted graph.
    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut GraphState {
        &mut self.state
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttrValue;
    use std::sync::{Arc, Mutex};

    fn attrs(sex: &str) -> Attributes {
        let mut a = Attributes::new();
        a.insert("sex".to_string(), AttrValue::from(sex));
        a
    }

    fn triangle() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_nodes(vec![
                (NodeId::new("a"), attrs("f")),
                (NodeId::new("b"), attrs("m")),
                (NodeId::new("c"), attrs("f")),
            ])
            .expect("add nodes");
        graph
            .add_edges(vec![
                Edge::new("a", "b"),
                Edge::new("b", "c"),
                Edge::new("c", "a"),
            ])
            .expect("add edges");
        graph.deselect();
        graph
    }

    #[test]
    fn add_nodes_extends_selection_and_declares_schema() {
        let mut graph = Graph::new();
        let record = graph
            .add_nodes(vec![(NodeId::new("a"), attrs("f"))])
            .expect("add");

        assert_eq!(record.declared, vec!["sex".to_string()]);
        assert!(graph.selection().contains_node(&NodeId::new("a")));
        assert!(graph.schema().kind_of("sex").is_some());
    }

    #[test]
    fn add_nodes_is_all_or_nothing() {
        let mut graph = triangle();
        let before = graph.state().clone();

        let result = graph.add_nodes(vec![
            (NodeId::new("d"), attrs("f")),
            (NodeId::new("a"), attrs("m")),
        ]);
        assert!(matches!(result, Err(GraphError::DuplicateEntity(_))));
        assert_eq!(graph.state(), &before);

        let result = graph.add_nodes(vec![
            (NodeId::new("d"), attrs("f")),
            (NodeId::new("d"), attrs("m")),
        ]);
        assert!(matches!(result, Err(GraphError::DuplicateEntity(_))));

        let result = graph.add_nodes(vec![(NodeId::new("e"), Attributes::new())]);
        assert!(matches!(result, Err(GraphError::SchemaViolation(_))));
        assert_eq!(graph.state(), &before);
    }

    #[test]
    fn add_edges_rejects_missing_endpoint_and_reverse_duplicate() {
        let mut graph = triangle();

        let missing = graph.add_edges(vec![Edge::new("a", "zz")]);
        assert!(matches!(missing, Err(GraphError::InvalidReference(_))));

        let reverse = graph.add_edges(vec![Edge::new("b", "a")]);
        assert!(matches!(reverse, Err(GraphError::DuplicateEntity(_))));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn self_loop_counts_twice() {
        let mut graph = triangle();
        graph.add_edges(vec![Edge::new("a", "a")]).expect("loop");
        assert_eq!(graph.degree(&NodeId::new("a")), 4);
        assert_eq!(graph.degrees()[&NodeId::new("a")], 4);
    }

    #[test]
    fn neighbors_outlive_the_query_id() {
        let mut graph = triangle();
        graph.add_edges(vec![Edge::new("a", "a")]).expect("loop");
        let found: Vec<NodeId> = {
            let query = NodeId::new("a");
            graph.neighbors(&query).into_iter().cloned().collect()
        };
        assert_eq!(
            found,
            vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")]
        );
        assert!(graph.neighbors(&NodeId::new("ghost")).is_empty());
    }

    #[test]
    fn remove_node_cascades_edges_layout_and_selection() {
        let mut graph = triangle();
        let a = NodeId::new("a");
        graph.set_position(&a, Position::new(1.0, 2.0)).expect("pos");
        graph
            .select(&[a.clone()], &[Edge::new("b", "a")])
            .expect("select");

        let record = graph.remove_nodes(&[]).expect("remove selected");
        assert_eq!(record.nodes.len(), 1);
        assert_eq!(record.edges.len(), 2);
        assert_eq!(record.nodes[0].position, Some(Position::new(1.0, 2.0)));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.selection().is_empty());
        assert!(graph.position(&a).is_none());
        graph.check_consistency().expect("consistent");
    }

    #[test]
    fn remove_with_nothing_selected() {
        let mut graph = triangle();
        assert!(matches!(
            graph.remove_nodes(&[]),
            Err(GraphError::NothingSelected("nodes"))
        ));
        assert!(matches!(
            graph.remove_edges(&[]),
            Err(GraphError::NothingSelected("edges"))
        ));
    }

    #[test]
    fn remove_missing_ids_is_ignored() {
        let mut graph = triangle();
        let before = graph.state().clone();
        let record = graph.remove_nodes(&[NodeId::new("ghost")]).expect("remove");
        assert!(record.is_empty());
        assert_eq!(graph.state(), &before);
    }

    #[test]
    fn restore_nodes_reverses_removal_exactly() {
        let mut graph = triangle();
        graph
            .set_position(&NodeId::new("b"), Position::new(0.5, 0.5))
            .expect("pos");
        graph.toggle_node_selection(&NodeId::new("c")).expect("toggle");
        let before = graph.state().clone();

        let record = graph.remove_nodes(&[NodeId::new("b")]).expect("remove");
        graph.restore_nodes(&record);
        assert_eq!(graph.state(), &before);
    }

    #[test]
    fn toggle_edge_either_direction() {
        let mut graph = triangle();
        assert!(graph.toggle_edge_selection(&Edge::new("b", "a")).expect("on"));
        assert_eq!(
            graph.selection().edges().next(),
            Some(&Edge::new("b", "a"))
        );
        assert!(!graph.toggle_edge_selection(&Edge::new("a", "b")).expect("off"));
        assert!(graph.selection().is_empty());

        let missing = graph.toggle_edge_selection(&Edge::new("a", "zz"));
        assert!(matches!(missing, Err(GraphError::InvalidReference(_))));
    }

    #[test]
    fn degree_statistics() {
        let mut graph = triangle();
        assert_eq!(graph.min_degree(), Some(2));
        assert!(!graph.is_predictable());

        graph
            .add_nodes(vec![(NodeId::new("d"), attrs("m"))])
            .expect("add");
        assert_eq!(graph.min_degree(), Some(0));
        assert_eq!(graph.max_degree(), Some(2));
        assert_eq!(graph.hanging_nodes(), vec![NodeId::new("d")]);
        assert!(graph.is_predictable());

        assert_eq!(Graph::new().min_degree(), None);
    }

    #[test]
    fn observers_see_every_selection_change() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut graph = triangle();
        graph.subscribe(Box::new(move |s: &Selection| {
            sink.lock().expect("lock").push(s.node_count());
        }));

        graph.toggle_node_selection(&NodeId::new("a")).expect("toggle");
        graph.toggle_node_selection(&NodeId::new("b")).expect("toggle");
        graph.deselect();

        assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 0]);
    }

    #[test]
    fn from_state_rejects_dangling_edge() {
        let mut state = triangle().state().clone();
        state.edges.insert(Edge::new("a", "ghost"));
        assert!(matches!(
            Graph::from_state(state),
            Err(GraphError::InconsistentSelection(_))
        ));
    }
}
