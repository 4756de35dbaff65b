//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the engine:
//! - Identifiers (`NodeId`, `SubjectId`, `VersionId`)
//! - Typed attributes (`AttrKind`, `AttrValue`, `Attributes`)
//! - Structure (`Edge`, `Position`)
//! - Selection state (`Selection`)
//! - Error taxonomy (`GraphError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! - Collections are `BTreeMap`/`BTreeSet` so iteration order never depends on hashing
//! - Identifiers implement `Ord`
//! - Floating point values are stored and compared, never computed with

use crate::primitives::VERSION_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Caller-assigned node identifier, unique within one graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Owner of a version history (one animal's social graph, for example).
///
/// Subjects name directories on disk, so only `[A-Za-z0-9_.-]` is accepted
/// and a leading `.` is rejected (hidden entries are reserved for partial writes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and create a subject identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, GraphError> {
        let id = id.into();
        let valid_chars = id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if id.is_empty() || id.starts_with('.') || !valid_chars {
            return Err(GraphError::InvalidSubject(id));
        }
        Ok(Self(id))
    }

    /// Get the subject as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(subject: SubjectId) -> Self {
        subject.0
    }
}

/// Monotonic version identifier, rendered as `v{n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId(pub u64);

impl VersionId {
    /// The version that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Get the raw ordinal.
    #[must_use]
    pub const fn ordinal(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", VERSION_PREFIX, self.0)
    }
}

impl FromStr for VersionId {
    type Err = GraphError;

    /// Only the canonical spelling is accepted: `v0`, `v12`, never `v012` or `V1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(VERSION_PREFIX)
            .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
            .filter(|d| *d == "0" || !d.starts_with('0'))
            .ok_or_else(|| GraphError::UnknownVersion(s.to_string()))?;
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| GraphError::UnknownVersion(s.to_string()))
    }
}

impl TryFrom<String> for VersionId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionId> for String {
    fn from(version: VersionId) -> Self {
        version.to_string()
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    Str,
    Int,
    Float,
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrKind::Str => "string",
            AttrKind::Int => "integer",
            AttrKind::Float => "float",
        };
        f.write_str(name)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl AttrValue {
    /// The kind of this value.
    #[must_use]
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Str(_) => AttrKind::Str,
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Float(_) => AttrKind::Float,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(x)
    }
}

/// Attribute name -> value, in name order.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Layout position of a node, as last placed by the rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// EDGE
// =============================================================================

/// A stored edge. Direction is kept as given; identity for selection,
/// removal and duplicate detection is undirected (see [`Edge::same_undirected`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    /// Create a directed edge.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// The same edge with its direction flipped.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }

    /// Endpoints in sorted order; equal for `(a,b)` and `(b,a)`.
    #[must_use]
    pub fn undirected_key(&self) -> (&NodeId, &NodeId) {
        if self.source <= self.target {
            (&self.source, &self.target)
        } else {
            (&self.target, &self.source)
        }
    }

    /// Whether `other` is this edge in either direction.
    #[must_use]
    pub fn same_undirected(&self, other: &Edge) -> bool {
        self.undirected_key() == other.undirected_key()
    }

    /// Whether `node` is one of the endpoints.
    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.source, self.target)
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// Selected nodes and edges.
///
/// Edges keep the direction in which they were selected, but at most one
/// representative per undirected edge is held.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    nodes: BTreeSet<NodeId>,
    edges: Vec<Edge>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selected node ids in order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Selected edges in selection order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
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
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    #[must_use]
    pub fn contains_node(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Undirected membership test.
    #[must_use]
    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.edges.iter().any(|e| e.same_undirected(edge))
    }

    /// Select a node. Returns `false` if it was already selected.
    pub fn insert_node(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    /// Deselect a node. Returns `false` if it was not selected.
    pub fn remove_node(&mut self, node: &NodeId) -> bool {
        self.nodes.remove(node)
    }

    /// Select an edge unless its undirected form is already selected.
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        if self.contains_edge(&edge) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Deselect whichever directional representative of `edge` is held.
    pub fn remove_edge(&mut self, edge: &Edge) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.same_undirected(edge))?;
        Some(self.edges.remove(index))
    }

    /// Keep only the nodes for which `keep` holds.
    pub fn retain_nodes(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(|n| keep(n));
    }

    /// Keep only the edges for which `keep` holds.
    pub fn retain_edges(&mut self, keep: impl FnMut(&Edge) -> bool) {
        self.edges.retain(keep);
    }

    pub(crate) fn replace_nodes(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.nodes = nodes.into_iter().collect();
    }

    pub(crate) fn replace_edges(&mut self, edges: impl IntoIterator<Item = Edge>) {
        self.edges.clear();
        for edge in edges {
            self.insert_edge(edge);
        }
    }

    /// Clear the selection.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Stable classification of a [`GraphError`], used for exit codes and API replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidReference,
    DuplicateEntity,
    EmptyHistory,
    InconsistentSelection,
    TrainingFailed,
    IoFailure,
    Usage,
    Conflict,
}

impl ErrorKind {
    /// Process exit code for the CLI.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Usage => 2,
            ErrorKind::InvalidReference => 3,
            ErrorKind::DuplicateEntity => 4,
            ErrorKind::EmptyHistory => 5,
            ErrorKind::TrainingFailed => 6,
            ErrorKind::IoFailure => 7,
            ErrorKind::Conflict => 8,
            ErrorKind::InconsistentSelection => 70,
        }
    }
}

/// Errors that can occur while editing, versioning or retraining a graph.
///
/// - Structural errors abort the single action with no partial mutation
/// - History and version errors never touch committed state
/// - `InconsistentSelection` is a broken internal contract, never a user mistake
#[derive(Debug, Error)]
pub enum GraphError {
    /// An edge or action references a node that does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The node or edge is already present.
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    /// Undo or redo with nothing to undo or redo.
    #[error("Nothing to {0}")]
    EmptyHistory(&'static str),

    /// Selection references an entity missing from the graph, or an edge dangles.
    #[error("Inconsistent selection: {0}")]
    InconsistentSelection(String),

    /// The training collaborator failed; the current version is unchanged.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// A checkpoint or registry read/write failed.
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// Attributes do not match the graph's declared schema.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// A removal defaulted to the selection, but nothing is selected.
    #[error("No {0} selected")]
    NothingSelected(&'static str),

    /// An action was applied or reverted from the wrong state.
    #[error("Invalid transition: cannot {operation} a {state} action")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// A structural edit was attempted while a retrain is running.
    #[error("A retrain is in flight; structural edits are frozen until it completes")]
    RetrainInFlight,

    /// Polling or cancelling without a running retrain.
    #[error("No retrain is running")]
    NoRetrainJob,

    /// The retrain was cancelled before completion.
    #[error("Retrain cancelled")]
    RetrainCancelled,

    /// The subject identifier is not usable as a storage key.
    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),

    /// The version does not exist for this subject.
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// A checkpoint or manifest could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A command or configuration value could not be understood.
    #[error("Usage: {0}")]
    Usage(String),
}

impl GraphError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::InvalidReference(_) | GraphError::UnknownVersion(_) => {
                ErrorKind::InvalidReference
            }
            GraphError::DuplicateEntity(_) => ErrorKind::DuplicateEntity,
            GraphError::EmptyHistory(_) => ErrorKind::EmptyHistory,
            GraphError::InconsistentSelection(_) => ErrorKind::InconsistentSelection,
            GraphError::TrainingFailed(_) | GraphError::RetrainCancelled => {
                ErrorKind::TrainingFailed
            }
            GraphError::IoFailure(_) | GraphError::Serialization(_) => ErrorKind::IoFailure,
            GraphError::SchemaViolation(_)
            | GraphError::NothingSelected(_)
            | GraphError::InvalidSubject(_)
            | GraphError::Usage(_) => ErrorKind::Usage,
            GraphError::InvalidTransition { .. }
            | GraphError::RetrainInFlight
            | GraphError::NoRetrainJob => ErrorKind::Conflict,
        }
    }

    /// A broken internal invariant. The session must not continue after it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::InconsistentSelection
    }

    /// Process exit code for the CLI.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Wrap an I/O error with the operation that failed.
    pub(crate) fn io(context: impl fmt::Display, err: impl fmt::Display) -> Self {
        GraphError::IoFailure(format!("{}: {}", context, err))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_id_display_and_parse() {
        assert_eq!(VersionId(3).to_string(), "v3");
        assert_eq!("v12".parse::<VersionId>().expect("parse"), VersionId(12));
        assert_eq!("v0".parse::<VersionId>().expect("parse"), VersionId(0));
    }

    #[test]
    fn only_invariant_breaks_are_fatal() {
        assert!(GraphError::InconsistentSelection("edge a-b".to_string()).is_fatal());
        assert_eq!(
            GraphError::InconsistentSelection(String::new()).exit_code(),
            70
        );
        assert!(!GraphError::EmptyHistory("undo").is_fatal());
        assert!(!GraphError::IoFailure("disk".to_string()).is_fatal());
        assert!(!GraphError::TrainingFailed("diverged".to_string()).is_fatal());
    }

    #[test]
    fn version_id_uses_directory_prefix() {
        let rendered = VersionId(7).to_string();
        assert!(rendered.starts_with(VERSION_PREFIX));
        assert_eq!(rendered[1..].parse::<u64>().expect("digits"), 7);
    }

    #[test]
    fn attr_value_from_owned_and_borrowed_strings() {
        let owned = String::from("f");
        assert_eq!(AttrValue::from(owned), AttrValue::from("f"));
        assert_eq!(AttrValue::from(String::new()), AttrValue::Str(String::new()));
    }

    #[test]
    fn version_id_rejects_non_canonical() {
        for bad in ["v", "12", "V1", "v01", "v-1", "v1a", ".v1"] {
            assert!(bad.parse::<VersionId>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn subject_validation() {
        assert!(SubjectId::new("bats_2019-a.v2").is_ok());
        assert!(SubjectId::new("").is_err());
        assert!(SubjectId::new(".hidden").is_err());
        assert!(SubjectId::new("../escape").is_err());
        assert!(SubjectId::new("a/b").is_err());
    }

    #[test]
    fn edge_undirected_identity() {
        let ab = Edge::new("a", "b");
        let ba = Edge::new("b", "a");
        assert!(ab.same_undirected(&ba));
        assert_ne!(ab, ba);
        assert!(!ab.same_undirected(&Edge::new("a", "c")));
    }

    #[test]
    fn selection_keeps_one_representative_per_edge() {
        let mut selection = Selection::new();
        assert!(selection.insert_edge(Edge::new("a", "b")));
        assert!(!selection.insert_edge(Edge::new("b", "a")));
        assert_eq!(selection.edge_count(), 1);

        let removed = selection.remove_edge(&Edge::new("b", "a"));
        assert_eq!(removed, Some(Edge::new("a", "b")));
        assert!(selection.is_empty());
    }

    #[test]
    fn selection_deterministic_node_order() {
        let mut selection = Selection::new();
        selection.insert_node(NodeId::new("c"));
        selection.insert_node(NodeId::new("a"));
        selection.insert_node(NodeId::new("b"));

        let nodes: Vec<_> = selection.nodes().map(NodeId::as_str).collect();
        assert_eq!(nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn exit_codes_distinguish_kinds() {
        assert_eq!(GraphError::InvalidReference("x".into()).exit_code(), 3);
        assert_eq!(GraphError::DuplicateEntity("x".into()).exit_code(), 4);
        assert_eq!(GraphError::EmptyHistory("undo").exit_code(), 5);
        assert_eq!(GraphError::TrainingFailed("x".into()).exit_code(), 6);
        assert_eq!(GraphError::IoFailure("x".into()).exit_code(), 7);
    }
}
