//! # Export
//!
//! Read-only projections of a [`Graph`] for the outside collaborators:
//!
//! - [`TrainingInput`]: feature matrix, edge list and adjacency for a
//!   link-prediction trainer
//! - [`RenderView`]: nodes, edges, selection flags and degree hints for a
//!   renderer
//!
//! Both are deterministic: rows follow node id order, columns follow
//! attribute name order and then value order.

use crate::graph::Graph;
use crate::types::{AttrKind, AttrValue, Attributes, Edge, NodeId, Position};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// TRAINING INPUT
// =============================================================================

/// The graph as a trainer sees it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingInput {
    /// Row order of `features` and index space of `edge_list`/`adjacency`.
    pub node_ids: Vec<NodeId>,
    /// Column names. String attributes expand to one `name=value` column per observed value.
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    /// Stored edges as index pairs, in stored direction.
    pub edge_list: Vec<(usize, usize)>,
    /// Symmetric, sorted neighbour lists.
    pub adjacency: Vec<Vec<usize>>,
}

enum Column<'a> {
    Numeric(&'a str),
    OneHot(&'a str, &'a str),
}

impl TrainingInput {
    /// Export a graph.
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let mut vocab: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (_, attrs) in graph.nodes() {
            for (name, value) in attrs {
                if let AttrValue::Str(s) = value {
                    vocab.entry(name.as_str()).or_default().insert(s.as_str());
                }
            }
        }

        let mut columns = Vec::new();
        for (name, kind) in graph.schema().iter() {
            match kind {
                AttrKind::Str => {
                    if let Some(values) = vocab.get(name) {
                        columns.extend(values.iter().map(|v| Column::OneHot(name, *v)));
                    }
                }
                AttrKind::Int | AttrKind::Float => columns.push(Column::Numeric(name)),
            }
        }

        let feature_names = columns
            .iter()
            .map(|c| match c {
                Column::Numeric(name) => (*name).to_string(),
                Column::OneHot(name, value) => format!("{}={}", name, value),
            })
            .collect();

        let node_ids: Vec<NodeId> = graph.nodes().map(|(id, _)| id.clone()).collect();
        let index: BTreeMap<&NodeId, usize> =
            node_ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let features = graph
            .nodes()
            .map(|(_, attrs)| columns.iter().map(|c| feature(attrs, c)).collect())
            .collect();

        let mut edge_list = Vec::with_capacity(graph.edge_count());
        let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); node_ids.len()];
        for edge in graph.edges() {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                edge_list.push((s, t));
                adjacency[s].insert(t);
                adjacency[t].insert(s);
            }
        }

        Self {
            node_ids,
            feature_names,
            features,
            edge_list,
            adjacency: adjacency
                .into_iter()
                .map(|set| set.into_iter().collect())
                .collect(),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Row indices of nodes without neighbours.
    pub fn hanging(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_empty())
            .map(|(i, _)| i)
    }
}

fn feature(attrs: &Attributes, column: &Column<'_>) -> f64 {
    match column {
        Column::Numeric(name) => match attrs.get(*name) {
            Some(AttrValue::Int(i)) => *i as f64,
            Some(AttrValue::Float(x)) => *x,
            _ => 0.0,
        },
        Column::OneHot(name, value) => match attrs.get(*name) {
            Some(AttrValue::Str(s)) if s == value => 1.0,
            _ => 0.0,
        },
    }
}

// =============================================================================
// RENDER VIEW
// =============================================================================

/// One node as a renderer needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    pub id: NodeId,
    pub attributes: Attributes,
    pub degree: usize,
    /// Position of `degree` within `[min_degree, max_degree]`, in 0..=1000.
    pub degree_per_mille: u32,
    pub selected: bool,
    pub hanging: bool,
    pub position: Option<Position>,
}

/// One edge as a renderer needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub selected: bool,
}

/// Snapshot for a rendering collaborator. Never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderView {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
    pub min_degree: Option<usize>,
    pub max_degree: Option<usize>,
}

impl RenderView {
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let degrees = graph.degrees();
        let min_degree = degrees.values().copied().min();
        let max_degree = degrees.values().copied().max();
        let selection = graph.selection();

        let nodes = graph
            .nodes()
            .map(|(id, attrs)| {
                let degree = degrees.get(id).copied().unwrap_or(0);
                RenderNode {
                    id: id.clone(),
                    attributes: attrs.clone(),
                    degree,
                    degree_per_mille: per_mille(degree, min_degree, max_degree),
                    selected: selection.contains_node(id),
                    hanging: degree == 0,
                    position: graph.position(id),
                }
            })
            .collect();

        let edges = graph
            .edges()
            .map(|e: &Edge| RenderEdge {
                source: e.source.clone(),
                target: e.target.clone(),
                selected: selection.contains_edge(e),
            })
            .collect();

        Self {
            nodes,
            edges,
            min_degree,
            max_degree,
        }
    }
}

fn per_mille(degree: usize, min: Option<usize>, max: Option<usize>) -> u32 {
    match (min, max) {
        (Some(lo), Some(hi)) if hi > lo => {
            let scaled = degree.saturating_sub(lo).saturating_mul(1000) / (hi - lo);
            scaled.min(1000) as u32
        }
        _ => 0,
    }
}

// =============================================================================
// TESTS
// =============================================================================
