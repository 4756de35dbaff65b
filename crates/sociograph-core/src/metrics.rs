//! # Graph Metrics
//!
//! Summary numbers for status displays and the retrain gate.
//! Integer math only; density is stored as fixed-point millionths.

use crate::graph::Graph;
use serde::{Deserialize, Serialize};

/// Counts and degree statistics of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub selected_nodes: usize,
    pub selected_edges: usize,
    /// `None` on an empty graph.
    pub min_degree: Option<usize>,
    pub max_degree: Option<usize>,
    /// Nodes with degree zero.
    pub hanging_nodes: usize,
    /// Whether a retrain has anything to predict (some node is hanging).
    pub predictable: bool,
    /// edge_count / node_count, times 1_000_000.
    pub density_millionths: u64,
}

impl GraphMetrics {
    /// Compute metrics from a graph.
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        let node_count = graph.node_count();
        let edge_count = graph.edge_count();
        let degrees = graph.degrees();
        let min_degree = degrees.values().copied().min();
        let hanging_nodes = degrees.values().filter(|d| **d == 0).count();

        let density_millionths = if node_count > 0 {
            (edge_count as u64).saturating_mul(1_000_000) / (node_count as u64)
        } else {
            0
        };

        Self {
            node_count,
            edge_count,
            selected_nodes: graph.selection().node_count(),
            selected_edges: graph.selection().edge_count(),
            min_degree,
            max_degree: degrees.values().copied().max(),
            hanging_nodes,
            predictable: min_degree == Some(0),
            density_millionths,
        }
    }

    /// Density as parts per thousand.
    #[must_use]
    pub fn density_per_thousand(&self) -> u64 {
        self.density_millionths / 1000
    }
}
