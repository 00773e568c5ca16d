//! Shared utilities for graph algorithms
//!
//! Provides a read-only, optimized view of the graph topology for algorithm execution.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Node Identifier type (u64)
pub type NodeId = u64;

/// A dense, integer-indexed view of the graph topology using Compressed Sparse Row (CSR) format.
///
/// Views built with [`GraphView::undirected`] store every edge in both directions,
/// so `successors` and `predecessors` both enumerate the undirected neighborhood.
#[derive(Debug, Clone)]
pub struct GraphView {
    /// Number of nodes
    pub node_count: usize,
    /// Mapping from dense index (0..N) back to NodeId
    pub index_to_node: Vec<NodeId>,
    /// Mapping from NodeId to dense index
    pub node_to_index: HashMap<NodeId, usize>,

    /// Outgoing edges CSR structure
    /// Offsets into `out_targets`. Size = node_count + 1
    pub out_offsets: Vec<usize>,
    /// Contiguous array of target node indices
    pub out_targets: Vec<usize>,

    /// Incoming edges CSR structure (Compressed Sparse Column effectively)
    /// Offsets into `in_sources`. Size = node_count + 1
    pub in_offsets: Vec<usize>,
    /// Contiguous array of source node indices
    pub in_sources: Vec<usize>,

    /// Edge weights: aligned with `out_targets`
    pub weights: Option<Vec<f64>>,
}

impl GraphView {
    /// Get the out-degree of a node (by index)
    pub fn out_degree(&self, idx: usize) -> usize {
        self.out_offsets[idx + 1] - self.out_offsets[idx]
    }

    /// Get the in-degree of a node (by index)
    pub fn in_degree(&self, idx: usize) -> usize {
        self.in_offsets[idx + 1] - self.in_offsets[idx]
    }

    /// Get outgoing neighbors (successors) of a node
    pub fn successors(&self, idx: usize) -> &[usize] {
        let start = self.out_offsets[idx];
        let end = self.out_offsets[idx + 1];
        &self.out_targets[start..end]
    }

    /// Get incoming neighbors (predecessors) of a node
    pub fn predecessors(&self, idx: usize) -> &[usize] {
        let start = self.in_offsets[idx];
        let end = self.in_offsets[idx + 1];
        &self.in_sources[start..end]
    }

    /// Get weights for outgoing edges of a node
    pub fn weights(&self, idx: usize) -> Option<&[f64]> {
        self.weights.as_ref().map(|w| {
            let start = self.out_offsets[idx];
            let end = self.out_offsets[idx + 1];
            &w[start..end]
        })
    }

    /// Weight of the edge `u -> v`, or `None` when the nodes are not adjacent.
    ///
    /// Unweighted views report `1.0` for every existing edge.
    pub fn edge_weight(&self, u: usize, v: usize) -> Option<f64> {
        let targets = self.successors(u);
        let pos = targets.binary_search(&v).ok()?;
        Some(self.weights(u).map(|w| w[pos]).unwrap_or(1.0))
    }

    /// Number of stored directed arcs. Undirected views hold two arcs per edge.
    pub fn arc_count(&self) -> usize {
        self.out_targets.len()
    }

    /// Build a symmetric view from an undirected edge list over dense indices.
    ///
    /// Parallel edges between the same pair are folded into one edge whose weight is
    /// the sum of the parallel weights. Self loops are dropped. Neighbor lists are
    /// sorted by index so every traversal over the view is deterministic.
    pub fn undirected(index_to_node: Vec<NodeId>, edges: &[(usize, usize, f64)]) -> Self {
        let node_count = index_to_node.len();
        let node_to_index: HashMap<NodeId, usize> = index_to_node
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, idx))
            .collect();

        let mut adjacency: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); node_count];
        for &(u, v, w) in edges {
            if u == v || u >= node_count || v >= node_count {
                continue;
            }
            *adjacency[u].entry(v).or_insert(0.0) += w;
            *adjacency[v].entry(u).or_insert(0.0) += w;
        }

        let mut out_offsets = Vec::with_capacity(node_count + 1);
        let mut out_targets = Vec::new();
        let mut weights = Vec::new();
        out_offsets.push(0);
        for row in adjacency {
            for (v, w) in row {
                out_targets.push(v);
                weights.push(w);
            }
            out_offsets.push(out_targets.len());
        }

        GraphView {
            node_count,
            index_to_node,
            node_to_index,
            in_offsets: out_offsets.clone(),
            in_sources: out_targets.clone(),
            out_offsets,
            out_targets,
            weights: Some(weights),
        }
    }
}

/// Cooperative cancellation flag shared between a long-running algorithm and its caller.
///
/// Algorithms poll it between units of work (one BFS source, one DFS branch) and
/// return early once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
