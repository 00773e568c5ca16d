//! Graph algorithms module
//!
//! Algorithms are implemented in the `grantgraph-algorithms` crate over a CSR
//! `GraphView`. This module provides the integration/adapter layer that
//! projects a `Network` into such views.

use crate::graph::{EdgeKind, Network, NodeId, NodeKind};
use grantgraph_algorithms::{GraphView, NodeId as AlgoNodeId};
use std::collections::BTreeSet;

// Re-export algorithms
pub use grantgraph_algorithms::{
    all_simple_paths, betweenness_centrality, betweenness_proxy, bfs_distances,
    closeness_centrality, degree_centrality, jaccard, local_clustering, louvain, modularity,
    weakly_connected_components, CancelToken, CommunityResult, LouvainConfig, SimplePaths,
    WccResult,
};

/// Edge kinds of the organization-level network used for structural metrics
pub const ORGANIZATION_EDGES: [EdgeKind; 2] = [EdgeKind::Grant, EdgeKind::Connection];

/// Build an undirected GraphView from the network for algorithm execution.
///
/// `node_kind` and `subset` restrict the node set; edges are kept when both
/// endpoints survive and the edge kind is in `kinds` (all kinds when empty).
/// View node ids are the network's dense node ids.
pub fn build_view(
    network: &Network,
    node_kind: Option<NodeKind>,
    subset: Option<&BTreeSet<NodeId>>,
    kinds: &[EdgeKind],
) -> GraphView {
    // 1. Collect relevant nodes
    let nodes: Vec<AlgoNodeId> = network
        .nodes()
        .iter()
        .filter(|n| node_kind.map_or(true, |kind| n.kind() == kind))
        .filter(|n| subset.map_or(true, |s| s.contains(&n.id)))
        .map(|n| n.id.as_u64())
        .collect();

    // 2. Build index mapping (network id -> dense view index)
    let mut position = vec![None; network.node_count()];
    for (idx, &node_id) in nodes.iter().enumerate() {
        position[node_id as usize] = Some(idx);
    }

    // 3. Collect surviving edges
    let edges: Vec<(usize, usize, f64)> = network
        .edges()
        .iter()
        .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
        .filter_map(|e| {
            let u = position[e.source.index()]?;
            let v = position[e.target.index()]?;
            Some((u, v, e.weight))
        })
        .collect();

    // 4. Convert to CSR
    GraphView::undirected(nodes, &edges)
}

/// Organization-level view (Grant and Connection edges), optionally limited to a subset
pub fn organization_view(network: &Network, subset: Option<&BTreeSet<NodeId>>) -> GraphView {
    build_view(network, Some(NodeKind::Organization), subset, &ORGANIZATION_EDGES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphFilter, GraphStore, GrantDraft};

    fn network() -> Network {
        let mut store = GraphStore::new();
        for org in ["A", "B", "C"] {
            store.ensure_organization(&org.into(), None);
        }
        for (funder, recipient) in [("A", "B"), ("B", "A"), ("B", "C")] {
            store
                .upsert_grant(GrantDraft {
                    funder: funder.into(),
                    recipient: recipient.into(),
                    recipient_name: None,
                    amount: 1_000.0,
                    year: 2022,
                    purpose: None,
                })
                .unwrap();
        }
        Network::rebuild(&store, &GraphFilter::default())
    }

    #[test]
    fn test_build_view_is_symmetric_and_folds_parallel_edges() {
        let network = network();
        let view = organization_view(&network, None);

        assert_eq!(view.node_count, 3);
        // A-B folded, B-C: two undirected edges, four arcs
        assert_eq!(view.arc_count(), 4);
        assert_eq!(view.successors(1), &[0, 2]);
        assert_eq!(view.predecessors(1), view.successors(1));
    }

    #[test]
    fn test_build_view_subset() {
        let network = network();
        let subset: BTreeSet<NodeId> = [NodeId::new(1), NodeId::new(2)].into_iter().collect();
        let view = organization_view(&network, Some(&subset));

        assert_eq!(view.index_to_node, vec![1, 2]);
        assert_eq!(view.arc_count(), 2);
    }
}
