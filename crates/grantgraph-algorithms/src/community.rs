//! Community detection algorithms
//!
//! Weakly connected components (union-find) and Louvain modularity optimisation.

use super::common::{GraphView, NodeId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

/// Result of WCC algorithm
#[derive(Debug, Clone)]
pub struct WccResult {
    /// Map of Component ID -> List of NodeIds
    pub components: HashMap<usize, Vec<NodeId>>,
    /// Map of NodeId -> Component ID
    pub node_component: HashMap<NodeId, usize>,
}

/// Union-Find data structure
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        UnionFind {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            self.parent[i] = self.find(self.parent[i]); // Path compression
        }
        self.parent[i]
    }

    fn union(&mut self, i: usize, j: usize) {
        let root_i = self.find(i);
        let root_j = self.find(j);

        if root_i != root_j {
            if self.rank[root_i] < self.rank[root_j] {
                self.parent[root_i] = root_j;
            } else if self.rank[root_i] > self.rank[root_j] {
                self.parent[root_j] = root_i;
            } else {
                self.parent[root_j] = root_i;
                self.rank[root_i] += 1;
            }
        }
    }
}

/// Weakly Connected Components (WCC)
///
/// Finds all disjoint subgraphs in the graph.
/// Ignores edge direction.
pub fn weakly_connected_components(view: &GraphView) -> WccResult {
    let n = view.node_count;
    let mut uf = UnionFind::new(n);

    for u_idx in 0..n {
        for &v_idx in view.successors(u_idx) {
            uf.union(u_idx, v_idx);
        }
    }

    let mut components = HashMap::new();
    let mut node_component = HashMap::new();

    for i in 0..n {
        let root = uf.find(i);
        let node_id = view.index_to_node[i];

        components.entry(root).or_insert_with(Vec::new).push(node_id);
        node_component.insert(node_id, root);
    }

    WccResult {
        components,
        node_component,
    }
}

/// Louvain configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LouvainConfig {
    /// Seed for the node visiting order. Same seed + same view = same partition.
    pub seed: u64,
    /// Maximum number of aggregation levels
    pub max_levels: usize,
    /// Maximum local-moving passes per level
    pub max_passes: usize,
    /// Minimum modularity gain for a move to count as an improvement
    pub min_gain: f64,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_levels: 10,
            max_passes: 100,
            min_gain: 1e-7,
        }
    }
}

/// Result of a modularity-based partition
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommunityResult {
    /// Communities as sorted NodeId lists, ordered by their smallest member
    pub communities: Vec<Vec<NodeId>>,
    /// NodeId -> position in `communities`
    pub node_community: HashMap<NodeId, usize>,
    /// Modularity of the final partition on the input view
    pub modularity: f64,
}

/// Weighted working graph for one Louvain level
struct Level {
    /// External adjacency: (neighbor, weight), neighbor != self
    adjacency: Vec<Vec<(usize, f64)>>,
    /// Internal weight already folded into each node (counted from both ends)
    internal: Vec<f64>,
}

impl Level {
    fn from_view(view: &GraphView) -> Self {
        let adjacency = (0..view.node_count)
            .map(|u| {
                let weights = view.weights(u);
                view.successors(u)
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| v != u)
                    .map(|(i, &v)| (v, weights.map(|w| w[i]).unwrap_or(1.0)))
                    .collect()
            })
            .collect();
        Level {
            adjacency,
            internal: vec![0.0; view.node_count],
        }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn strength(&self, u: usize) -> f64 {
        self.internal[u] + self.adjacency[u].iter().map(|(_, w)| w).sum::<f64>()
    }

    /// Collapse every community into a single node.
    fn aggregate(&self, community: &[usize], count: usize) -> Level {
        let mut internal = vec![0.0; count];
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];

        for u in 0..self.len() {
            let cu = community[u];
            internal[cu] += self.internal[u];
            for &(v, w) in &self.adjacency[u] {
                let cv = community[v];
                if cu == cv {
                    internal[cu] += w;
                } else {
                    *links[cu].entry(cv).or_insert(0.0) += w;
                }
            }
        }

        Level {
            adjacency: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            internal,
        }
    }
}

/// Louvain community detection on an undirected weighted view.
///
/// Each level repeatedly moves single nodes to the neighboring community with the
/// best modularity gain (visiting nodes in a seeded shuffled order), then collapses
/// communities into super-nodes. Stops when a level produces no move.
/// Isolated nodes end up as singleton communities.
pub fn louvain(view: &GraphView, config: &LouvainConfig) -> CommunityResult {
    let n = view.node_count;
    let mut membership: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut level = Level::from_view(view);

    let total: f64 = (0..level.len()).map(|u| level.strength(u)).sum();

    if total > 0.0 {
        for _ in 0..config.max_levels {
            let (community, count, moved) = local_moving(&level, total, config, &mut rng);
            if !moved {
                break;
            }
            for m in membership.iter_mut() {
                *m = community[*m];
            }
            level = level.aggregate(&community, count);
            if count == 1 {
                break;
            }
        }
    }

    build_result(view, &membership)
}

/// One level of local moving. Returns (renumbered community per node, community count, any move).
fn local_moving(
    level: &Level,
    total: f64,
    config: &LouvainConfig,
    rng: &mut StdRng,
) -> (Vec<usize>, usize, bool) {
    let n = level.len();
    let strength: Vec<f64> = (0..n).map(|u| level.strength(u)).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut tot = strength.clone();

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut moved_any = false;
    for _ in 0..config.max_passes {
        let mut moved = false;

        for &u in &order {
            let current = community[u];
            let k_u = strength[u];

            let mut to_community: BTreeMap<usize, f64> = BTreeMap::new();
            for &(v, w) in &level.adjacency[u] {
                *to_community.entry(community[v]).or_insert(0.0) += w;
            }

            tot[current] -= k_u;
            let gain = |c: usize, k_in: f64| k_in - tot[c] * k_u / total;

            let mut best = current;
            let mut best_gain = gain(current, to_community.get(&current).copied().unwrap_or(0.0));
            for (&c, &k_in) in &to_community {
                let g = gain(c, k_in);
                if g > best_gain + config.min_gain {
                    best = c;
                    best_gain = g;
                }
            }

            tot[best] += k_u;
            if best != current {
                community[u] = best;
                moved = true;
                moved_any = true;
            }
        }

        if !moved {
            break;
        }
    }

    // Renumber by first appearance in index order
    let mut renumber: HashMap<usize, usize> = HashMap::new();
    let mut dense = Vec::with_capacity(n);
    for &c in &community {
        let next = renumber.len();
        dense.push(*renumber.entry(c).or_insert(next));
    }
    let count = renumber.len();

    (dense, count, moved_any)
}

fn build_result(view: &GraphView, membership: &[usize]) -> CommunityResult {
    let mut groups: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for (idx, &c) in membership.iter().enumerate() {
        groups.entry(c).or_default().push(view.index_to_node[idx]);
    }

    let mut communities: Vec<Vec<NodeId>> = groups
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    communities.sort_by_key(|members| members[0]);

    let node_community = communities
        .iter()
        .enumerate()
        .flat_map(|(c, members)| members.iter().map(move |&id| (id, c)))
        .collect();

    CommunityResult {
        modularity: modularity(view, membership),
        communities,
        node_community,
    }
}

/// Newman modularity of a partition given as community-per-dense-index.
pub fn modularity(view: &GraphView, membership: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut inside: BTreeMap<usize, f64> = BTreeMap::new();
    let mut degree: BTreeMap<usize, f64> = BTreeMap::new();

    for u in 0..view.node_count {
        let weights = view.weights(u);
        for (i, &v) in view.successors(u).iter().enumerate() {
            let w = weights.map(|w| w[i]).unwrap_or(1.0);
            total += w;
            *degree.entry(membership[u]).or_insert(0.0) += w;
            if membership[u] == membership[v] {
                *inside.entry(membership[u]).or_insert(0.0) += w;
            }
        }
    }

    if total == 0.0 {
        return 0.0;
    }

    degree
        .iter()
        .map(|(c, &d)| inside.get(c).copied().unwrap_or(0.0) / total - (d / total).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_support::undirected;

    #[test]
    fn test_wcc() {
        // Nodes: 1, 2, 3, 4, 5, 6
        // Edges: 1-2, 3-4-5, 6 (isolated)
        let view = undirected(6, &[(1, 2), (3, 4), (4, 5)]);

        let result = weakly_connected_components(&view);

        assert_eq!(result.components.len(), 3);

        let c1 = result.node_component[&1];
        let c2 = result.node_component[&2];
        assert_eq!(c1, c2);

        let c3 = result.node_component[&3];
        let c4 = result.node_component[&4];
        let c5 = result.node_component[&5];
        assert_eq!(c3, c4);
        assert_eq!(c4, c5);
        assert_ne!(c1, c3);
    }

    #[test]
    fn test_louvain_two_cliques() {
        // Two triangles joined by a single bridge 3-4
        let view = undirected(6, &[(1, 2), (2, 3), (1, 3), (4, 5), (5, 6), (4, 6), (3, 4)]);
        let result = louvain(&view, &LouvainConfig::default());

        assert_eq!(result.communities, vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert!(result.modularity > 0.3);
    }

    #[test]
    fn test_louvain_isolated_nodes_are_singletons() {
        let view = undirected(4, &[(1, 2), (2, 3), (1, 3)]);
        let result = louvain(&view, &LouvainConfig::default());

        assert_eq!(result.communities, vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(result.node_community[&4], 1);
    }

    #[test]
    fn test_louvain_is_seeded() {
        let edges: Vec<(u64, u64)> = (1..40u64)
            .flat_map(|i| vec![(i, i + 1), (i, (i * 13) % 40 + 1)])
            .filter(|(a, b)| a != b)
            .collect();
        let view = undirected(40, &edges);
        let config = LouvainConfig { seed: 7, ..Default::default() };

        let a = louvain(&view, &config);
        let b = louvain(&view, &config);
        assert_eq!(a.communities, b.communities);
        assert_eq!(a.modularity.to_bits(), b.modularity.to_bits());
    }

    #[test]
    fn test_louvain_empty_graph() {
        let view = undirected(3, &[]);
        let result = louvain(&view, &LouvainConfig::default());
        assert_eq!(result.communities.len(), 3);
        assert_eq!(result.modularity, 0.0);
    }
}
