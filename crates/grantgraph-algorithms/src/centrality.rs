//! Centrality algorithms
//!
//! Degree, betweenness (exact Brandes and a degree-weighted proxy) and closeness
//! centrality over undirected views. All scores are normalized to `[0, 1]`.

use super::common::{CancelToken, GraphView, NodeId};
use super::pathfinding::bfs_distances;
use super::topology::local_clustering;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Sources handled per rayon task. Fixed so partial sums are always grouped the
/// same way regardless of thread scheduling.
const BRANDES_CHUNK: usize = 32;

/// Degree centrality: `degree / (n - 1)`.
pub fn degree_centrality(view: &GraphView) -> HashMap<NodeId, f64> {
    let n = view.node_count;
    let scale = if n > 1 { 1.0 / (n - 1) as f64 } else { 0.0 };

    (0..n)
        .map(|idx| (view.index_to_node[idx], view.out_degree(idx) as f64 * scale))
        .collect()
}

/// Exact betweenness centrality (Brandes, unweighted, undirected).
///
/// Normalized by `(n - 1)(n - 2)`, so a star center scores 1.0. Returns `None`
/// when `cancel` fires before every source has been processed.
pub fn betweenness_centrality(view: &GraphView, cancel: &CancelToken) -> Option<HashMap<NodeId, f64>> {
    let n = view.node_count;
    if n == 0 {
        return Some(HashMap::new());
    }

    let chunks: Vec<Vec<f64>> = (0..n)
        .collect::<Vec<_>>()
        .par_chunks(BRANDES_CHUNK)
        .map(|sources| {
            let mut partial = vec![0.0; n];
            for &s in sources {
                if cancel.is_cancelled() {
                    return None;
                }
                accumulate_dependencies(view, s, &mut partial);
            }
            Some(partial)
        })
        .collect::<Option<Vec<_>>>()?;

    // Sequential reduction in chunk order keeps the float sums reproducible
    let mut totals = vec![0.0; n];
    for partial in chunks {
        for (total, value) in totals.iter_mut().zip(partial) {
            *total += value;
        }
    }

    let scale = if n > 2 { 1.0 / ((n - 1) * (n - 2)) as f64 } else { 0.0 };
    Some(
        totals
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| (view.index_to_node[idx], raw * scale))
            .collect(),
    )
}

/// Single-source shortest-path dependency accumulation (one Brandes round).
fn accumulate_dependencies(view: &GraphView, s: usize, totals: &mut [f64]) {
    let n = view.node_count;
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    let mut queue = VecDeque::new();

    sigma[s] = 1.0;
    dist[s] = 0;
    queue.push_back(s);

    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in view.successors(v) {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
        }
        if w != s {
            totals[w] += delta[w];
        }
    }
}

/// Degree-weighted betweenness proxy: `degree_centrality × (1 − local clustering)`.
///
/// A node whose neighbors are not linked to each other brokers between them; a node
/// inside a clique does not. Costs O(Σ deg²) instead of O(n·m), at the price of
/// ignoring everything beyond the ego network.
pub fn betweenness_proxy(view: &GraphView) -> HashMap<NodeId, f64> {
    let degree = degree_centrality(view);
    let clustering = local_clustering(view);

    (0..view.node_count)
        .map(|idx| {
            let id = view.index_to_node[idx];
            let d = degree.get(&id).copied().unwrap_or(0.0);
            let c = clustering[idx];
            (id, d * (1.0 - c))
        })
        .collect()
}

/// Closeness centrality: `(r - 1) / Σ d(v, u)` over the `r` nodes reachable from `v`.
///
/// The value is `None` when the node cannot reach every node in the view (its
/// component is disconnected from the rest) or the view holds a single node.
/// Returns `None` overall when cancelled.
pub fn closeness_centrality(
    view: &GraphView,
    cancel: &CancelToken,
) -> Option<HashMap<NodeId, Option<f64>>> {
    let n = view.node_count;

    let scores: Vec<Option<f64>> = (0..n)
        .into_par_iter()
        .map(|idx| {
            if cancel.is_cancelled() {
                return None;
            }
            let distances = bfs_distances(view, idx);
            let mut reachable = 0usize;
            let mut total = 0usize;
            for d in distances.into_iter().flatten() {
                reachable += 1;
                total += d;
            }
            if n < 2 || reachable < n || total == 0 {
                Some(None)
            } else {
                Some(Some((reachable - 1) as f64 / total as f64))
            }
        })
        .collect::<Option<Vec<_>>>()?;

    Some(
        scores
            .into_iter()
            .enumerate()
            .map(|(idx, score)| (view.index_to_node[idx], score))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_support::undirected;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_star_betweenness() {
        // 1 is the hub of 1-2, 1-3, 1-4, 1-5
        let view = undirected(5, &[(1, 2), (1, 3), (1, 4), (1, 5)]);
        let bc = betweenness_centrality(&view, &CancelToken::new()).unwrap();

        assert!(approx(bc[&1], 1.0));
        for leaf in 2..=5 {
            assert!(approx(bc[&leaf], 0.0));
        }
    }

    #[test]
    fn test_path_betweenness() {
        // 1-2-3: the middle node sits on the single 1..3 path
        let view = undirected(3, &[(1, 2), (2, 3)]);
        let bc = betweenness_centrality(&view, &CancelToken::new()).unwrap();
        assert!(approx(bc[&2], 1.0));
        assert!(approx(bc[&1], 0.0));
    }

    #[test]
    fn test_betweenness_is_reproducible() {
        let edges: Vec<(u64, u64)> = (1..80u64)
            .flat_map(|i| vec![(i, i + 1), (i, (i * 7) % 80 + 1)])
            .filter(|(a, b)| a != b)
            .collect();
        let view = undirected(80, &edges);

        let first = betweenness_centrality(&view, &CancelToken::new()).unwrap();
        let second = betweenness_centrality(&view, &CancelToken::new()).unwrap();
        for (id, score) in &first {
            assert_eq!(score.to_bits(), second[id].to_bits());
        }
    }

    #[test]
    fn test_betweenness_cancelled() {
        let view = undirected(4, &[(1, 2), (2, 3), (3, 4)]);
        let token = CancelToken::new();
        token.cancel();
        assert!(betweenness_centrality(&view, &token).is_none());
    }

    #[test]
    fn test_degree_centrality() {
        let view = undirected(4, &[(1, 2), (1, 3), (1, 4)]);
        let dc = degree_centrality(&view);
        assert!(approx(dc[&1], 1.0));
        assert!(approx(dc[&2], 1.0 / 3.0));
    }

    #[test]
    fn test_proxy_zero_inside_clique() {
        // Triangle 1-2-3 plus pendant 4 on 1
        let view = undirected(4, &[(1, 2), (2, 3), (1, 3), (1, 4)]);
        let proxy = betweenness_proxy(&view);
        // Node 2's neighbors (1, 3) are linked: no brokerage
        assert!(approx(proxy[&2], 0.0));
        // Node 1: degree 1.0, clustering 1/3
        assert!(approx(proxy[&1], 1.0 * (1.0 - 1.0 / 3.0)));
    }

    #[test]
    fn test_closeness_connected() {
        let view = undirected(3, &[(1, 2), (2, 3)]);
        let cc = closeness_centrality(&view, &CancelToken::new()).unwrap();
        assert_eq!(cc[&2], Some(1.0));
        assert_eq!(cc[&1], Some(2.0 / 3.0));
    }

    #[test]
    fn test_closeness_disconnected_is_absent() {
        let view = undirected(4, &[(1, 2), (3, 4)]);
        let cc = closeness_centrality(&view, &CancelToken::new()).unwrap();
        assert!(cc.values().all(|v| v.is_none()));

        let single = undirected(1, &[]);
        let cc = closeness_centrality(&single, &CancelToken::new()).unwrap();
        assert_eq!(cc[&1], None);
    }
}
