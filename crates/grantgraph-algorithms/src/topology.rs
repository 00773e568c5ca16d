//! Graph topology analysis algorithms
//!
//! Local clustering coefficients, used by the betweenness proxy.

use super::common::GraphView;

/// Local clustering coefficient per dense index.
///
/// For a node with `k >= 2` neighbors this is the fraction of the `k(k-1)/2`
/// neighbor pairs that are themselves adjacent; nodes with fewer than two
/// neighbors score 0. Expects an undirected view with sorted neighbor lists.
pub fn local_clustering(view: &GraphView) -> Vec<f64> {
    let mut coefficients = vec![0.0; view.node_count];

    for (u, coefficient) in coefficients.iter_mut().enumerate() {
        let neighbors = view.successors(u);
        let k = neighbors.len();
        if k < 2 {
            continue;
        }

        let mut links = 0usize;
        for (i, &v) in neighbors.iter().enumerate() {
            let v_neighbors = view.successors(v);
            // Only look at w > v so each neighbor pair is counted once
            for &w in &neighbors[i + 1..] {
                if v_neighbors.binary_search(&w).is_ok() {
                    links += 1;
                }
            }
        }

        *coefficient = (2 * links) as f64 / (k * (k - 1)) as f64;
    }

    coefficients
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_support::undirected;

    #[test]
    fn test_complete_graph_clustering() {
        // K4: every neighbor pair is linked
        let view = undirected(4, &[(1, 2), (1, 3), (1, 4), (2, 3), (2, 4), (3, 4)]);
        let cc = local_clustering(&view);
        assert!(cc.iter().all(|&c| (c - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_star_clustering() {
        let view = undirected(4, &[(1, 2), (1, 3), (1, 4)]);
        let cc = local_clustering(&view);
        assert_eq!(cc, vec![0.0, 0.0, 0.0, 0.0]);
    }
}
