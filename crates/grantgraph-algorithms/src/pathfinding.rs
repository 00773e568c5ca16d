//! Pathfinding algorithms
//!
//! Breadth-first hop distances and bounded simple-path enumeration.

use super::common::{CancelToken, GraphView};
use std::collections::VecDeque;

/// Hop distance from `source` (dense index) to every node; `None` if unreachable.
pub fn bfs_distances(view: &GraphView, source: usize) -> Vec<Option<usize>> {
    let mut distances = vec![None; view.node_count];
    if source >= view.node_count {
        return distances;
    }

    let mut queue = VecDeque::new();
    distances[source] = Some(0);
    queue.push_back(source);

    while let Some(current) = queue.pop_front() {
        let next_distance = distances[current].map(|d| d + 1);
        for &next in view.successors(current) {
            if distances[next].is_none() {
                distances[next] = next_distance;
                queue.push_back(next);
            }
        }
    }

    distances
}

/// Result of a bounded simple-path enumeration
#[derive(Debug, Clone, Default)]
pub struct SimplePaths {
    /// Paths as dense index sequences, source first, target last
    pub paths: Vec<Vec<usize>>,
    /// True when enumeration stopped early (path limit reached or cancelled)
    pub truncated: bool,
}

/// Enumerate every simple path (no repeated node) from `source` to `target`
/// with at most `max_hops` edges.
///
/// Branches that cannot reach the target within the remaining hop budget are
/// pruned using BFS distances from the target. Neighbors are visited in index
/// order, so the output order is deterministic for a given view. Enumeration
/// stops after `limit` paths.
pub fn all_simple_paths(
    view: &GraphView,
    source: usize,
    target: usize,
    max_hops: usize,
    limit: usize,
    cancel: &CancelToken,
) -> SimplePaths {
    let mut result = SimplePaths::default();
    let n = view.node_count;
    if source >= n || target >= n || source == target || max_hops == 0 || limit == 0 {
        return result;
    }

    let to_target = bfs_distances(view, target);
    match to_target[source] {
        Some(d) if d <= max_hops => {}
        _ => return result,
    }

    let mut on_path = vec![false; n];
    let mut path = vec![source];
    let mut cursors = vec![0usize];
    on_path[source] = true;

    while !cursors.is_empty() {
        if cancel.is_cancelled() {
            result.truncated = true;
            break;
        }

        let top = cursors.len() - 1;
        let current = path[top];
        let neighbors = view.successors(current);

        if cursors[top] >= neighbors.len() {
            cursors.pop();
            if let Some(done) = path.pop() {
                on_path[done] = false;
            }
            continue;
        }

        let next = neighbors[cursors[top]];
        cursors[top] += 1;

        if on_path[next] {
            continue;
        }
        // Edges used once `next` is appended
        let hops = path.len();
        match to_target[next] {
            Some(remaining) if hops + remaining <= max_hops => {}
            _ => continue,
        }

        if next == target {
            let mut found = path.clone();
            found.push(next);
            result.paths.push(found);
            if result.paths.len() >= limit {
                result.truncated = true;
                break;
            }
            continue;
        }

        path.push(next);
        on_path[next] = true;
        cursors.push(0);
    }

    result
}
