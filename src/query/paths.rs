//! Bounded pathfinding
//!
//! Enumerates simple paths over Role and Grant edges up to a required hop
//! limit, scores them and returns the strongest few.

use super::{QueryError, QueryResult};
use crate::algo::{self, all_simple_paths, CancelToken};
use crate::config::PathfinderConfig;
use crate::graph::{EdgeDetail, EdgeKind, Network, NodeId, NodeKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

/// Edge kinds a path may traverse. Connection edges are derived from the same
/// roles and are not walked.
pub const PATH_EDGES: [EdgeKind; 2] = [EdgeKind::Role, EdgeKind::Grant];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStrategy {
    BoardIntroduction,
    FunderReferral,
    Mixed,
}

impl fmt::Display for PathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PathStrategy::BoardIntroduction => "Board introduction",
            PathStrategy::FunderReferral => "Funder referral",
            PathStrategy::Mixed => "Mixed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub key: NodeKey,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHop {
    pub kind: EdgeKind,
    pub weight: f64,
    /// Role kind or "grant"
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPath {
    pub steps: Vec<PathStep>,
    pub hops: Vec<PathHop>,
    pub strength: f64,
    pub strategy: PathStrategy,
    pub description: String,
}

impl RankedPath {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn role_hops(&self) -> usize {
        self.hops.iter().filter(|h| h.kind == EdgeKind::Role).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSearch {
    pub paths: Vec<RankedPath>,
    /// Raw simple paths found before filtering and ranking
    pub enumerated: usize,
    /// Enumeration stopped at the path limit or was cancelled
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Pathfinder {
    config: PathfinderConfig,
}

impl Pathfinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Pathfinder { config }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Check the hop bound before any work is done
    pub fn validate_hops(&self, max_hops: Option<usize>) -> QueryResult<usize> {
        match max_hops {
            None => Err(QueryError::InvalidQuery("max_hops is required".into())),
            Some(hops) if hops == 0 || hops > self.config.max_hops_limit => Err(QueryError::InvalidQuery(format!(
                "max_hops must be between 1 and {}, got {}",
                self.config.max_hops_limit, hops
            ))),
            Some(hops) => Ok(hops),
        }
    }

    /// Strongest paths from `source` to `target` with at most `max_hops` edges.
    ///
    /// With `require_role_hop`, paths made only of Grant edges are dropped
    /// before ranking.
    pub fn find_paths(
        &self,
        network: &Network,
        source: &NodeKey,
        target: &NodeKey,
        max_hops: Option<usize>,
        require_role_hop: bool,
        cancel: &CancelToken,
    ) -> QueryResult<PathSearch> {
        let max_hops = self.validate_hops(max_hops)?;
        let source_id = network
            .node_id(source)
            .ok_or_else(|| QueryError::NodeNotFound(source.to_string()))?;
        let target_id = network
            .node_id(target)
            .ok_or_else(|| QueryError::NodeNotFound(target.to_string()))?;
        if source_id == target_id {
            return Err(QueryError::InvalidQuery("source and target are the same node".into()));
        }

        let view = algo::build_view(network, None, None, &PATH_EDGES);
        let (Some(&s), Some(&t)) = (
            view.node_to_index.get(&source_id.as_u64()),
            view.node_to_index.get(&target_id.as_u64()),
        ) else {
            return Ok(PathSearch::default());
        };

        let raw = all_simple_paths(&view, s, t, max_hops, self.config.max_enumerated_paths, cancel);
        let enumerated = raw.paths.len();

        let mut paths: Vec<RankedPath> = raw
            .paths
            .iter()
            .filter_map(|indices| {
                let ids: Vec<NodeId> = indices.iter().map(|&i| NodeId::new(view.index_to_node[i])).collect();
                rank_path(network, &ids)
            })
            .filter(|path| !require_role_hop || path.role_hops() > 0)
            .collect();

        paths.sort_by(compare_paths);
        paths.truncate(self.config.top_n);

        debug!(
            "Paths {} -> {} within {} hops: {} enumerated, {} returned",
            source,
            target,
            max_hops,
            enumerated,
            paths.len()
        );
        Ok(PathSearch {
            paths,
            enumerated,
            truncated: raw.truncated,
        })
    }
}

/// Strength in (0, 1]: `0.5 / hops + 0.3 × Σw / hops + 0.2 × role_hops / hops`
pub fn path_strength(hops: &[PathHop]) -> f64 {
    if hops.is_empty() {
        return 0.0;
    }
    let n = hops.len() as f64;
    let weight: f64 = hops.iter().map(|h| h.weight).sum();
    let roles = hops.iter().filter(|h| h.kind == EdgeKind::Role).count() as f64;
    0.5 / n + 0.3 * weight / n + 0.2 * roles / n
}

fn rank_path(network: &Network, ids: &[NodeId]) -> Option<RankedPath> {
    let steps: Vec<PathStep> = ids
        .iter()
        .map(|id| {
            network.node(*id).map(|node| PathStep {
                key: node.key.clone(),
                label: node.label.clone(),
            })
        })
        .collect::<Option<_>>()?;

    let mut hops = Vec::with_capacity(ids.len().saturating_sub(1));
    for pair in ids.windows(2) {
        // Two opposite grants between the same organizations: walk the heavier
        let edge = network
            .edges_between(pair[0], pair[1], &PATH_EDGES)
            .into_iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight).then_with(|| b.id.cmp(&a.id)))?;
        let relation = match &edge.detail {
            EdgeDetail::Role { current_kinds, kinds, .. } => current_kinds
                .iter()
                .chain(kinds.iter())
                .min()
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "role".to_string()),
            _ => edge.kind.as_str().to_string(),
        };
        hops.push(PathHop {
            kind: edge.kind,
            weight: edge.weight,
            relation,
        });
    }

    let roles = hops.iter().filter(|h| h.kind == EdgeKind::Role).count();
    let grants = hops.len() - roles;
    let strategy = match roles.cmp(&grants) {
        Ordering::Greater => PathStrategy::BoardIntroduction,
        Ordering::Less => PathStrategy::FunderReferral,
        Ordering::Equal => PathStrategy::Mixed,
    };

    let mut description = steps[0].label.clone();
    for (hop, step) in hops.iter().zip(steps.iter().skip(1)) {
        description.push_str(&format!(" -[{}]- {}", hop.relation, step.label));
    }

    Some(RankedPath {
        strength: path_strength(&hops),
        steps,
        hops,
        strategy,
        description,
    })
}

/// Strength descending, then fewer hops, then node keys
fn compare_paths(a: &RankedPath, b: &RankedPath) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then_with(|| a.hop_count().cmp(&b.hop_count()))
        .then_with(|| {
            let ka = a.steps.iter().map(|s| &s.key);
            let kb = b.steps.iter().map(|s| &s.key);
            ka.cmp(kb)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GrantDraft, GraphFilter, GraphStore, PersonId, RoleDraft};
    use crate::identity::PersonCandidate;

    fn org(id: &str) -> NodeKey {
        NodeKey::Organization(id.into())
    }

    fn add_grant(store: &mut GraphStore, funder: &str, recipient: &str, amount: f64) {
        for o in [funder, recipient] {
            store.ensure_organization(&o.into(), None);
        }
        store
            .upsert_grant(GrantDraft {
                funder: funder.into(),
                recipient: recipient.into(),
                recipient_name: None,
                amount,
                year: 2022,
                purpose: None,
            })
            .unwrap();
    }

    fn add_role(store: &mut GraphStore, name: &str, org: &str, title: &str) -> PersonId {
        store.ensure_organization(&org.into(), None);
        let person = store
            .resolve_person(&PersonCandidate::new(name, "990", format!("{}|{}", org, title)).unwrap())
            .person_id();
        store
            .upsert_role(RoleDraft {
                person,
                organization: org.into(),
                title: title.into(),
                start_date: None,
                end_date: None,
                source: "990".into(),
                filing_year: Some(2022),
                verified: true,
            })
            .unwrap();
        person
    }

    #[test]
    fn test_max_hops_is_required_and_bounded() {
        let pathfinder = Pathfinder::default();
        assert!(matches!(pathfinder.validate_hops(None), Err(QueryError::InvalidQuery(_))));
        assert!(pathfinder.validate_hops(Some(0)).is_err());
        assert!(pathfinder.validate_hops(Some(7)).is_err());
        assert_eq!(pathfinder.validate_hops(Some(6)), Ok(6));
    }

    #[test]
    fn test_grant_only_link_with_role_requirement() {
        let mut store = GraphStore::new();
        add_grant(&mut store, "X", "Y", 50_000.0);
        let network = Network::rebuild(&store, &GraphFilter::default());
        let pathfinder = Pathfinder::default();
        let cancel = CancelToken::new();

        let any = pathfinder
            .find_paths(&network, &org("X"), &org("Y"), Some(3), false, &cancel)
            .unwrap();
        assert_eq!(any.paths.len(), 1);
        assert_eq!(any.paths[0].strategy, PathStrategy::FunderReferral);

        let with_role = pathfinder
            .find_paths(&network, &org("X"), &org("Y"), Some(3), true, &cancel)
            .unwrap();
        assert!(with_role.paths.is_empty());
    }

    #[test]
    fn test_board_introduction_ranking() {
        let mut store = GraphStore::new();
        // X -grant- Y directly, and X ~ Ann ~ Y through board seats
        add_grant(&mut store, "X", "Y", 9.0);
        add_role(&mut store, "Ann Lee", "X", "Director");
        add_role(&mut store, "Ann Lee", "Y", "Director");
        store.rebuild_connections();
        let network = Network::rebuild(&store, &GraphFilter::default());

        let search = Pathfinder::default()
            .find_paths(&network, &org("X"), &org("Y"), Some(2), false, &CancelToken::new())
            .unwrap();
        assert_eq!(search.enumerated, 2);
        assert_eq!(search.paths.len(), 2);

        let best = &search.paths[0];
        // Two current role edges: 0.25 + 0.3 + 0.2
        assert!((best.strength - 0.75).abs() < 1e-9);
        assert_eq!(best.strategy, PathStrategy::BoardIntroduction);
        assert_eq!(best.description, "X -[board member]- Ann Lee -[board member]- Y");

        // Direct grant of 9: 0.5 + 0.3 × log10(10)/7
        let direct = &search.paths[1];
        assert!((direct.strength - (0.5 + 0.3 / 7.0)).abs() < 1e-9);
        assert!(best.strength > direct.strength);
    }

    #[test]
    fn test_bounds_respected() {
        let mut store = GraphStore::new();
        // A chain A-B-C-D-E plus a shortcut A-C
        for (f, r) in [("A", "B"), ("B", "C"), ("C", "D"), ("D", "E"), ("A", "C")] {
            add_grant(&mut store, f, r, 1_000.0);
        }
        let network = Network::rebuild(&store, &GraphFilter::default());
        let search = Pathfinder::default()
            .find_paths(&network, &org("A"), &org("E"), Some(3), false, &CancelToken::new())
            .unwrap();
        assert_eq!(search.paths.len(), 1);
        for path in &search.paths {
            assert!(path.hop_count() <= 3);
            let mut keys: Vec<&NodeKey> = path.steps.iter().map(|s| &s.key).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), path.steps.len());
        }
    }

    #[test]
    fn test_top_n_and_unknown_nodes() {
        let mut store = GraphStore::new();
        for mid in ["M1", "M2", "M3", "M4", "M5", "M6", "M7"] {
            add_grant(&mut store, "S", mid, 100.0);
            add_grant(&mut store, mid, "T", 100.0);
        }
        let network = Network::rebuild(&store, &GraphFilter::default());
        let pathfinder = Pathfinder::default();
        let search = pathfinder
            .find_paths(&network, &org("S"), &org("T"), Some(2), false, &CancelToken::new())
            .unwrap();
        assert_eq!(search.enumerated, 7);
        assert_eq!(search.paths.len(), 5);
        // Equal strength and length: ordered by node keys
        assert_eq!(search.paths[0].steps[1].key, org("M1"));
        assert_eq!(search.paths[4].steps[1].key, org("M5"));

        assert!(matches!(
            pathfinder.find_paths(&network, &org("S"), &org("nope"), Some(2), false, &CancelToken::new()),
            Err(QueryError::NodeNotFound(_))
        ));
    }
}
