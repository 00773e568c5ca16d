//! Funder similarity and peer groups
//!
//! Similarity is the Jaccard index of two funders' recipient sets, lifted by a
//! bounded bonus for shared recipients both funded recently. Peer groups are
//! Louvain communities of the thresholded similarity graph.

use crate::config::MetricsConfig;
use crate::graph::{GraphStore, OrgId};
use grantgraph_algorithms::{jaccard, louvain, GraphView, LouvainConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    /// The smaller id of the pair
    pub a: OrgId,
    pub b: OrgId,
    pub jaccard: f64,
    pub shared_recipients: usize,
    /// Shared recipients funded by both within the recency window
    pub recent_shared: usize,
    /// `min(1, jaccard × (1 + bonus × recent_shared / shared_recipients))`
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunderSimilarityGraph {
    /// Funders considered, sorted; ids without grants are left out
    pub funders: Vec<OrgId>,
    pub threshold: f64,
    pub reference_year: Option<i32>,
    /// Pairs scoring at or above the threshold, ordered by (a, b)
    pub edges: Vec<SimilarityEdge>,
}

impl FunderSimilarityGraph {
    pub fn score(&self, x: &OrgId, y: &OrgId) -> Option<f64> {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        self.edges
            .iter()
            .find(|e| &e.a == a && &e.b == b)
            .map(|e| e.score)
    }
}

/// A community of at least two mutually similar funders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerGroup {
    pub id: usize,
    pub funders: Vec<OrgId>,
    pub mean_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub graph: FunderSimilarityGraph,
    pub peer_groups: Vec<PeerGroup>,
    pub modularity: f64,
}

/// Recipient -> years funded
type Portfolio = BTreeMap<OrgId, BTreeSet<i32>>;

/// Pairwise similarity of `funder_ids` (every funder in the store when empty)
/// and the peer groups among them.
pub fn funder_similarity(
    store: &GraphStore,
    funder_ids: &[OrgId],
    threshold: f64,
    config: &MetricsConfig,
) -> SimilarityReport {
    let requested: BTreeSet<OrgId> = if funder_ids.is_empty() {
        store.grants().map(|g| g.funder.clone()).collect()
    } else {
        funder_ids.iter().cloned().collect()
    };

    let portfolios: Vec<(OrgId, Portfolio)> = requested
        .into_iter()
        .filter_map(|funder| {
            let portfolio: Portfolio = store
                .grants_from(&funder)
                .map(|g| (g.recipient.clone(), g.years.iter().copied().collect()))
                .collect();
            (!portfolio.is_empty()).then_some((funder, portfolio))
        })
        .collect();

    let reference_year = config.reference_year.or_else(|| {
        portfolios
            .iter()
            .flat_map(|(_, p)| p.values().flat_map(|years| years.iter().copied()))
            .max()
    });
    let recent_from = reference_year.map(|year| year - config.recency_window_years + 1);
    let is_recent = |years: &BTreeSet<i32>| match (recent_from, reference_year) {
        (Some(from), Some(to)) => years.range(from..=to).next().is_some(),
        _ => false,
    };

    let recipient_sets: Vec<BTreeSet<&OrgId>> = portfolios.iter().map(|(_, p)| p.keys().collect()).collect();
    let n = portfolios.len();

    let edges: Vec<(usize, usize, SimilarityEdge)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let portfolios = &portfolios;
            let recipient_sets = &recipient_sets;
            let is_recent = &is_recent;
            (i + 1..n).filter_map(move |j| {
                let (a, pa) = &portfolios[i];
                let (b, pb) = &portfolios[j];
                let jaccard = jaccard(&recipient_sets[i], &recipient_sets[j]);
                let shared: Vec<&OrgId> = recipient_sets[i].intersection(&recipient_sets[j]).copied().collect();
                if shared.is_empty() {
                    return None;
                }
                let recent_shared = shared
                    .iter()
                    .filter(|r| is_recent(&pa[**r]) && is_recent(&pb[**r]))
                    .count();
                let bonus = config.recency_bonus * recent_shared as f64 / shared.len() as f64;
                let score = (jaccard * (1.0 + bonus)).min(1.0);
                (score >= threshold).then(|| {
                    (
                        i,
                        j,
                        SimilarityEdge {
                            a: a.clone(),
                            b: b.clone(),
                            jaccard,
                            shared_recipients: shared.len(),
                            recent_shared,
                            score,
                        },
                    )
                })
            })
        })
        .collect();

    let view = GraphView::undirected(
        (0..n as u64).collect(),
        &edges.iter().map(|(i, j, e)| (*i, *j, e.score)).collect::<Vec<_>>(),
    );
    let partition = louvain(
        &view,
        &LouvainConfig {
            seed: config.louvain_seed,
            min_gain: config.min_modularity_gain,
            ..Default::default()
        },
    );

    let peer_groups: Vec<PeerGroup> = partition
        .communities
        .iter()
        .filter(|members| members.len() > 1)
        .enumerate()
        .map(|(id, members)| {
            let inside: BTreeSet<usize> = members.iter().map(|&m| m as usize).collect();
            let scores: Vec<f64> = edges
                .iter()
                .filter(|(i, j, _)| inside.contains(i) && inside.contains(j))
                .map(|(_, _, e)| e.score)
                .collect();
            PeerGroup {
                id,
                funders: members.iter().map(|&m| portfolios[m as usize].0.clone()).collect(),
                mean_similarity: if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                },
            }
        })
        .collect();

    debug!(
        "Funder similarity: {} funders, {} edges at >= {}, {} peer groups",
        n,
        edges.len(),
        threshold,
        peer_groups.len()
    );

    SimilarityReport {
        graph: FunderSimilarityGraph {
            funders: portfolios.iter().map(|(f, _)| f.clone()).collect(),
            threshold,
            reference_year,
            edges: edges.into_iter().map(|(_, _, e)| e).collect(),
        },
        peer_groups,
        modularity: partition.modularity,
    }
}
