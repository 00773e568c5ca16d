//! Metrics engine
//!
//! Computes one full metric set for an organization component. Raw values come
//! from a CSR view of the component alone; normalization uses the size of the
//! whole analysed organization graph, so recomputing one component gives the
//! same numbers as recomputing everything.

use crate::algo::{self, CancelToken};
use crate::config::{MetricsConfig, OrgInfluenceWeights};
use crate::graph::{
    Component, ComponentKey, EdgeDetail, EdgeKind, Network, NodeId, NodeKind, OrgId, PersonId, RoleKind,
};
use chrono::{DateTime, Utc};
use grantgraph_algorithms::{betweenness_centrality, betweenness_proxy, closeness_centrality, degree_centrality};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// How much work a recompute may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Exact betweenness (within the size limit) and closeness
    Full,
    /// Proxy betweenness, no closeness; the run is flagged degraded
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetweennessMethod {
    Exact,
    Proxy,
}

/// Graph-size context a run was computed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricContext {
    /// Organizations in the analysed graph (normalization base)
    pub graph_organizations: usize,
    pub component_organizations: usize,
    pub betweenness: BetweennessMethod,
    pub closeness_computed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgMetrics {
    pub degree_centrality: f64,
    pub betweenness: f64,
    /// `None` when the organization cannot reach the whole analysed graph
    pub closeness: Option<f64>,
    /// Distinct organization neighbors over Grant and Connection edges
    pub connection_count: usize,
    pub influence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonMetrics {
    pub total_roles: usize,
    pub distinct_organizations: usize,
    pub current_roles: usize,
    pub executive_roles: usize,
    pub board_chair_roles: usize,
    /// Connection edges for which this person is the only shared person
    pub bridge_count: usize,
    pub position_score: f64,
    pub network_score: f64,
    pub influence_score: f64,
}

/// One complete metric set for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRun {
    /// Assigned by the metric store on publish
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub component: ComponentKey,
    pub context: MetricContext,
    pub degraded: bool,
    pub organizations: BTreeMap<OrgId, OrgMetrics>,
    pub persons: BTreeMap<PersonId, PersonMetrics>,
}

/// Position weight of a current role
pub fn role_weight(kind: RoleKind) -> f64 {
    match kind {
        RoleKind::BoardChair => 3.0,
        RoleKind::Executive => 2.0,
        RoleKind::Board => 1.5,
        RoleKind::Advisory => 1.0,
        RoleKind::Staff => 0.5,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Self {
        MetricsEngine { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Compute every component of `network`, in component-key order
    pub fn compute_all(&self, network: &Network, mode: ComputeMode) -> Vec<MetricRun> {
        let cancel = CancelToken::new();
        network
            .organization_components()
            .par_iter()
            .map(|component| self.compute_component(network, component, mode, &cancel))
            .collect()
    }

    /// Compute one component.
    ///
    /// A cancelled exact run falls back to the proxy and drops closeness; the
    /// returned run is then flagged degraded.
    pub fn compute_component(
        &self,
        network: &Network,
        component: &Component,
        mode: ComputeMode,
        cancel: &CancelToken,
    ) -> MetricRun {
        let subset: BTreeSet<NodeId> = component.nodes.iter().copied().collect();
        let view = algo::organization_view(network, Some(&subset));
        let graph_n = network.nodes_of_kind(NodeKind::Organization).count();
        let comp_n = view.node_count;

        let degree_scale = ratio(comp_n.saturating_sub(1), graph_n.saturating_sub(1));
        let pair_scale = ratio(
            comp_n.saturating_sub(1) * comp_n.saturating_sub(2),
            graph_n.saturating_sub(1) * graph_n.saturating_sub(2),
        );

        let mut degraded = mode == ComputeMode::Degraded;
        let exact = if mode == ComputeMode::Full && comp_n <= self.config.exact_betweenness_max_nodes {
            let result = betweenness_centrality(&view, cancel);
            if result.is_none() {
                warn!("Exact betweenness cancelled for {}, using proxy", component.key);
                degraded = true;
            }
            result
        } else {
            None
        };
        let (betweenness, method) = match exact {
            Some(values) => (rescale(values, pair_scale), BetweennessMethod::Exact),
            None => (rescale(betweenness_proxy(&view), degree_scale), BetweennessMethod::Proxy),
        };

        let closeness: Option<HashMap<u64, Option<f64>>> = match mode {
            ComputeMode::Degraded => None,
            // Disconnected from the rest of the graph: closeness is absent everywhere
            ComputeMode::Full if comp_n < graph_n => {
                Some(view.index_to_node.iter().map(|&id| (id, None)).collect())
            }
            ComputeMode::Full => {
                let result = closeness_centrality(&view, cancel);
                if result.is_none() {
                    degraded = true;
                }
                result
            }
        };

        let degree = rescale(degree_centrality(&view), degree_scale);
        let mut organizations = BTreeMap::new();
        for (idx, &raw_id) in view.index_to_node.iter().enumerate() {
            let Some(org) = network.node(NodeId::new(raw_id)).and_then(|n| n.key.as_org()) else {
                continue;
            };
            let degree_centrality = degree.get(&raw_id).copied().unwrap_or(0.0);
            let betweenness = betweenness.get(&raw_id).copied().unwrap_or(0.0);
            let closeness = closeness.as_ref().and_then(|c| c.get(&raw_id).copied().flatten());
            let connection_count = view.out_degree(idx);
            organizations.insert(
                org.clone(),
                OrgMetrics {
                    degree_centrality,
                    betweenness,
                    closeness,
                    connection_count,
                    influence_score: organization_influence(
                        &self.config.organization,
                        degree_centrality,
                        betweenness,
                        closeness,
                        connection_count,
                    ),
                },
            );
        }

        let persons = self.person_metrics(network, component, &organizations);
        debug!(
            "Computed {}: {} organizations, {} persons, degraded={}",
            component.key,
            organizations.len(),
            persons.len(),
            degraded
        );

        MetricRun {
            version: 0,
            computed_at: Utc::now(),
            component: component.key.clone(),
            context: MetricContext {
                graph_organizations: graph_n,
                component_organizations: comp_n,
                betweenness: method,
                closeness_computed: closeness.is_some(),
            },
            degraded,
            organizations,
            persons,
        }
    }

    /// Metrics for every person whose home organization lies in `component`.
    /// A person's home is their smallest current organization, or their
    /// smallest organization when no role is current.
    fn person_metrics(
        &self,
        network: &Network,
        component: &Component,
        organizations: &BTreeMap<OrgId, OrgMetrics>,
    ) -> BTreeMap<PersonId, PersonMetrics> {
        let weights = &self.config.person;
        let in_component = |org: &OrgId| component.organizations.binary_search(org).is_ok();

        let mut bridges: HashMap<PersonId, usize> = HashMap::new();
        for edge in network.edges() {
            if let EdgeDetail::Connection { shared_people } = &edge.detail {
                let inside = network
                    .node(edge.source)
                    .and_then(|n| n.key.as_org())
                    .map_or(false, |org| in_component(org));
                if let ([person], true) = (shared_people.as_slice(), inside) {
                    *bridges.entry(*person).or_insert(0) += 1;
                }
            }
        }

        let mut result = BTreeMap::new();
        for node in network.nodes_of_kind(NodeKind::Person) {
            let Some(person) = node.key.as_person() else { continue };

            let mut metrics = PersonMetrics {
                total_roles: 0,
                distinct_organizations: 0,
                current_roles: 0,
                executive_roles: 0,
                board_chair_roles: 0,
                bridge_count: bridges.get(&person).copied().unwrap_or(0),
                position_score: 0.0,
                network_score: 0.0,
                influence_score: 0.0,
            };
            let mut all_orgs = BTreeSet::new();
            let mut current_orgs = BTreeSet::new();
            let mut position_sum = 0.0;

            for edge in network.incident(node.id, &[EdgeKind::Role]) {
                let EdgeDetail::Role { titles, current_kinds, .. } = &edge.detail else {
                    continue;
                };
                let Some(org) = edge
                    .other(node.id)
                    .and_then(|id| network.node(id))
                    .and_then(|n| n.key.as_org())
                else {
                    continue;
                };
                metrics.total_roles += titles.len();
                metrics.current_roles += current_kinds.len();
                for kind in current_kinds {
                    position_sum += role_weight(*kind);
                    match kind {
                        RoleKind::Executive => metrics.executive_roles += 1,
                        RoleKind::BoardChair => metrics.board_chair_roles += 1,
                        _ => {}
                    }
                }
                all_orgs.insert(org.clone());
                if !current_kinds.is_empty() {
                    current_orgs.insert(org.clone());
                }
            }

            let home = current_orgs.iter().next().or_else(|| all_orgs.iter().next());
            if !home.map_or(false, |org| in_component(org)) {
                continue;
            }

            metrics.distinct_organizations = all_orgs.len();
            let influences: Vec<f64> = current_orgs
                .iter()
                .filter_map(|org| organizations.get(org))
                .map(|m| m.influence_score)
                .collect();
            let mean_influence = if influences.is_empty() {
                0.0
            } else {
                influences.iter().sum::<f64>() / influences.len() as f64
            };

            metrics.position_score = (position_sum / weights.position_cap).min(1.0);
            metrics.network_score = weights.organization_share * mean_influence / 100.0
                + weights.bridge_share * (metrics.bridge_count as f64 / weights.bridge_cap).min(1.0);
            metrics.influence_score =
                100.0 * (weights.position * metrics.position_score + weights.network * metrics.network_score);
            result.insert(person, metrics);
        }
        result
    }
}

/// Organization influence in `[0, 100]`. Without closeness its weight is
/// dropped and the remaining weights renormalized.
pub(crate) fn organization_influence(
    weights: &OrgInfluenceWeights,
    degree: f64,
    betweenness: f64,
    closeness: Option<f64>,
    connections: usize,
) -> f64 {
    let c = connections as f64;
    let saturation = c / (c + weights.connection_saturation);
    let mut sum = weights.degree * degree + weights.betweenness * betweenness + weights.connections * saturation;
    let mut total = weights.degree + weights.betweenness + weights.connections;
    if let Some(closeness) = closeness {
        sum += weights.closeness * closeness;
        total += weights.closeness;
    }
    if total <= 0.0 {
        return 0.0;
    }
    (100.0 * sum / total).clamp(0.0, 100.0)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn rescale(values: HashMap<u64, f64>, scale: f64) -> HashMap<u64, f64> {
    values.into_iter().map(|(id, v)| (id, v * scale)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GrantDraft, GraphFilter, GraphStore, RoleDraft};
    use crate::identity::PersonCandidate;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn grant(store: &mut GraphStore, funder: &str, recipient: &str) {
        for org in [funder, recipient] {
            store.ensure_organization(&org.into(), None);
        }
        store
            .upsert_grant(GrantDraft {
                funder: funder.into(),
                recipient: recipient.into(),
                recipient_name: None,
                amount: 10_000.0,
                year: 2022,
                purpose: None,
            })
            .unwrap();
    }

    fn role(store: &mut GraphStore, name: &str, org: &str, title: &str, ended: bool) -> PersonId {
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
                end_date: ended.then(|| chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
                source: "990".into(),
                filing_year: Some(2022),
                verified: false,
            })
            .unwrap();
        person
    }

    #[test]
    fn test_star_component() {
        // F funds A, B, C: F is the only broker
        let mut store = GraphStore::new();
        for r in ["A", "B", "C"] {
            grant(&mut store, "F", r);
        }
        let network = Network::rebuild(&store, &GraphFilter::default());
        let runs = MetricsEngine::default().compute_all(&network, ComputeMode::Full);
        assert_eq!(runs.len(), 1);

        let run = &runs[0];
        assert!(!run.degraded);
        assert_eq!(run.context.betweenness, BetweennessMethod::Exact);
        let hub = &run.organizations[&OrgId::from("F")];
        assert!(approx(hub.degree_centrality, 1.0));
        assert!(approx(hub.betweenness, 1.0));
        assert!(approx(hub.closeness.unwrap(), 1.0));
        assert_eq!(hub.connection_count, 3);
        // 100 × (0.30 + 0.35 + 0.20 + 0.15 × 3/8)
        assert!(approx(hub.influence_score, 90.625));

        let leaf = &run.organizations[&OrgId::from("A")];
        assert!(approx(leaf.betweenness, 0.0));
        assert!(approx(leaf.closeness.unwrap(), 0.6));
    }

    #[test]
    fn test_disconnected_components_drop_closeness() {
        let mut store = GraphStore::new();
        grant(&mut store, "A", "B");
        grant(&mut store, "C", "D");
        grant(&mut store, "D", "E");
        let network = Network::rebuild(&store, &GraphFilter::default());
        let runs = MetricsEngine::default().compute_all(&network, ComputeMode::Full);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].component, ComponentKey("A".into()));

        let d = &runs[1].organizations[&OrgId::from("D")];
        assert_eq!(d.closeness, None);
        assert_eq!(runs[1].context.graph_organizations, 5);
        // Normalized by the whole graph: degree 2 / (5 - 1), one of (4 × 3) ordered pairs
        assert!(approx(d.degree_centrality, 0.5));
        assert!(approx(d.betweenness, 2.0 / 12.0));
        let expected = organization_influence(&Default::default(), 0.5, 2.0 / 12.0, None, 2);
        assert!(approx(d.influence_score, expected));
    }

    #[test]
    fn test_component_recompute_matches_full() {
        let mut store = GraphStore::new();
        grant(&mut store, "A", "B");
        grant(&mut store, "B", "C");
        grant(&mut store, "X", "Y");
        let network = Network::rebuild(&store, &GraphFilter::default());
        let engine = MetricsEngine::default();
        let all = engine.compute_all(&network, ComputeMode::Full);
        let components = network.organization_components();
        let single = engine.compute_component(&network, &components[0], ComputeMode::Full, &CancelToken::new());
        assert_eq!(single.organizations, all[0].organizations);
    }

    #[test]
    fn test_degraded_mode_and_cancellation() {
        let mut store = GraphStore::new();
        grant(&mut store, "A", "B");
        grant(&mut store, "B", "C");
        let network = Network::rebuild(&store, &GraphFilter::default());
        let engine = MetricsEngine::default();
        let component = &network.organization_components()[0];

        let degraded = engine.compute_component(&network, component, ComputeMode::Degraded, &CancelToken::new());
        assert!(degraded.degraded);
        assert_eq!(degraded.context.betweenness, BetweennessMethod::Proxy);
        assert!(!degraded.context.closeness_computed);
        assert!(degraded.organizations.values().all(|m| m.closeness.is_none()));

        let cancel = CancelToken::new();
        cancel.cancel();
        let cancelled = engine.compute_component(&network, component, ComputeMode::Full, &cancel);
        assert!(cancelled.degraded);
        assert_eq!(cancelled.organizations, degraded.organizations);
    }

    #[test]
    fn test_size_limit_uses_proxy_without_degrading() {
        let mut store = GraphStore::new();
        grant(&mut store, "A", "B");
        grant(&mut store, "B", "C");
        let network = Network::rebuild(&store, &GraphFilter::default());
        let engine = MetricsEngine::new(MetricsConfig {
            exact_betweenness_max_nodes: 2,
            ..Default::default()
        });
        let run = &engine.compute_all(&network, ComputeMode::Full)[0];
        assert!(!run.degraded);
        assert_eq!(run.context.betweenness, BetweennessMethod::Proxy);
        assert!(run.context.closeness_computed);
        // Middle of a path: degree 1.0, no triangle
        assert!(approx(run.organizations[&OrgId::from("B")].betweenness, 1.0));
    }

    #[test]
    fn test_person_metrics() {
        let mut store = GraphStore::new();
        let ann = role(&mut store, "Ann Lee", "A", "Board Chair", false);
        role(&mut store, "Ann Lee", "B", "Director", false);
        role(&mut store, "Ann Lee", "C", "CEO", true);
        let bob = role(&mut store, "Bob Park", "B", "Program Officer", false);
        store.rebuild_connections();

        let network = Network::rebuild(&store, &GraphFilter::default());
        let runs = MetricsEngine::default().compute_all(&network, ComputeMode::Full);
        let home = runs.iter().find(|r| r.component == ComponentKey("A".into())).unwrap();

        let metrics = &home.persons[&ann];
        assert_eq!(metrics.total_roles, 3);
        assert_eq!(metrics.distinct_organizations, 3);
        assert_eq!(metrics.current_roles, 2);
        assert_eq!(metrics.board_chair_roles, 1);
        assert_eq!(metrics.executive_roles, 0);
        assert_eq!(metrics.bridge_count, 1);
        // (3.0 + 1.5) / 10
        assert!(approx(metrics.position_score, 0.45));

        let a = home.organizations[&OrgId::from("A")].influence_score;
        let b = home.organizations[&OrgId::from("B")].influence_score;
        let network_score = 0.6 * (a + b) / 200.0 + 0.4 * 0.2;
        assert!(approx(metrics.network_score, network_score));
        assert!(approx(metrics.influence_score, 100.0 * (0.4 * 0.45 + 0.6 * network_score)));

        let bob_metrics = &home.persons[&bob];
        assert_eq!(bob_metrics.bridge_count, 0);
        assert!(approx(bob_metrics.position_score, 0.05));

        // Each person is reported by exactly one run
        let reported: usize = runs.iter().map(|r| r.persons.len()).sum();
        assert_eq!(reported, 2);
    }

    #[test]
    fn test_influence_renormalizes_without_closeness() {
        let weights = OrgInfluenceWeights::default();
        let with = organization_influence(&weights, 0.5, 0.5, Some(0.5), 5);
        let without = organization_influence(&weights, 0.5, 0.5, None, 5);
        assert!(approx(with, 100.0 * (0.30 * 0.5 + 0.35 * 0.5 + 0.20 * 0.5 + 0.15 * 0.5)));
        assert!(approx(without, 100.0 * (0.30 * 0.5 + 0.35 * 0.5 + 0.15 * 0.5) / 0.80));
    }
}
