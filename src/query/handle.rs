//! Graph handle
//!
//! A filtered, immutable network view plus access to the published metrics.
//! Cheap to clone; every query on it is read-only.

use super::paths::{PathSearch, Pathfinder};
use super::{QueryError, QueryResult};
use crate::algo::CancelToken;
use crate::config::PathfinderConfig;
use crate::graph::{EdgeDetail, EdgeKind, GraphFilter, GraphStore, Network, NodeId, NodeKey, NodeKind, OrgId, PersonId};
use crate::metrics::{InfluenceReport, SharedMetrics};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Number of people reported by `stats()`
pub const TOP_CONNECTORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoFunder {
    pub funder: OrgId,
    pub name: String,
    pub shared_recipients: Vec<OrgId>,
}

impl CoFunder {
    pub fn shared_count(&self) -> usize {
        self.shared_recipients.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedRecipient {
    pub recipient: OrgId,
    pub name: String,
    pub amount_from_a: f64,
    pub amount_from_b: f64,
}

/// A person ranked by how many organizations they currently serve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub person: PersonId,
    pub name: String,
    pub organizations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// `2E / (N (N - 1))`
    pub density: f64,
    pub top_connectors: Vec<Connector>,
}

#[derive(Debug, Clone)]
pub struct GraphHandle {
    network: Arc<Network>,
    metrics: SharedMetrics,
    pathfinder: Pathfinder,
}

impl GraphHandle {
    /// Project `store` through `filter`
    pub fn build(store: &GraphStore, filter: &GraphFilter, metrics: SharedMetrics, config: PathfinderConfig) -> Self {
        GraphHandle {
            network: Arc::new(Network::rebuild(store, filter)),
            metrics,
            pathfinder: Pathfinder::new(config),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    fn organization_node(&self, org: &OrgId) -> QueryResult<NodeId> {
        self.network
            .node_id(&NodeKey::Organization(org.clone()))
            .ok_or_else(|| QueryError::NodeNotFound(org.to_string()))
    }

    fn label(&self, id: NodeId) -> String {
        self.network.node(id).map(|n| n.label.clone()).unwrap_or_default()
    }

    /// Recipient -> amount for grants made by `funder`
    fn recipients_of(&self, funder: NodeId) -> BTreeMap<NodeId, f64> {
        self.network
            .incident(funder, &[EdgeKind::Grant])
            .filter(|e| e.source == funder)
            .filter_map(|e| match &e.detail {
                EdgeDetail::Grant { total_amount, .. } => Some((e.target, *total_amount)),
                _ => None,
            })
            .collect()
    }

    /// Funders sharing at least one recipient with `org`, most shared first
    pub fn co_funders(&self, org: &OrgId) -> QueryResult<Vec<CoFunder>> {
        let funder = self.organization_node(org)?;
        let mut shared: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for recipient in self.recipients_of(funder).into_keys() {
            for edge in self.network.incident(recipient, &[EdgeKind::Grant]) {
                if edge.target == recipient && edge.source != funder {
                    shared.entry(edge.source).or_default().insert(recipient);
                }
            }
        }

        let key_of = |id: &NodeId| self.network.node(*id).and_then(|n| n.key.as_org().cloned());
        let mut result: Vec<CoFunder> = shared
            .into_iter()
            .filter_map(|(other, recipients)| {
                let mut shared_recipients: Vec<OrgId> = recipients.iter().filter_map(key_of).collect();
                shared_recipients.sort();
                Some(CoFunder {
                    funder: key_of(&other)?,
                    name: self.label(other),
                    shared_recipients,
                })
            })
            .collect();
        result.sort_by(|a, b| {
            b.shared_count()
                .cmp(&a.shared_count())
                .then_with(|| a.funder.cmp(&b.funder))
        });
        Ok(result)
    }

    /// Recipients funded by both `a` and `b`, ordered by recipient id
    pub fn shared_recipients(&self, a: &OrgId, b: &OrgId) -> QueryResult<Vec<SharedRecipient>> {
        let from_a = self.recipients_of(self.organization_node(a)?);
        let from_b = self.recipients_of(self.organization_node(b)?);

        let mut result: Vec<SharedRecipient> = from_a
            .iter()
            .filter_map(|(recipient, amount_a)| {
                let amount_b = from_b.get(recipient)?;
                let node = self.network.node(*recipient)?;
                Some(SharedRecipient {
                    recipient: node.key.as_org()?.clone(),
                    name: node.label.clone(),
                    amount_from_a: *amount_a,
                    amount_from_b: *amount_b,
                })
            })
            .collect();
        result.sort_by(|x, y| x.recipient.cmp(&y.recipient));
        Ok(result)
    }

    pub fn find_paths(
        &self,
        source: &NodeKey,
        target: &NodeKey,
        max_hops: Option<usize>,
        require_role_hop: bool,
    ) -> QueryResult<PathSearch> {
        self.find_paths_cancellable(source, target, max_hops, require_role_hop, &CancelToken::new())
    }

    pub fn find_paths_cancellable(
        &self,
        source: &NodeKey,
        target: &NodeKey,
        max_hops: Option<usize>,
        require_role_hop: bool,
        cancel: &CancelToken,
    ) -> QueryResult<PathSearch> {
        self.pathfinder
            .find_paths(&self.network, source, target, max_hops, require_role_hop, cancel)
    }

    /// Latest published influence of a node in this view. Degraded runs are
    /// returned with their flag set.
    pub fn influence(&self, key: &NodeKey) -> QueryResult<InfluenceReport> {
        if self.network.node_id(key).is_none() {
            return Err(QueryError::NodeNotFound(key.to_string()));
        }
        self.metrics
            .read()
            .influence(key)
            .ok_or_else(|| QueryError::MetricsUnavailable(format!("no metrics published for {}", key)))
    }

    pub fn stats(&self) -> GraphStats {
        let n = self.network.node_count();
        let e = self.network.edge_count();
        // Parallel edges (A->B and B->A grants, a grant beside a connection) count once
        let linked: BTreeSet<(NodeId, NodeId)> = self
            .network
            .edges()
            .iter()
            .filter(|edge| edge.source != edge.target)
            .map(|edge| (edge.source.min(edge.target), edge.source.max(edge.target)))
            .collect();
        let density = if n > 1 {
            2.0 * linked.len() as f64 / (n as f64 * (n as f64 - 1.0))
        } else {
            0.0
        };

        let mut top_connectors: Vec<Connector> = self
            .network
            .nodes_of_kind(NodeKind::Person)
            .filter_map(|node| {
                let organizations = self
                    .network
                    .incident(node.id, &[EdgeKind::Role])
                    .filter(|edge| edge.is_current())
                    .count();
                Some(Connector {
                    person: node.key.as_person()?,
                    name: node.label.clone(),
                    organizations,
                })
            })
            .filter(|c| c.organizations > 0)
            .collect();
        top_connectors.sort_by(|a, b| {
            b.organizations
                .cmp(&a.organizations)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.person.cmp(&b.person))
        });
        top_connectors.truncate(TOP_CONNECTORS);

        GraphStats {
            node_count: n,
            edge_count: e,
            density,
            top_connectors,
        }
    }
}
