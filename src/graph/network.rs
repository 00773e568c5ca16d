//! In-memory network view
//!
//! An arena of typed nodes and edges addressed by dense ids, rebuilt wholesale
//! from the relational store. Nothing in the view holds references into the
//! store, so cycles in the underlying relationships are harmless.

use super::edge::Edge;
use super::node::Node;
use super::records::Role;
use super::store::GraphStore;
use super::types::{EdgeId, EdgeKind, NodeId, NodeKey, NodeKind, OrgId, PersonId};
use crate::algo;
use grantgraph_algorithms::weakly_connected_components;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Selection applied while projecting the store into a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilter {
    pub edge_kinds: BTreeSet<EdgeKind>,
    /// Only grant contributions filed in these years
    pub grant_years: Option<HashSet<i32>>,
    pub current_roles_only: bool,
    /// Restrict to these organizations (and the people holding roles there)
    pub organizations: Option<BTreeSet<OrgId>>,
}

impl Default for GraphFilter {
    fn default() -> Self {
        GraphFilter {
            edge_kinds: EdgeKind::ALL.into_iter().collect(),
            grant_years: None,
            current_roles_only: false,
            organizations: None,
        }
    }
}

impl GraphFilter {
    pub fn with_edge_kinds(mut self, kinds: &[EdgeKind]) -> Self {
        self.edge_kinds = kinds.iter().copied().collect();
        self
    }

    pub fn with_grant_years(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        self.grant_years = Some(years.into_iter().collect());
        self
    }

    pub fn current_roles_only(mut self) -> Self {
        self.current_roles_only = true;
        self
    }

    pub fn with_organizations(mut self, orgs: impl IntoIterator<Item = OrgId>) -> Self {
        self.organizations = Some(orgs.into_iter().collect());
        self
    }

    pub fn includes(&self, kind: EdgeKind) -> bool {
        self.edge_kinds.contains(&kind)
    }

    fn includes_organization(&self, id: &OrgId) -> bool {
        self.organizations.as_ref().map_or(true, |orgs| orgs.contains(id))
    }
}

/// Identifies a connected component of the organization-level network by its
/// smallest organization id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey(pub OrgId);

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component[{}]", self.0)
    }
}

/// A connected component of organizations joined by Grant or Connection edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub key: ComponentKey,
    /// Sorted
    pub organizations: Vec<OrgId>,
    pub nodes: Vec<NodeId>,
}

/// Arena of nodes and edges with per-node adjacency lists
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<EdgeId>>,
    index: FxHashMap<NodeKey, NodeId>,
    filter: GraphFilter,
}

impl Network {
    /// Project the relational store into a fresh network.
    ///
    /// Organizations are added in id order, then persons in id order, so the
    /// dense ids are stable for a given store and filter. All Role rows between
    /// one person and one organization fold into a single Role edge.
    pub fn rebuild(store: &GraphStore, filter: &GraphFilter) -> Self {
        let mut network = Network {
            filter: filter.clone(),
            ..Default::default()
        };

        let mut orgs: Vec<_> = store
            .organizations()
            .filter(|org| filter.includes_organization(&org.id))
            .collect();
        orgs.sort_by(|a, b| a.id.cmp(&b.id));
        for org in orgs {
            network.push_node(|id| Node::organization(id, org));
        }

        if filter.includes(EdgeKind::Role) {
            network.add_role_edges(store, filter);
        }
        if filter.includes(EdgeKind::Grant) {
            network.add_grant_edges(store, filter);
        }
        if filter.includes(EdgeKind::Connection) {
            for connection in store.connections() {
                let low = network.node_id(&NodeKey::Organization(connection.pair.low().clone()));
                let high = network.node_id(&NodeKey::Organization(connection.pair.high().clone()));
                if let (Some(low), Some(high)) = (low, high) {
                    let shared = connection.shared_people.iter().copied().collect();
                    network.push_edge(|id| Edge::connection(id, low, high, shared));
                }
            }
        }

        network
    }

    fn add_role_edges(&mut self, store: &GraphStore, filter: &GraphFilter) {
        let mut grouped: BTreeMap<(PersonId, OrgId), Vec<&Role>> = BTreeMap::new();
        for role in store.roles() {
            if filter.current_roles_only && !role.is_current() {
                continue;
            }
            if !self.index.contains_key(&NodeKey::Organization(role.organization.clone())) {
                continue;
            }
            grouped
                .entry((role.person, role.organization.clone()))
                .or_default()
                .push(role);
        }

        let people: BTreeSet<PersonId> = grouped.keys().map(|(person, _)| *person).collect();
        for person_id in people {
            if let Some(person) = store.person(person_id) {
                self.push_node(|id| Node::person(id, person));
            }
        }

        for ((person, org), roles) in grouped {
            let (Some(p), Some(o)) = (
                self.node_id(&NodeKey::Person(person)),
                self.node_id(&NodeKey::Organization(org)),
            ) else {
                continue;
            };
            let titles = roles.iter().map(|r| r.title.clone()).collect();
            let kinds = roles.iter().map(|r| r.kind).collect();
            let current_kinds = roles.iter().filter(|r| r.is_current()).map(|r| r.kind).collect();
            let filing_years = roles.iter().flat_map(|r| r.filing_years.iter().copied()).collect();
            self.push_edge(|id| Edge::role(id, p, o, titles, kinds, current_kinds, filing_years));
        }
    }

    fn add_grant_edges(&mut self, store: &GraphStore, filter: &GraphFilter) {
        let years = filter.grant_years.as_ref();
        for grant in store.grants() {
            if !grant.is_funded_in(years) {
                continue;
            }
            let funder = self.node_id(&NodeKey::Organization(grant.funder.clone()));
            let recipient = self.node_id(&NodeKey::Organization(grant.recipient.clone()));
            let (Some(funder), Some(recipient)) = (funder, recipient) else {
                continue;
            };

            let mut purposes: Vec<String> = Vec::new();
            let mut grant_years = Vec::new();
            for contribution in grant.contributions_in(years) {
                grant_years.push(contribution.year);
                if let Some(purpose) = &contribution.purpose {
                    if !purposes.contains(purpose) {
                        purposes.push(purpose.clone());
                    }
                }
            }
            let total = grant.amount_in(years);
            self.push_edge(|id| Edge::grant(id, funder, recipient, total, grant_years, purposes));
        }
    }

    fn push_node(&mut self, make: impl FnOnce(NodeId) -> Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        let node = make(id);
        self.index.insert(node.key.clone(), id);
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        id
    }

    fn push_edge(&mut self, make: impl FnOnce(EdgeId) -> Edge) -> EdgeId {
        let id = EdgeId::new(self.edges.len() as u64);
        let edge = make(id);
        self.adjacency[edge.source.index()].push(id);
        if edge.target != edge.source {
            self.adjacency[edge.target.index()].push(id);
        }
        self.edges.push(edge);
        id
    }

    pub fn filter(&self) -> &GraphFilter {
        &self.filter
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.as_u64() as usize)
    }

    pub fn node_id(&self, key: &NodeKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn node_by_key(&self, key: &NodeKey) -> Option<&Node> {
        self.node_id(key).and_then(|id| self.node(id))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }

    /// Edges incident to `id`, restricted to `kinds` (all kinds when empty)
    pub fn incident<'a>(&'a self, id: NodeId, kinds: &'a [EdgeKind]) -> impl Iterator<Item = &'a Edge> + 'a {
        self.adjacency
            .get(id.index())
            .into_iter()
            .flatten()
            .filter_map(move |eid| self.edge(*eid))
            .filter(move |edge| kinds.is_empty() || kinds.contains(&edge.kind))
    }

    /// Distinct neighbors of `id` over `kinds`, in id order
    pub fn neighbors(&self, id: NodeId, kinds: &[EdgeKind]) -> Vec<NodeId> {
        let set: BTreeSet<NodeId> = self.incident(id, kinds).filter_map(|e| e.other(id)).collect();
        set.into_iter().collect()
    }

    pub fn edges_between<'s>(&'s self, a: NodeId, b: NodeId, kinds: &'s [EdgeKind]) -> Vec<&'s Edge> {
        self.incident(a, kinds).filter(|e| e.connects(a, b)).collect()
    }

    /// Connected components of the organization-level network (Grant and
    /// Connection edges), ordered by key
    pub fn organization_components(&self) -> Vec<Component> {
        let view = algo::organization_view(self, None);
        let wcc = weakly_connected_components(&view);

        let mut components: Vec<Component> = wcc
            .components
            .into_values()
            .filter_map(|members| {
                let mut nodes: Vec<NodeId> = members.into_iter().map(NodeId::new).collect();
                nodes.sort();
                let mut organizations: Vec<OrgId> = nodes
                    .iter()
                    .filter_map(|id| self.node(*id).and_then(|n| n.key.as_org().cloned()))
                    .collect();
                organizations.sort();
                let key = ComponentKey(organizations.first()?.clone());
                Some(Component { key, organizations, nodes })
            })
            .collect();
        components.sort_by(|a, b| a.key.cmp(&b.key));
        components
    }
}
