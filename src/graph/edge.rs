//! Edges of the in-memory relationship network

use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeKind, NodeId, PersonId, RoleKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind-specific payload of a network edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeDetail {
    /// All Role rows between one person and one organization
    Role {
        titles: Vec<String>,
        /// Kinds of every role row, current or not
        kinds: Vec<RoleKind>,
        /// Kinds of the current role rows only
        current_kinds: Vec<RoleKind>,
        filing_years: BTreeSet<i32>,
    },
    Grant {
        /// Total over the contributions selected by the view's year filter
        total_amount: f64,
        years: Vec<i32>,
        purposes: Vec<String>,
    },
    Connection {
        shared_people: Vec<PersonId>,
    },
}

/// An edge in the network view
///
/// Role edges run person -> organization, Grant edges funder -> recipient,
/// Connection edges low -> high organization of the canonical pair. Algorithms
/// treat all of them as undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub weight: f64,
    pub detail: EdgeDetail,
}

impl Edge {
    pub fn role(
        id: EdgeId,
        person: NodeId,
        organization: NodeId,
        titles: Vec<String>,
        kinds: Vec<RoleKind>,
        current_kinds: Vec<RoleKind>,
        filing_years: BTreeSet<i32>,
    ) -> Self {
        let weight = if current_kinds.is_empty() { 0.5 } else { 1.0 };
        Edge {
            id,
            source: person,
            target: organization,
            kind: EdgeKind::Role,
            weight,
            detail: EdgeDetail::Role {
                titles,
                kinds,
                current_kinds,
                filing_years,
            },
        }
    }

    pub fn grant(
        id: EdgeId,
        funder: NodeId,
        recipient: NodeId,
        total_amount: f64,
        years: Vec<i32>,
        purposes: Vec<String>,
    ) -> Self {
        Edge {
            id,
            source: funder,
            target: recipient,
            kind: EdgeKind::Grant,
            weight: grant_weight(total_amount),
            detail: EdgeDetail::Grant {
                total_amount,
                years,
                purposes,
            },
        }
    }

    pub fn connection(id: EdgeId, low: NodeId, high: NodeId, shared_people: Vec<PersonId>) -> Self {
        Edge {
            id,
            source: low,
            target: high,
            kind: EdgeKind::Connection,
            weight: shared_people.len() as f64,
            detail: EdgeDetail::Connection { shared_people },
        }
    }

    /// The endpoint opposite `node`, if `node` is an endpoint
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }

    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }

    /// Role edges are current when at least one underlying role is; other kinds always are
    pub fn is_current(&self) -> bool {
        match &self.detail {
            EdgeDetail::Role { current_kinds, .. } => !current_kinds.is_empty(),
            _ => true,
        }
    }

    /// Flattened attributes for the exchange formats
    pub fn properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("weight".to_string(), self.weight.into());
        match &self.detail {
            EdgeDetail::Role { titles, current_kinds, filing_years, .. } => {
                props.insert("titles".to_string(), titles.clone().into());
                props.insert("current".to_string(), (!current_kinds.is_empty()).into());
                let years: Vec<i32> = filing_years.iter().copied().collect();
                props.insert("filing_years".to_string(), years.into());
            }
            EdgeDetail::Grant { total_amount, years, purposes } => {
                props.insert("total_amount".to_string(), (*total_amount).into());
                props.insert("years".to_string(), years.clone().into());
                if !purposes.is_empty() {
                    props.insert("purposes".to_string(), purposes.clone().into());
                }
            }
            EdgeDetail::Connection { shared_people } => {
                props.insert("shared_people".to_string(), PropertyValue::from(shared_people.len()));
            }
        }
        props
    }
}

/// Grant edge weight in `[0, 1]`: `min(1, log10(1 + amount) / 7)`
pub fn grant_weight(total_amount: f64) -> f64 {
    ((1.0 + total_amount.max(0.0)).log10() / 7.0).min(1.0)
}
