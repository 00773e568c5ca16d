//! Per-organization freshness
//!
//! Fresh -> Stale on mutation, Stale -> Recomputing -> Fresh in a cycle.
//! A mutation that lands while its organization is Recomputing is remembered
//! and turns the finished recompute into Stale instead of Fresh, so any number
//! of such mutations cost exactly one further recompute.

use crate::graph::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Fresh,
    Stale,
    Recomputing,
}

#[derive(Debug, Default)]
pub struct StateTable {
    states: HashMap<OrgId, NodeState>,
    pending: HashSet<OrgId>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown organizations have never been computed and count as Stale
    pub fn state(&self, org: &OrgId) -> NodeState {
        self.states.get(org).copied().unwrap_or(NodeState::Stale)
    }

    pub fn mark_stale(&mut self, org: &OrgId) {
        match self.states.get(org) {
            Some(NodeState::Recomputing) => {
                self.pending.insert(org.clone());
            }
            _ => {
                self.states.insert(org.clone(), NodeState::Stale);
            }
        }
    }

    /// Move the stale organizations among `orgs` to Recomputing; returns them
    pub fn begin(&mut self, orgs: &[OrgId]) -> Vec<OrgId> {
        let mut started = Vec::new();
        for org in orgs {
            if self.state(org) == NodeState::Stale {
                self.states.insert(org.clone(), NodeState::Recomputing);
                started.push(org.clone());
            }
        }
        started
    }

    /// A run covering `orgs` was published in full
    pub fn complete(&mut self, orgs: &[OrgId]) {
        for org in orgs {
            let next = if self.pending.remove(org) {
                NodeState::Stale
            } else {
                NodeState::Fresh
            };
            self.states.insert(org.clone(), next);
        }
    }

    /// The recompute of `orgs` did not finish; they go back to Stale
    pub fn revert(&mut self, orgs: &[OrgId]) {
        for org in orgs {
            if self.states.get(org) == Some(&NodeState::Recomputing) {
                self.states.insert(org.clone(), NodeState::Stale);
            }
            self.pending.remove(org);
        }
    }

    pub fn forget(&mut self, org: &OrgId) {
        self.states.remove(org);
        self.pending.remove(org);
    }

    /// Tracked organizations currently in `state`
    pub fn in_state(&self, state: NodeState) -> BTreeSet<OrgId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(org, _)| org.clone())
            .collect()
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }
}
