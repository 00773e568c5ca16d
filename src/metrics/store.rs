//! Versioned metric store
//!
//! Holds the latest published run per component. Runs are immutable and shared
//! as `Arc`s, so a reader holding one never observes a later publish.

use super::engine::{MetricRun, OrgMetrics, PersonMetrics};
use crate::graph::{ComponentKey, NodeKey, OrgId, PersonId};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeMetrics {
    Organization(OrgMetrics),
    Person(PersonMetrics),
}

/// Influence of one node together with the provenance of the run it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceReport {
    pub key: NodeKey,
    pub influence_score: f64,
    pub degraded: bool,
    pub version: u64,
    pub computed_at: DateTime<Utc>,
    pub component: ComponentKey,
    pub metrics: NodeMetrics,
}

#[derive(Debug, Default)]
pub struct MetricStore {
    version: u64,
    runs: BTreeMap<ComponentKey, Arc<MetricRun>>,
    organizations: FxHashMap<OrgId, ComponentKey>,
    persons: FxHashMap<PersonId, ComponentKey>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the most recent publish; 0 before the first
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the run of `run.component` wholesale.
    ///
    /// Nodes move to the new run; nodes the previous run of the same component
    /// covered but the new one does not are forgotten. Runs left without any
    /// node are dropped.
    pub fn publish(&mut self, mut run: MetricRun) -> Arc<MetricRun> {
        self.version += 1;
        run.version = self.version;
        let run = Arc::new(run);
        let key = run.component.clone();

        self.organizations
            .retain(|org, owner| *owner != key || run.organizations.contains_key(org));
        self.persons
            .retain(|person, owner| *owner != key || run.persons.contains_key(person));
        for org in run.organizations.keys() {
            self.organizations.insert(org.clone(), key.clone());
        }
        for person in run.persons.keys() {
            self.persons.insert(*person, key.clone());
        }
        self.runs.insert(key, Arc::clone(&run));
        self.prune();

        debug!(
            "Published metrics v{} for {} (degraded={})",
            run.version, run.component, run.degraded
        );
        run
    }

    fn prune(&mut self) {
        let live: BTreeSet<&ComponentKey> = self.organizations.values().chain(self.persons.values()).collect();
        self.runs.retain(|key, _| live.contains(key));
    }

    pub fn run(&self, key: &ComponentKey) -> Option<Arc<MetricRun>> {
        self.runs.get(key).cloned()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Arc<MetricRun>> {
        self.runs.values()
    }

    pub fn run_for_organization(&self, org: &OrgId) -> Option<Arc<MetricRun>> {
        self.organizations.get(org).and_then(|key| self.run(key))
    }

    pub fn run_for_person(&self, person: PersonId) -> Option<Arc<MetricRun>> {
        self.persons.get(&person).and_then(|key| self.run(key))
    }

    pub fn organization(&self, org: &OrgId) -> Option<OrgMetrics> {
        self.run_for_organization(org)
            .and_then(|run| run.organizations.get(org).cloned())
    }

    pub fn person(&self, person: PersonId) -> Option<PersonMetrics> {
        self.run_for_person(person)
            .and_then(|run| run.persons.get(&person).cloned())
    }

    pub fn influence(&self, key: &NodeKey) -> Option<InfluenceReport> {
        let (run, metrics) = match key {
            NodeKey::Organization(org) => {
                let run = self.run_for_organization(org)?;
                let metrics = NodeMetrics::Organization(run.organizations.get(org)?.clone());
                (run, metrics)
            }
            NodeKey::Person(person) => {
                let run = self.run_for_person(*person)?;
                let metrics = NodeMetrics::Person(run.persons.get(person)?.clone());
                (run, metrics)
            }
        };
        let influence_score = match &metrics {
            NodeMetrics::Organization(m) => m.influence_score,
            NodeMetrics::Person(m) => m.influence_score,
        };
        Some(InfluenceReport {
            key: key.clone(),
            influence_score,
            degraded: run.degraded,
            version: run.version,
            computed_at: run.computed_at,
            component: run.component.clone(),
            metrics,
        })
    }

    /// Flag the runs covering any of `orgs` as degraded, keeping their values.
    /// Returns the flagged components; empty when none of `orgs` has a run.
    pub fn mark_degraded(&mut self, orgs: &[OrgId]) -> Vec<ComponentKey> {
        let keys: BTreeSet<ComponentKey> = orgs
            .iter()
            .filter_map(|org| self.organizations.get(org).cloned())
            .collect();
        for key in &keys {
            if let Some(run) = self.runs.get_mut(key) {
                if !run.degraded {
                    let mut flagged = MetricRun::clone(run);
                    flagged.degraded = true;
                    *run = Arc::new(flagged);
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Forget a deleted organization. Its run stays until republished.
    pub fn remove_organization(&mut self, org: &OrgId) -> bool {
        let removed = self.organizations.remove(org).is_some();
        if removed {
            self.prune();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
        self.organizations.clear();
        self.persons.clear();
    }
}

/// Metric store shared between the coordinator (writer) and queries (readers)
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics(Arc<RwLock<MetricStore>>);

impl SharedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, MetricStore> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, MetricStore> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
