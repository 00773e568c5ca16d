//! Relational graph storage
//!
//! Organizations, persons, roles and grants are stored as flat tables keyed by
//! their natural identifiers. Connection edges are derived from the role table
//! and regenerated for the organizations a batch touched.

use super::event::{InvalidationCause, InvalidationEvent};
use super::records::{
    role_key, ConnectionEdge, Grant, GrantContribution, GrantDraft, GrantKey, Organization,
    OrganizationAttributes, Role, RoleDraft, RoleKey, UpsertOutcome,
};
use super::types::{OrgId, OrgPair, PersonId, RoleId, RoleKind};
use crate::identity::{
    IdentityError, Person, PersonCandidate, PersonRegistry, Resolution, ReviewDecision,
    ReviewItem, ReviewOutcome,
};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur during graph store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Organization {0} not found")]
    OrganizationNotFound(OrgId),

    #[error("Person {0} not found")]
    PersonNotFound(PersonId),

    #[error("Grant from {0} to itself")]
    SelfGrant(OrgId),

    #[error("Invalid grant amount {0}")]
    InvalidAmount(f64),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Rows removed by an organization delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub roles: usize,
    pub grants: usize,
    pub connections: usize,
}

/// Relational store for the relationship network
#[derive(Debug)]
pub struct GraphStore {
    organizations: IndexMap<OrgId, Organization>,
    persons: PersonRegistry,
    roles: BTreeMap<RoleId, Role>,
    grants: BTreeMap<GrantKey, Grant>,
    next_role_id: u64,

    /// Derived: one edge per unordered organization pair
    connections: BTreeMap<OrgPair, ConnectionEdge>,

    role_index: FxHashMap<RoleKey, RoleId>,
    roles_by_org: FxHashMap<OrgId, BTreeSet<RoleId>>,
    roles_by_person: FxHashMap<PersonId, BTreeSet<RoleId>>,

    /// Invalidation sender, set when a recompute coordinator listens
    pub invalidation_sender: Option<UnboundedSender<InvalidationEvent>>,
}

impl GraphStore {
    /// Create a new empty store with the default fuzzy-match threshold
    pub fn new() -> Self {
        Self::with_registry(PersonRegistry::default())
    }

    pub fn with_fuzzy_threshold(threshold: f64) -> Self {
        Self::with_registry(PersonRegistry::new(threshold))
    }

    fn with_registry(persons: PersonRegistry) -> Self {
        GraphStore {
            organizations: IndexMap::new(),
            persons,
            roles: BTreeMap::new(),
            grants: BTreeMap::new(),
            next_role_id: 1,
            connections: BTreeMap::new(),
            role_index: FxHashMap::default(),
            roles_by_org: FxHashMap::default(),
            roles_by_person: FxHashMap::default(),
            invalidation_sender: None,
        }
    }

    /// Create a new store whose mutations are published on the returned receiver
    pub fn with_invalidations() -> (Self, UnboundedReceiver<InvalidationEvent>) {
        let (tx, rx) = unbounded_channel();
        let mut store = Self::new();
        store.invalidation_sender = Some(tx);
        (store, rx)
    }

    /// Rebuild a store from its authoritative rows. Indices and connection
    /// edges are regenerated.
    pub fn from_parts(
        organizations: Vec<Organization>,
        mut persons: PersonRegistry,
        roles: Vec<Role>,
        grants: Vec<Grant>,
    ) -> Self {
        persons.reindex();
        let mut store = Self::with_registry(persons);
        for org in organizations {
            store.organizations.insert(org.id.clone(), org);
        }
        for role in roles {
            store.next_role_id = store.next_role_id.max(role.id.0 + 1);
            store.index_role(&role);
            store.roles.insert(role.id, role);
        }
        for grant in grants {
            store.grants.insert(grant.key(), grant);
        }
        store.rebuild_connections();
        store
    }

    fn notify(&self, organization: &OrgId, cause: InvalidationCause) {
        match &self.invalidation_sender {
            Some(sender) => {
                if sender.send(InvalidationEvent::new(organization.clone(), cause)).is_err() {
                    warn!("Invalidation for {} ({:?}) dropped: coordinator is gone", organization, cause);
                }
            }
            None => debug!("Invalidation for {} ({:?}) with no listener", organization, cause),
        }
    }

    // ---- organizations ----

    pub fn organization(&self, id: &OrgId) -> Option<&Organization> {
        self.organizations.get(id)
    }

    pub fn organizations(&self) -> impl Iterator<Item = &Organization> {
        self.organizations.values()
    }

    pub fn has_organization(&self, id: &OrgId) -> bool {
        self.organizations.contains_key(id)
    }

    /// Insert or update an organization with the given attributes
    pub fn upsert_organization(&mut self, id: OrgId, attributes: &OrganizationAttributes) -> UpsertOutcome {
        match self.organizations.get_mut(&id) {
            Some(org) => {
                if org.apply(attributes) {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => {
                let name = attributes.name.clone().unwrap_or_else(|| id.to_string());
                let mut org = Organization::new(id.clone(), name);
                org.apply(attributes);
                self.organizations.insert(id, org);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Create a placeholder organization on first encounter. Returns true when created.
    pub fn ensure_organization(&mut self, id: &OrgId, name_hint: Option<&str>) -> bool {
        if self.organizations.contains_key(id) {
            return false;
        }
        let name = name_hint.map(str::to_string).unwrap_or_else(|| id.to_string());
        self.organizations.insert(id.clone(), Organization::new(id.clone(), name));
        true
    }

    /// Fill missing attributes from master data. Returns true on change.
    pub fn enrich_organization(&mut self, id: &OrgId, master: &OrganizationAttributes) -> bool {
        self.organizations
            .get_mut(id)
            .map(|org| org.enrich(master))
            .unwrap_or(false)
    }

    /// Remove an organization with its roles, grants and connection edges
    pub fn delete_organization(&mut self, id: &OrgId) -> GraphResult<DeletionSummary> {
        if self.organizations.shift_remove(id).is_none() {
            return Err(GraphError::OrganizationNotFound(id.clone()));
        }
        let mut summary = DeletionSummary::default();
        let mut neighbors = BTreeSet::new();

        let role_ids: Vec<RoleId> = self
            .roles_by_org
            .get(id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for role_id in role_ids {
            if let Some(role) = self.roles.remove(&role_id) {
                self.unindex_role(&role);
                summary.roles += 1;
            }
        }
        self.roles_by_org.remove(id);

        let before = self.grants.len();
        self.grants.retain(|key, _| {
            if &key.funder == id {
                neighbors.insert(key.recipient.clone());
                false
            } else if &key.recipient == id {
                neighbors.insert(key.funder.clone());
                false
            } else {
                true
            }
        });
        summary.grants = before - self.grants.len();

        let before = self.connections.len();
        self.connections.retain(|pair, _| match pair.other(id) {
            Some(other) => {
                neighbors.insert(other.clone());
                false
            }
            None => true,
        });
        summary.connections = before - self.connections.len();

        self.notify(id, InvalidationCause::OrganizationDeleted);
        for neighbor in &neighbors {
            self.notify(neighbor, InvalidationCause::NeighborDeleted);
        }
        info!(
            "Deleted organization {}: {} roles, {} grants, {} connections",
            id, summary.roles, summary.grants, summary.connections
        );
        Ok(summary)
    }

    // ---- persons ----

    pub fn persons(&self) -> &PersonRegistry {
        &self.persons
    }

    pub fn person(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(id)
    }

    /// Resolve a person mention through the deduplicator
    pub fn resolve_person(&mut self, candidate: &PersonCandidate) -> Resolution {
        self.persons.resolve(candidate)
    }

    pub fn pending_reviews(&self) -> Vec<&ReviewItem> {
        self.persons.pending_reviews()
    }

    /// Apply a review decision. A merge re-points the absorbed person's roles
    /// and regenerates the affected connection edges.
    pub fn resolve_review(&mut self, id: Uuid, decision: ReviewDecision) -> GraphResult<ReviewOutcome> {
        let outcome = self.persons.resolve_review(id, decision)?;
        if let ReviewOutcome::Merged { survivor, absorbed } = outcome {
            let touched = self.repoint_roles(absorbed, survivor);
            for org in &touched {
                self.notify(org, InvalidationCause::PersonMerged);
            }
            self.rebuild_connections_touching(&touched);
        }
        Ok(outcome)
    }

    fn repoint_roles(&mut self, from: PersonId, to: PersonId) -> BTreeSet<OrgId> {
        let mut touched = BTreeSet::new();
        let role_ids = self.roles_by_person.remove(&from).unwrap_or_default();
        for role_id in role_ids {
            let Some(mut role) = self.roles.remove(&role_id) else { continue };
            self.unindex_role(&role);
            touched.insert(role.organization.clone());
            role.person = to;

            match self.role_index.get(&role.key()).copied() {
                Some(existing_id) => {
                    if let Some(existing) = self.roles.get_mut(&existing_id) {
                        existing.filing_years.extend(role.filing_years.iter().copied());
                        existing.verified |= role.verified;
                        if existing.start_date.is_none() {
                            existing.start_date = role.start_date;
                        }
                    }
                }
                None => {
                    self.index_role(&role);
                    self.roles.insert(role.id, role);
                }
            }
        }
        touched
    }

    // ---- roles ----

    /// Upsert a role keyed by (person, organization, title, source).
    ///
    /// Filing years accumulate. Dates follow the most recent filing; an older
    /// filing only fills a missing start date.
    pub fn upsert_role(&mut self, draft: RoleDraft) -> GraphResult<(RoleId, UpsertOutcome)> {
        if !self.organizations.contains_key(&draft.organization) {
            return Err(GraphError::OrganizationNotFound(draft.organization));
        }
        if !self.persons.contains(draft.person) {
            return Err(GraphError::PersonNotFound(draft.person));
        }

        let key = draft.key();
        let existing = self.role_index.get(&key).copied();
        let (role_id, outcome) = match existing.and_then(|id| self.roles.get_mut(&id)) {
            Some(role) => {
                let before = role.clone();
                let is_latest = match (draft.filing_year, role.latest_filing_year()) {
                    (Some(year), Some(latest)) => year >= latest,
                    _ => true,
                };
                if is_latest {
                    if draft.start_date.is_some() {
                        role.start_date = draft.start_date;
                    }
                    role.end_date = draft.end_date;
                } else if role.start_date.is_none() {
                    role.start_date = draft.start_date;
                }
                if let Some(year) = draft.filing_year {
                    role.filing_years.insert(year);
                }
                role.verified |= draft.verified;

                let outcome = if *role == before { UpsertOutcome::Unchanged } else { UpsertOutcome::Updated };
                (role.id, outcome)
            }
            None => {
                let role_id = RoleId(self.next_role_id);
                self.next_role_id += 1;
                let role = Role {
                    id: role_id,
                    person: draft.person,
                    organization: draft.organization.clone(),
                    kind: RoleKind::classify(&draft.title),
                    title: draft.title.trim().to_string(),
                    start_date: draft.start_date,
                    end_date: draft.end_date,
                    source: draft.source.trim().to_string(),
                    filing_years: draft.filing_year.into_iter().collect(),
                    verified: draft.verified,
                };
                self.index_role(&role);
                self.roles.insert(role_id, role);
                (role_id, UpsertOutcome::Inserted)
            }
        };

        if outcome.is_mutation() {
            self.notify(&draft.organization, InvalidationCause::RoleUpserted);
        }
        Ok((role_id, outcome))
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn find_role(&self, person: PersonId, organization: &OrgId, title: &str, source: &str) -> Option<&Role> {
        self.role_index
            .get(&role_key(person, organization, title, source))
            .and_then(|id| self.roles.get(id))
    }

    pub fn roles_for_organization(&self, id: &OrgId) -> Vec<&Role> {
        self.roles_by_org
            .get(id)
            .map(|ids| ids.iter().filter_map(|rid| self.roles.get(rid)).collect())
            .unwrap_or_default()
    }

    pub fn roles_for_person(&self, id: PersonId) -> Vec<&Role> {
        self.roles_by_person
            .get(&id)
            .map(|ids| ids.iter().filter_map(|rid| self.roles.get(rid)).collect())
            .unwrap_or_default()
    }

    fn index_role(&mut self, role: &Role) {
        self.role_index.insert(role.key(), role.id);
        self.roles_by_org
            .entry(role.organization.clone())
            .or_default()
            .insert(role.id);
        self.roles_by_person.entry(role.person).or_default().insert(role.id);
    }

    fn unindex_role(&mut self, role: &Role) {
        self.role_index.remove(&role.key());
        if let Some(ids) = self.roles_by_org.get_mut(&role.organization) {
            ids.remove(&role.id);
        }
        if let Some(ids) = self.roles_by_person.get_mut(&role.person) {
            ids.remove(&role.id);
        }
    }

    // ---- grants ----

    /// Upsert a grant keyed by (funder, recipient). Amounts accumulate and
    /// years append; an identical filing replayed is a no-op.
    pub fn upsert_grant(&mut self, draft: GrantDraft) -> GraphResult<UpsertOutcome> {
        if draft.funder == draft.recipient {
            return Err(GraphError::SelfGrant(draft.funder));
        }
        if !draft.amount.is_finite() || draft.amount < 0.0 {
            return Err(GraphError::InvalidAmount(draft.amount));
        }
        for org in [&draft.funder, &draft.recipient] {
            if !self.organizations.contains_key(org) {
                return Err(GraphError::OrganizationNotFound(org.clone()));
            }
        }

        let key = GrantKey {
            funder: draft.funder.clone(),
            recipient: draft.recipient.clone(),
        };
        let contribution = GrantContribution {
            year: draft.year,
            amount: draft.amount,
            purpose: draft.purpose.clone(),
        };

        let outcome = match self.grants.get_mut(&key) {
            Some(grant) => {
                if grant.apply(contribution) {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => {
                let mut grant = Grant::new(draft.funder.clone(), draft.recipient.clone());
                grant.apply(contribution);
                self.grants.insert(key, grant);
                UpsertOutcome::Inserted
            }
        };

        if outcome.is_mutation() {
            self.notify(&draft.funder, InvalidationCause::GrantUpserted);
            self.notify(&draft.recipient, InvalidationCause::GrantUpserted);
        }
        Ok(outcome)
    }

    pub fn grant(&self, funder: &OrgId, recipient: &OrgId) -> Option<&Grant> {
        self.grants.get(&GrantKey {
            funder: funder.clone(),
            recipient: recipient.clone(),
        })
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.values()
    }

    pub fn grants_from<'a>(&'a self, funder: &'a OrgId) -> impl Iterator<Item = &'a Grant> + 'a {
        self.grants.values().filter(move |g| &g.funder == funder)
    }

    pub fn grants_to<'a>(&'a self, recipient: &'a OrgId) -> impl Iterator<Item = &'a Grant> + 'a {
        self.grants.values().filter(move |g| &g.recipient == recipient)
    }

    // ---- connections ----

    pub fn connection(&self, a: &OrgId, b: &OrgId) -> Option<&ConnectionEdge> {
        OrgPair::new(a.clone(), b.clone()).and_then(|pair| self.connections.get(&pair))
    }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionEdge> {
        self.connections.values()
    }

    pub fn connections_of<'a>(&'a self, org: &'a OrgId) -> impl Iterator<Item = &'a ConnectionEdge> + 'a {
        self.connections.values().filter(move |c| c.pair.contains(org))
    }

    fn current_people(&self, org: &OrgId) -> BTreeSet<PersonId> {
        self.roles_for_organization(org)
            .into_iter()
            .filter(|r| r.is_current())
            .map(|r| r.person)
            .collect()
    }

    fn current_organizations(&self, person: PersonId) -> BTreeSet<OrgId> {
        self.roles_for_person(person)
            .into_iter()
            .filter(|r| r.is_current())
            .map(|r| r.organization.clone())
            .collect()
    }

    /// Regenerate every connection edge. Returns the number of edges.
    pub fn rebuild_connections(&mut self) -> usize {
        self.connections.clear();
        let all: BTreeSet<OrgId> = self.organizations.keys().cloned().collect();
        self.regenerate_connections(&all);
        self.connections.len()
    }

    /// Regenerate every connection edge with at least one endpoint in `orgs`.
    ///
    /// Partner organizations whose edge changed are invalidated. Returns every
    /// organization on a changed edge.
    pub fn rebuild_connections_touching(&mut self, orgs: &BTreeSet<OrgId>) -> BTreeSet<OrgId> {
        let mut previous = BTreeMap::new();
        self.connections.retain(|pair, edge| {
            if orgs.contains(pair.low()) || orgs.contains(pair.high()) {
                previous.insert(pair.clone(), edge.clone());
                false
            } else {
                true
            }
        });
        self.regenerate_connections(orgs);

        let mut changed = BTreeSet::new();
        let current_pairs = self
            .connections
            .keys()
            .filter(|pair| orgs.contains(pair.low()) || orgs.contains(pair.high()));
        let candidates: BTreeSet<&OrgPair> = previous.keys().chain(current_pairs).collect();
        for pair in candidates {
            if previous.get(pair) != self.connections.get(pair) {
                changed.insert(pair.low().clone());
                changed.insert(pair.high().clone());
            }
        }

        for org in changed.iter().filter(|org| !orgs.contains(*org)) {
            self.notify(org, InvalidationCause::ConnectionChanged);
        }
        debug!(
            "Regenerated connections for {} organizations, {} changed",
            orgs.len(),
            changed.len()
        );
        changed
    }

    fn regenerate_connections(&mut self, orgs: &BTreeSet<OrgId>) {
        let mut fresh: BTreeMap<OrgPair, BTreeSet<PersonId>> = BTreeMap::new();
        for org in orgs {
            for person in self.current_people(org) {
                for other in self.current_organizations(person) {
                    if let Some(pair) = OrgPair::new(org.clone(), other) {
                        fresh.entry(pair).or_default().insert(person);
                    }
                }
            }
        }
        for (pair, shared_people) in fresh {
            self.connections.insert(pair.clone(), ConnectionEdge { pair, shared_people });
        }
    }

    // ---- statistics ----

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }

    pub fn person_count(&self) -> usize {
        self.persons.len()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Clear all rows, keeping the fuzzy threshold and the invalidation sender
    pub fn clear(&mut self) {
        let sender = self.invalidation_sender.take();
        *self = Self::with_fuzzy_threshold(self.persons.fuzzy_threshold());
        self.invalidation_sender = sender;
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
