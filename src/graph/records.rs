//! Relational records held by the graph store
//!
//! These are the authoritative rows. Everything else (connection edges, the
//! in-memory network, metric runs) is derived from them.

use super::types::{OrgId, OrgPair, PersonId, RoleId, RoleKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Result of an upsert against the relational store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Descriptive organization attributes, as supplied by records or master data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationAttributes {
    pub name: Option<String>,
    pub category_code: Option<String>,
    pub geography: Option<String>,
    /// Annual budget or revenue, the scale indicator
    pub annual_budget: Option<f64>,
}

/// Referenced organization, keyed by its external identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub category_code: Option<String>,
    pub geography: Option<String>,
    pub annual_budget: Option<f64>,
}

impl Organization {
    pub fn new(id: OrgId, name: impl Into<String>) -> Self {
        Organization {
            id,
            name: name.into(),
            category_code: None,
            geography: None,
            annual_budget: None,
        }
    }

    /// Overwrite every attribute the update carries. Returns true on change.
    pub fn apply(&mut self, update: &OrganizationAttributes) -> bool {
        let before = self.clone();
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if update.category_code.is_some() {
            self.category_code = update.category_code.clone();
        }
        if update.geography.is_some() {
            self.geography = update.geography.clone();
        }
        if update.annual_budget.is_some() {
            self.annual_budget = update.annual_budget;
        }
        *self != before
    }

    /// Fill only the attributes that are still missing. Returns true on change.
    pub fn enrich(&mut self, master: &OrganizationAttributes) -> bool {
        let before = self.clone();
        if self.name.is_empty() || self.name == self.id.as_str() {
            if let Some(name) = &master.name {
                self.name = name.clone();
            }
        }
        if self.category_code.is_none() {
            self.category_code = master.category_code.clone();
        }
        if self.geography.is_none() {
            self.geography = master.geography.clone();
        }
        if self.annual_budget.is_none() {
            self.annual_budget = master.annual_budget;
        }
        *self != before
    }
}

/// Natural key of a Role: (person, organization, title, source)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleKey {
    pub person: PersonId,
    pub organization: OrgId,
    /// Lowercased, whitespace-collapsed title
    pub title: String,
    pub source: String,
}

/// Time-bounded position of a person at an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub person: PersonId,
    pub organization: OrgId,
    pub title: String,
    pub kind: RoleKind,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub source: String,
    /// Filing years that reported this role
    pub filing_years: BTreeSet<i32>,
    pub verified: bool,
}

impl Role {
    /// Current iff no end date has been reported
    pub fn is_current(&self) -> bool {
        self.end_date.is_none()
    }

    pub fn key(&self) -> RoleKey {
        role_key(self.person, &self.organization, &self.title, &self.source)
    }

    pub fn latest_filing_year(&self) -> Option<i32> {
        self.filing_years.iter().next_back().copied()
    }
}

pub(crate) fn role_key(person: PersonId, organization: &OrgId, title: &str, source: &str) -> RoleKey {
    RoleKey {
        person,
        organization: organization.clone(),
        title: title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        source: source.trim().to_string(),
    }
}

/// Validated role mention ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDraft {
    pub person: PersonId,
    pub organization: OrgId,
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub source: String,
    pub filing_year: Option<i32>,
    pub verified: bool,
}

impl RoleDraft {
    pub fn key(&self) -> RoleKey {
        role_key(self.person, &self.organization, &self.title, &self.source)
    }
}

/// One applied grant filing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantContribution {
    pub year: i32,
    pub amount: f64,
    pub purpose: Option<String>,
}

impl GrantContribution {
    fn same_filing(&self, other: &GrantContribution) -> bool {
        self.year == other.year
            && self.amount.to_bits() == other.amount.to_bits()
            && self.purpose == other.purpose
    }
}

/// Natural key of a Grant edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    pub funder: OrgId,
    pub recipient: OrgId,
}

/// Accumulated funder -> recipient relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub funder: OrgId,
    pub recipient: OrgId,
    pub total_amount: f64,
    /// Append list, one entry per applied contribution
    pub years: Vec<i32>,
    pub purposes: Vec<String>,
    pub contributions: Vec<GrantContribution>,
}

impl Grant {
    pub fn new(funder: OrgId, recipient: OrgId) -> Self {
        Grant {
            funder,
            recipient,
            total_amount: 0.0,
            years: Vec::new(),
            purposes: Vec::new(),
            contributions: Vec::new(),
        }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey {
            funder: self.funder.clone(),
            recipient: self.recipient.clone(),
        }
    }

    /// Accumulate a contribution. An identical filing already applied is a no-op.
    pub fn apply(&mut self, contribution: GrantContribution) -> bool {
        if self.contributions.iter().any(|c| c.same_filing(&contribution)) {
            return false;
        }
        self.total_amount += contribution.amount;
        self.years.push(contribution.year);
        if let Some(purpose) = &contribution.purpose {
            if !self.purposes.contains(purpose) {
                self.purposes.push(purpose.clone());
            }
        }
        self.contributions.push(contribution);
        true
    }

    /// Contributions whose year is in `years` (all when `None`)
    pub fn contributions_in<'a>(
        &'a self,
        years: Option<&'a HashSet<i32>>,
    ) -> impl Iterator<Item = &'a GrantContribution> + 'a {
        self.contributions
            .iter()
            .filter(move |c| years.map_or(true, |ys| ys.contains(&c.year)))
    }

    pub fn amount_in(&self, years: Option<&HashSet<i32>>) -> f64 {
        self.contributions_in(years).map(|c| c.amount).sum()
    }

    pub fn is_funded_in(&self, years: Option<&HashSet<i32>>) -> bool {
        self.contributions_in(years).next().is_some()
    }
}

/// Validated grant filing ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct GrantDraft {
    pub funder: OrgId,
    pub recipient: OrgId,
    pub recipient_name: Option<String>,
    pub amount: f64,
    pub year: i32,
    pub purpose: Option<String>,
}

/// Derived organization ~ organization link through shared current role holders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEdge {
    pub pair: OrgPair,
    pub shared_people: BTreeSet<PersonId>,
}

impl ConnectionEdge {
    /// Number of distinct shared people
    pub fn weight(&self) -> usize {
        self.shared_people.len()
    }
}
