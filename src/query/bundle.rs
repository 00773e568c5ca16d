//! Grantee bundling
//!
//! Recipients funded by at least `min_funders` of a given set of funders,
//! optionally restricted to some tax years.

use super::{QueryError, QueryResult};
use crate::graph::{GraphStore, OrgId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunderContribution {
    pub funder: OrgId,
    pub funder_name: String,
    pub amount: f64,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundledGrantee {
    pub recipient: OrgId,
    pub name: String,
    pub funder_count: usize,
    pub total_funding: f64,
    /// Ordered by funder id
    pub funders: Vec<FunderContribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundledGrantees {
    pub funders: Vec<OrgId>,
    pub min_funders: usize,
    pub tax_years: Option<Vec<i32>>,
    /// Most funders first, then most funding, then recipient id
    pub grantees: Vec<BundledGrantee>,
}

impl BundledGrantees {
    pub fn grantee(&self, recipient: &OrgId) -> Option<&BundledGrantee> {
        self.grantees.iter().find(|g| &g.recipient == recipient)
    }
}

/// Recipients with grants from at least `min_funders` distinct funders of
/// `funder_ids` within `tax_years` (all years when `None`)
pub fn bundle(
    store: &GraphStore,
    funder_ids: &[OrgId],
    min_funders: usize,
    tax_years: Option<&[i32]>,
) -> QueryResult<BundledGrantees> {
    if funder_ids.is_empty() {
        return Err(QueryError::InvalidQuery("at least one funder is required".into()));
    }
    if min_funders == 0 {
        return Err(QueryError::InvalidQuery("min_funders must be at least 1".into()));
    }
    let funders: BTreeSet<OrgId> = funder_ids.iter().cloned().collect();
    if let Some(missing) = funders.iter().find(|id| !store.has_organization(id)) {
        return Err(QueryError::NodeNotFound(missing.to_string()));
    }

    let years: Option<HashSet<i32>> = tax_years.map(|ys| ys.iter().copied().collect());
    let mut by_recipient: BTreeMap<OrgId, Vec<FunderContribution>> = BTreeMap::new();
    for funder in &funders {
        let funder_name = store
            .organization(funder)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| funder.to_string());
        for grant in store.grants_from(funder) {
            if !grant.is_funded_in(years.as_ref()) {
                continue;
            }
            let years_funded = grant.contributions_in(years.as_ref()).map(|c| c.year).collect();
            by_recipient
                .entry(grant.recipient.clone())
                .or_default()
                .push(FunderContribution {
                    funder: funder.clone(),
                    funder_name: funder_name.clone(),
                    amount: grant.amount_in(years.as_ref()),
                    years: years_funded,
                });
        }
    }

    let mut grantees: Vec<BundledGrantee> = by_recipient
        .into_iter()
        .filter(|(_, contributions)| contributions.len() >= min_funders)
        .map(|(recipient, contributions)| BundledGrantee {
            name: store
                .organization(&recipient)
                .map(|o| o.name.clone())
                .unwrap_or_else(|| recipient.to_string()),
            funder_count: contributions.len(),
            total_funding: contributions.iter().map(|c| c.amount).sum(),
            recipient,
            funders: contributions,
        })
        .collect();
    grantees.sort_by(|a, b| {
        b.funder_count
            .cmp(&a.funder_count)
            .then_with(|| b.total_funding.total_cmp(&a.total_funding))
            .then_with(|| a.recipient.cmp(&b.recipient))
    });

    let mut tax_years: Option<Vec<i32>> = tax_years.map(<[i32]>::to_vec);
    if let Some(ys) = tax_years.as_mut() {
        ys.sort_unstable();
        ys.dedup();
    }

    Ok(BundledGrantees {
        funders: funders.into_iter().collect(),
        min_funders,
        tax_years,
        grantees,
    })
}
