//! Ingestion records
//!
//! Upstream parsers emit one closed, tagged record type. Records are validated
//! here into typed drafts before anything touches the store.

use super::{IngestError, IngestResult};
use crate::graph::{GrantDraft, OrgId, OrganizationAttributes};
use crate::identity::{normalize_org_name, PersonCandidate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Organization master data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub annual_budget: Option<f64>,
}

/// A person's position at an organization, as reported by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub person_name: String,
    pub organization_id: String,
    pub title: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub source: String,
    #[serde(default)]
    pub filing_year: Option<i32>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub person_identifier: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub verified: bool,
}

/// One grant filing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub funder_id: String,
    #[serde(default)]
    pub funder_name: Option<String>,
    pub recipient_id: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    pub amount: f64,
    pub year: i32,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestRecord {
    Organization(OrganizationRecord),
    Role(RoleRecord),
    Grant(GrantRecord),
}

/// A record that passed validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidRecord {
    Organization {
        id: OrgId,
        attributes: OrganizationAttributes,
    },
    Role {
        candidate: PersonCandidate,
        organization: OrgId,
        organization_name: Option<String>,
        title: String,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        source: String,
        filing_year: Option<i32>,
        verified: bool,
    },
    Grant {
        draft: GrantDraft,
        funder_name: Option<String>,
    },
}

impl IngestRecord {
    /// Year used to order a batch; records without one sort first
    pub fn filing_year(&self) -> Option<i32> {
        match self {
            IngestRecord::Organization(_) => None,
            IngestRecord::Role(role) => role.filing_year,
            IngestRecord::Grant(grant) => Some(grant.year),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestRecord::Organization(_) => "organization",
            IngestRecord::Role(_) => "role",
            IngestRecord::Grant(_) => "grant",
        }
    }

    /// Validate into typed drafts. `default_confidence` applies to role
    /// records that carry no score of their own.
    pub fn validate(self, default_confidence: f64) -> IngestResult<ValidRecord> {
        match self {
            IngestRecord::Organization(org) => {
                let id = org_id(&org.id, "organization id")?;
                let name = org.name.as_deref().map(normalize_org_name).transpose()?;
                Ok(ValidRecord::Organization {
                    id,
                    attributes: OrganizationAttributes {
                        name,
                        category_code: non_empty(org.category_code),
                        geography: non_empty(org.geography),
                        annual_budget: org.annual_budget.filter(|b| b.is_finite() && *b >= 0.0),
                    },
                })
            }
            IngestRecord::Role(role) => {
                let organization = org_id(&role.organization_id, "organization_id")?;
                let title = required(&role.title, "title")?;
                let source = required(&role.source, "source")?;
                if let Some(year) = role.filing_year {
                    check_year(year)?;
                }
                if let (Some(start), Some(end)) = (role.start_date, role.end_date) {
                    if end < start {
                        return Err(IngestError::InvalidRecord(format!(
                            "role ends ({}) before it starts ({})",
                            end, start
                        )));
                    }
                }
                let confidence = match role.confidence {
                    Some(c) if !(0.0..=1.0).contains(&c) => {
                        return Err(IngestError::InvalidRecord(format!("confidence {} outside [0, 1]", c)))
                    }
                    Some(c) => c,
                    None => default_confidence,
                };

                let fingerprint = format!(
                    "{}|{}|{}|{}",
                    organization,
                    title.to_lowercase(),
                    source,
                    role.filing_year.map(|y| y.to_string()).unwrap_or_default()
                );
                let candidate = PersonCandidate::new(&role.person_name, source.clone(), fingerprint)?
                    .with_identifier(role.person_identifier.as_deref())
                    .with_biography(role.biography.as_deref())
                    .with_confidence(confidence);

                Ok(ValidRecord::Role {
                    candidate,
                    organization,
                    organization_name: role.organization_name.as_deref().map(normalize_org_name).transpose()?,
                    title,
                    start_date: role.start_date,
                    end_date: role.end_date,
                    source,
                    filing_year: role.filing_year,
                    verified: role.verified,
                })
            }
            IngestRecord::Grant(grant) => {
                let funder = org_id(&grant.funder_id, "funder_id")?;
                let recipient = org_id(&grant.recipient_id, "recipient_id")?;
                if funder == recipient {
                    return Err(IngestError::InvalidRecord(format!("grant from {} to itself", funder)));
                }
                if !grant.amount.is_finite() || grant.amount < 0.0 {
                    return Err(IngestError::InvalidRecord(format!("grant amount {}", grant.amount)));
                }
                check_year(grant.year)?;

                Ok(ValidRecord::Grant {
                    draft: GrantDraft {
                        funder,
                        recipient,
                        recipient_name: grant.recipient_name.as_deref().map(normalize_org_name).transpose()?,
                        amount: grant.amount,
                        year: grant.year,
                        purpose: non_empty(grant.purpose),
                    },
                    funder_name: grant.funder_name.as_deref().map(normalize_org_name).transpose()?,
                })
            }
        }
    }
}

/// Parse a JSON array of records
pub fn parse_records(json: &str) -> IngestResult<Vec<IngestRecord>> {
    Ok(serde_json::from_str(json)?)
}

fn org_id(raw: &str, field: &str) -> IngestResult<OrgId> {
    required(raw, field).map(OrgId::new)
}

fn required(raw: &str, field: &str) -> IngestResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IngestError::InvalidRecord(format!("missing {}", field)));
    }
    Ok(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_year(year: i32) -> IngestResult<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(IngestError::InvalidRecord(format!("year {} out of range", year)))
    }
}
