//! Relationship extractor
//!
//! Applies validated records to the graph store in filing order. Per-record
//! failures are counted and sampled into the batch summary; they never abort
//! the batch.

use super::records::{IngestRecord, ValidRecord};
use super::IngestResult;
use crate::graph::{GraphStore, OrgId, OrganizationAttributes, RoleDraft, UpsertOutcome};
use crate::identity::{IdentityError, Resolution};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of error messages kept as examples
pub const MAX_ERROR_EXAMPLES: usize = 5;

/// Read-only organization master data
pub trait OrganizationDirectory: Send + Sync {
    fn lookup(&self, id: &OrgId) -> Option<OrganizationAttributes>;
}

/// In-memory directory, mostly for tests and the CLI
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<OrgId, OrganizationAttributes>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: OrgId, attributes: OrganizationAttributes) {
        self.entries.insert(id, attributes);
    }
}

impl OrganizationDirectory for StaticDirectory {
    fn lookup(&self, id: &OrgId) -> Option<OrganizationAttributes> {
        self.entries.get(id).cloned()
    }
}

/// Counts and samples for one ingested batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub records: usize,
    pub organizations_created: usize,
    pub organizations_updated: usize,
    pub persons_created: usize,
    pub persons_merged: usize,
    pub ambiguous_matches: usize,
    pub roles_inserted: usize,
    pub roles_updated: usize,
    pub roles_unchanged: usize,
    pub grants_inserted: usize,
    pub grants_updated: usize,
    pub grants_unchanged: usize,
    pub connections_changed: usize,
    pub errors: usize,
    /// Up to five error messages, prefixed with the record's batch position
    pub error_examples: Vec<String>,
    /// Up to five ambiguous-match descriptions
    pub ambiguous_examples: Vec<String>,
    /// Organizations whose roles changed in this batch
    pub touched_organizations: BTreeSet<OrgId>,
}

impl BatchSummary {
    fn record_error(&mut self, index: usize, kind: &str, message: String) {
        self.errors += 1;
        warn!("Skipping {} record #{}: {}", kind, index, message);
        if self.error_examples.len() < MAX_ERROR_EXAMPLES {
            self.error_examples.push(format!("#{} ({}): {}", index, kind, message));
        }
    }

    fn record_ambiguous(&mut self, ambiguity: IdentityError) {
        self.ambiguous_matches += 1;
        if self.ambiguous_examples.len() < MAX_ERROR_EXAMPLES {
            self.ambiguous_examples.push(ambiguity.to_string());
        }
    }

    fn count_role(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.roles_inserted += 1,
            UpsertOutcome::Updated => self.roles_updated += 1,
            UpsertOutcome::Unchanged => self.roles_unchanged += 1,
        }
    }

    fn count_grant(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.grants_inserted += 1,
            UpsertOutcome::Updated => self.grants_updated += 1,
            UpsertOutcome::Unchanged => self.grants_unchanged += 1,
        }
    }
}

/// Applies role, grant and organization records to a store
#[derive(Clone)]
pub struct RelationshipExtractor {
    directory: Option<Arc<dyn OrganizationDirectory>>,
    default_confidence: f64,
}

impl RelationshipExtractor {
    pub fn new() -> Self {
        RelationshipExtractor {
            directory: None,
            default_confidence: 0.5,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn OrganizationDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence;
        self
    }

    /// Apply one batch.
    ///
    /// Records are stable-sorted by filing year first, so edges of any one
    /// organization accumulate in filing order. Connection edges are
    /// regenerated for every organization whose roles changed.
    pub fn ingest_batch(&self, store: &mut GraphStore, records: Vec<IngestRecord>) -> BatchSummary {
        let mut summary = BatchSummary {
            records: records.len(),
            ..Default::default()
        };

        let mut ordered: Vec<(usize, IngestRecord)> = records.into_iter().enumerate().collect();
        ordered.sort_by_key(|(_, record)| record.filing_year().unwrap_or(i32::MIN));

        for (index, record) in ordered {
            let kind = record.kind();
            if let Err(e) = self.apply(store, record, &mut summary) {
                summary.record_error(index, kind, e.to_string());
            }
        }

        if !summary.touched_organizations.is_empty() {
            let changed = store.rebuild_connections_touching(&summary.touched_organizations);
            summary.connections_changed = changed.len();
        }

        info!(
            "Ingested batch of {} records: roles +{}/~{}/={}, grants +{}/~{}/={}, {} ambiguous, {} errors",
            summary.records,
            summary.roles_inserted,
            summary.roles_updated,
            summary.roles_unchanged,
            summary.grants_inserted,
            summary.grants_updated,
            summary.grants_unchanged,
            summary.ambiguous_matches,
            summary.errors
        );
        summary
    }

    fn apply(&self, store: &mut GraphStore, record: IngestRecord, summary: &mut BatchSummary) -> IngestResult<()> {
        match record.validate(self.default_confidence)? {
            ValidRecord::Organization { id, attributes } => {
                let created = !store.has_organization(&id);
                match store.upsert_organization(id.clone(), &attributes) {
                    UpsertOutcome::Inserted => summary.organizations_created += 1,
                    UpsertOutcome::Updated => summary.organizations_updated += 1,
                    UpsertOutcome::Unchanged => {}
                }
                if created {
                    self.enrich(store, &id);
                }
            }
            ValidRecord::Role {
                candidate,
                organization,
                organization_name,
                title,
                start_date,
                end_date,
                source,
                filing_year,
                verified,
            } => {
                self.ensure_organization(store, &organization, organization_name.as_deref(), summary);

                let person = match store.resolve_person(&candidate) {
                    Resolution::Created(id) => {
                        summary.persons_created += 1;
                        id
                    }
                    Resolution::Merged(id) => {
                        summary.persons_merged += 1;
                        id
                    }
                    Resolution::Ambiguous { person, existing, score, reason, .. } => {
                        summary.record_ambiguous(IdentityError::AmbiguousMatch {
                            candidate: candidate.name.display.clone(),
                            existing,
                            score,
                            reason,
                        });
                        person
                    }
                };

                let (_, outcome) = store.upsert_role(RoleDraft {
                    person,
                    organization: organization.clone(),
                    title,
                    start_date,
                    end_date,
                    source,
                    filing_year,
                    verified,
                })?;
                summary.count_role(outcome);
                if outcome.is_mutation() {
                    summary.touched_organizations.insert(organization);
                }
            }
            ValidRecord::Grant { draft, funder_name } => {
                self.ensure_organization(store, &draft.funder, funder_name.as_deref(), summary);
                self.ensure_organization(store, &draft.recipient, draft.recipient_name.as_deref(), summary);
                let outcome = store.upsert_grant(draft)?;
                summary.count_grant(outcome);
            }
        }
        Ok(())
    }

    fn ensure_organization(&self, store: &mut GraphStore, id: &OrgId, name: Option<&str>, summary: &mut BatchSummary) {
        if store.ensure_organization(id, name) {
            summary.organizations_created += 1;
            self.enrich(store, id);
        }
    }

    fn enrich(&self, store: &mut GraphStore, id: &OrgId) {
        let Some(directory) = &self.directory else { return };
        if let Some(master) = directory.lookup(id) {
            if store.enrich_organization(id, &master) {
                debug!("Enriched organization {} from directory", id);
            }
        }
    }
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InvalidationCause, InvalidationEvent};
    use crate::ingest::records::{GrantRecord, RoleRecord};

    fn role(name: &str, org: &str, year: i32) -> IngestRecord {
        IngestRecord::Role(RoleRecord {
            person_name: name.into(),
            organization_id: org.into(),
            title: "Director".into(),
            start_date: None,
            end_date: None,
            source: "990".into(),
            filing_year: Some(year),
            organization_name: None,
            person_identifier: None,
            biography: None,
            confidence: None,
            verified: false,
        })
    }

    fn grant(funder: &str, recipient: &str, amount: f64, year: i32) -> IngestRecord {
        IngestRecord::Grant(GrantRecord {
            funder_id: funder.into(),
            funder_name: None,
            recipient_id: recipient.into(),
            recipient_name: Some(format!("{} org", recipient)),
            amount,
            year,
            purpose: None,
        })
    }

    #[test]
    fn test_batch_counts_and_connections() {
        let mut store = GraphStore::new();
        let extractor = RelationshipExtractor::new();
        let summary = extractor.ingest_batch(
            &mut store,
            vec![
                role("Ann Lee", "A", 2022),
                role("Ann Lee", "B", 2022),
                grant("F", "A", 100.0, 2021),
                role("", "A", 2022),
            ],
        );

        assert_eq!(summary.records, 4);
        assert_eq!(summary.roles_inserted, 2);
        assert_eq!(summary.grants_inserted, 1);
        assert_eq!(summary.persons_created, 1);
        assert_eq!(summary.persons_merged, 1);
        assert_eq!(summary.organizations_created, 3);
        assert_eq!(summary.errors, 1);
        assert!(summary.error_examples[0].starts_with("#3 (role)"));
        assert_eq!(store.connection(&"A".into(), &"B".into()).unwrap().weight(), 1);
        assert_eq!(store.organization(&"A".into()).unwrap().name, "A Org");
    }

    #[test]
    fn test_replayed_batch_changes_nothing() {
        let mut store = GraphStore::new();
        let extractor = RelationshipExtractor::new();
        let batch = vec![role("Ann Lee", "A", 2022), grant("F", "A", 100.0, 2021)];
        extractor.ingest_batch(&mut store, batch.clone());
        let again = extractor.ingest_batch(&mut store, batch);

        assert_eq!(again.roles_unchanged, 1);
        assert_eq!(again.grants_unchanged, 1);
        assert_eq!(again.roles_inserted + again.grants_inserted, 0);
        assert!(again.touched_organizations.is_empty());
        assert_eq!(store.grant(&"F".into(), &"A".into()).unwrap().total_amount, 100.0);
    }

    #[test]
    fn test_error_examples_are_capped() {
        let mut store = GraphStore::new();
        let records = (0..8).map(|_| role("", "A", 2022)).collect();
        let summary = RelationshipExtractor::new().ingest_batch(&mut store, records);
        assert_eq!(summary.errors, 8);
        assert_eq!(summary.error_examples.len(), MAX_ERROR_EXAMPLES);
    }

    #[test]
    fn test_filing_order_within_batch() {
        let mut store = GraphStore::new();
        let later = IngestRecord::Role(RoleRecord {
            end_date: chrono::NaiveDate::from_ymd_opt(2023, 3, 1),
            ..match role("Ann Lee", "A", 2023) {
                IngestRecord::Role(r) => r,
                _ => unreachable!(),
            }
        });
        // Submitted out of order; the 2023 filing still wins
        RelationshipExtractor::new().ingest_batch(&mut store, vec![later, role("Ann Lee", "A", 2021)]);
        let roles = store.roles_for_organization(&"A".into());
        assert_eq!(roles.len(), 1);
        assert!(!roles[0].is_current());
    }

    #[test]
    fn test_directory_enrichment_and_invalidations() {
        let (mut store, mut rx) = GraphStore::with_invalidations();
        let mut directory = StaticDirectory::new();
        directory.insert(
            "F".into(),
            OrganizationAttributes {
                name: Some("Fund".into()),
                category_code: Some("T20".into()),
                geography: Some("NY".into()),
                annual_budget: None,
            },
        );
        let extractor = RelationshipExtractor::new().with_directory(Arc::new(directory));
        extractor.ingest_batch(&mut store, vec![grant("F", "R", 5.0, 2020)]);

        let funder = store.organization(&"F".into()).unwrap();
        assert_eq!(funder.category_code.as_deref(), Some("T20"));
        assert_eq!(funder.name, "Fund");

        let events: Vec<InvalidationEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                InvalidationEvent::new("F".into(), InvalidationCause::GrantUpserted),
                InvalidationEvent::new("R".into(), InvalidationCause::GrantUpserted),
            ]
        );
    }

    #[test]
    fn test_ambiguous_mentions_are_counted() {
        let mut store = GraphStore::new();
        let summary = RelationshipExtractor::new().ingest_batch(
            &mut store,
            vec![role("Dr. Jane A. Smith Jr.", "A", 2021), role("Jane Smith", "B", 2022)],
        );
        assert_eq!(summary.ambiguous_matches, 1);
        assert_eq!(store.pending_reviews().len(), 1);
        assert_eq!(store.person_count(), 2);
        assert_eq!(store.connection_count(), 0);
    }
}
