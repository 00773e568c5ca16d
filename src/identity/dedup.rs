//! Person deduplication and the manual review queue
//!
//! Auto-merge only happens on identical matching keys with compatible
//! identifiers. Everything else that looks like a known person becomes a
//! provisional person plus a review item; nothing is silently merged or dropped.

use super::normalizer::{dedup_key, edit_ratio, normalize_person_name, NormalizedName};
use super::{IdentityError, IdentityResult};
use crate::graph::types::PersonId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Evidence one source has contributed to a person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    /// Quality score reported by this source (best seen)
    pub score: f64,
    /// Fingerprints of the distinct records this source supplied
    pub records: BTreeSet<String>,
}

impl SourceAttribution {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    fn join(&mut self, other: &SourceAttribution) {
        self.score = self.score.max(other.score);
        self.records.extend(other.records.iter().cloned());
    }
}

/// Canonical person identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: NormalizedName,
    pub identifier: Option<String>,
    pub biography: Option<String>,
    /// Unique across the registry
    pub dedup_key: String,
    pub sources: BTreeMap<String, SourceAttribution>,
    /// Source-count weighted mean of the per-source scores
    pub confidence: f64,
    /// Total distinct records over all sources
    pub source_count: usize,
    /// Created from an ambiguous match that is still awaiting review
    pub provisional: bool,
}

impl Person {
    fn from_candidate(id: PersonId, candidate: &PersonCandidate, provisional: bool) -> Self {
        let mut person = Person {
            id,
            dedup_key: dedup_key(&candidate.name.key, candidate.identifier.as_deref()),
            name: candidate.name.clone(),
            identifier: candidate.identifier.clone(),
            biography: None,
            sources: BTreeMap::new(),
            confidence: 0.0,
            source_count: 0,
            provisional,
        };
        person.observe(candidate);
        person
    }

    pub fn display_name(&self) -> &str {
        &self.name.display
    }

    /// Merge two identities into one.
    ///
    /// The lower id survives and keeps its name. Attributions are joined per
    /// source (max score, union of records), so the operation is associative,
    /// commutative and idempotent on every attribution-derived field. The
    /// dedup key follows the merged identifier.
    pub fn merge(&self, other: &Person) -> Person {
        let (survivor, absorbed) = if self.id <= other.id { (self, other) } else { (other, self) };
        let mut merged = survivor.clone();
        merged.identifier = match (&survivor.identifier, &absorbed.identifier) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        merged.dedup_key = dedup_key(&merged.name.key, merged.identifier.as_deref());
        merged.provisional = survivor.provisional && absorbed.provisional;
        merged.join_attributions(&absorbed.sources, absorbed.biography.as_deref());
        merged
    }

    fn observe(&mut self, candidate: &PersonCandidate) {
        let mut incoming = BTreeMap::new();
        incoming.insert(
            candidate.source.clone(),
            SourceAttribution {
                score: candidate.confidence,
                records: BTreeSet::from([candidate.record.clone()]),
            },
        );
        self.join_attributions(&incoming, candidate.biography.as_deref());
    }

    fn join_attributions(&mut self, sources: &BTreeMap<String, SourceAttribution>, biography: Option<&str>) {
        for (source, attribution) in sources {
            self.sources
                .entry(source.clone())
                .and_modify(|existing| existing.join(attribution))
                .or_insert_with(|| attribution.clone());
        }

        // Longest biography wins, ties broken lexicographically
        if let Some(bio) = biography {
            let replace = match &self.biography {
                None => true,
                Some(current) => (bio.len(), bio) > (current.len(), current.as_str()),
            };
            if replace {
                self.biography = Some(bio.to_string());
            }
        }

        self.refresh_confidence();
    }

    fn refresh_confidence(&mut self) {
        let mut weighted = 0.0;
        let mut total = 0usize;
        for attribution in self.sources.values() {
            weighted += attribution.score * attribution.count() as f64;
            total += attribution.count();
        }
        self.source_count = total;
        self.confidence = if total == 0 { 0.0 } else { weighted / total as f64 };
    }
}

/// A person mention awaiting resolution
#[derive(Debug, Clone, PartialEq)]
pub struct PersonCandidate {
    pub name: NormalizedName,
    pub identifier: Option<String>,
    pub biography: Option<String>,
    pub source: String,
    /// Fingerprint of the record that produced this mention
    pub record: String,
    pub confidence: f64,
}

impl PersonCandidate {
    pub fn new(raw_name: &str, source: impl Into<String>, record: impl Into<String>) -> IdentityResult<Self> {
        Ok(PersonCandidate {
            name: normalize_person_name(raw_name)?,
            identifier: None,
            biography: None,
            source: source.into(),
            record: record.into(),
            confidence: 0.5,
        })
    }

    pub fn with_identifier(mut self, identifier: Option<&str>) -> Self {
        self.identifier = identifier
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_biography(mut self, biography: Option<&str>) -> Self {
        self.biography = biography
            .map(str::trim)
            .filter(|bio| !bio.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Why a candidate was routed to review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Different keys, similarity at or above the fuzzy threshold
    FuzzyName,
    /// Identical keys, but the identifiers disagree or only one side has one
    IdentifierConflict,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::FuzzyName => f.write_str("fuzzy name match"),
            MatchReason::IdentifierConflict => f.write_str("identifier conflict"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Merged,
    KeptSeparate,
}

/// One entry in the manual review queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: Uuid,
    pub existing: PersonId,
    /// The provisional person created for the ambiguous mention
    pub candidate: PersonId,
    pub existing_name: String,
    pub candidate_name: String,
    pub score: f64,
    pub reason: MatchReason,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Merge,
    KeepSeparate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Merged { survivor: PersonId, absorbed: PersonId },
    KeptSeparate { person: PersonId },
}

/// Result of resolving one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Created(PersonId),
    Merged(PersonId),
    Ambiguous {
        person: PersonId,
        existing: PersonId,
        review: Uuid,
        score: f64,
        reason: MatchReason,
    },
}

impl Resolution {
    /// The person the mention is attached to
    pub fn person_id(&self) -> PersonId {
        match self {
            Resolution::Created(id) | Resolution::Merged(id) => *id,
            Resolution::Ambiguous { person, .. } => *person,
        }
    }
}

/// Canonical person table with matching indices and the review queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRegistry {
    persons: IndexMap<PersonId, Person>,
    reviews: IndexMap<Uuid, ReviewItem>,
    next_id: u64,
    fuzzy_threshold: f64,

    /// Lowercased matching key -> persons carrying it
    #[serde(skip)]
    by_key: FxHashMap<String, Vec<PersonId>>,

    /// Last-name initial -> persons, for fuzzy candidate search
    #[serde(skip)]
    by_block: BTreeMap<char, Vec<PersonId>>,
}

impl PersonRegistry {
    pub fn new(fuzzy_threshold: f64) -> Self {
        PersonRegistry {
            persons: IndexMap::new(),
            reviews: IndexMap::new(),
            next_id: 1,
            fuzzy_threshold,
            by_key: FxHashMap::default(),
            by_block: BTreeMap::new(),
        }
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    pub fn set_fuzzy_threshold(&mut self, threshold: f64) {
        self.fuzzy_threshold = threshold;
    }

    pub fn get(&self, id: PersonId) -> Option<&Person> {
        self.persons.get(&id)
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.persons.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Person> {
        self.persons.values()
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    /// Persons whose matching key equals the normalized form of `raw_name`
    pub fn find_by_name(&self, raw_name: &str) -> Vec<&Person> {
        let Ok(name) = normalize_person_name(raw_name) else {
            return Vec::new();
        };
        self.by_key
            .get(&name.key.to_lowercase())
            .map(|ids| ids.iter().filter_map(|id| self.persons.get(id)).collect())
            .unwrap_or_default()
    }

    /// Resolve a mention to a person, creating or queueing as needed.
    pub fn resolve(&mut self, candidate: &PersonCandidate) -> Resolution {
        let lookup = candidate.name.key.to_lowercase();
        let same_key = self.by_key.get(&lookup).cloned().unwrap_or_default();

        if let Some(&id) = same_key
            .iter()
            .find(|id| self.persons.get(*id).map(|p| &p.identifier) == Some(&candidate.identifier))
        {
            if let Some(person) = self.persons.get_mut(&id) {
                person.observe(candidate);
            }
            debug!("Merged mention {:?} into {}", candidate.name.key, id);
            return Resolution::Merged(id);
        }

        if let Some(&existing) = same_key.first() {
            return self.queue_ambiguous(candidate, existing, 1.0, MatchReason::IdentifierConflict);
        }

        if let Some((existing, score)) = self.best_fuzzy_match(&candidate.name) {
            return self.queue_ambiguous(candidate, existing, score, MatchReason::FuzzyName);
        }

        let id = self.insert(candidate, false);
        debug!("Created person {} for {:?}", id, candidate.name.key);
        Resolution::Created(id)
    }

    pub fn review(&self, id: Uuid) -> Option<&ReviewItem> {
        self.reviews.get(&id)
    }

    pub fn reviews(&self) -> impl Iterator<Item = &ReviewItem> {
        self.reviews.values()
    }

    pub fn pending_reviews(&self) -> Vec<&ReviewItem> {
        self.reviews
            .values()
            .filter(|item| item.status == ReviewStatus::Pending)
            .collect()
    }

    /// Apply a reviewer's decision to a pending item.
    pub fn resolve_review(&mut self, id: Uuid, decision: ReviewDecision) -> IdentityResult<ReviewOutcome> {
        let item = self.reviews.get(&id).ok_or(IdentityError::ReviewNotFound(id))?;
        if item.status != ReviewStatus::Pending {
            return Err(IdentityError::ReviewClosed(id));
        }
        let (existing, candidate) = (item.existing, item.candidate);

        let outcome = match decision {
            ReviewDecision::Merge => {
                let (survivor, absorbed) = self.merge_persons(existing, candidate)?;
                ReviewOutcome::Merged { survivor, absorbed }
            }
            ReviewDecision::KeepSeparate => {
                let person = self
                    .persons
                    .get_mut(&candidate)
                    .ok_or(IdentityError::PersonNotFound(candidate))?;
                person.provisional = false;
                ReviewOutcome::KeptSeparate { person: candidate }
            }
        };

        if let Some(item) = self.reviews.get_mut(&id) {
            item.status = match outcome {
                ReviewOutcome::Merged { .. } => ReviewStatus::Merged,
                ReviewOutcome::KeptSeparate { .. } => ReviewStatus::KeptSeparate,
            };
        }
        info!("Review {} resolved: {:?}", id, outcome);
        Ok(outcome)
    }

    /// Fold two persons into one. Returns `(survivor, absorbed)`.
    pub fn merge_persons(&mut self, a: PersonId, b: PersonId) -> IdentityResult<(PersonId, PersonId)> {
        let pa = self.persons.get(&a).ok_or(IdentityError::PersonNotFound(a))?;
        let pb = self.persons.get(&b).ok_or(IdentityError::PersonNotFound(b))?;
        if a == b {
            return Ok((a, b));
        }

        let merged = pa.merge(pb);
        let survivor = merged.id;
        let absorbed = if survivor == a { b } else { a };

        if let Some(gone) = self.persons.shift_remove(&absorbed) {
            self.unindex(&gone);
        }
        if let Some(previous) = self.persons.get(&survivor).cloned() {
            self.unindex(&previous);
        }
        self.index(&merged);
        self.persons.insert(survivor, merged);

        // Re-point open reviews at the survivor; self-pairs are settled by the merge
        for item in self.reviews.values_mut() {
            if item.status != ReviewStatus::Pending {
                continue;
            }
            if item.existing == absorbed {
                item.existing = survivor;
            }
            if item.candidate == absorbed {
                item.candidate = survivor;
            }
            if item.existing == item.candidate {
                item.status = ReviewStatus::Merged;
            }
        }

        Ok((survivor, absorbed))
    }

    /// Rebuild the matching indices, e.g. after loading a snapshot.
    pub fn reindex(&mut self) {
        self.by_key.clear();
        self.by_block.clear();
        let persons: Vec<Person> = self.persons.values().cloned().collect();
        for person in &persons {
            self.index(person);
        }
    }

    fn insert(&mut self, candidate: &PersonCandidate, provisional: bool) -> PersonId {
        let id = PersonId(self.next_id);
        self.next_id += 1;
        let person = Person::from_candidate(id, candidate, provisional);
        self.index(&person);
        self.persons.insert(id, person);
        id
    }

    fn queue_ambiguous(
        &mut self,
        candidate: &PersonCandidate,
        existing: PersonId,
        score: f64,
        reason: MatchReason,
    ) -> Resolution {
        let person = self.insert(candidate, true);
        let existing_name = self
            .persons
            .get(&existing)
            .map(|p| p.name.display.clone())
            .unwrap_or_default();

        let review = Uuid::new_v4();
        self.reviews.insert(
            review,
            ReviewItem {
                id: review,
                existing,
                candidate: person,
                existing_name: existing_name.clone(),
                candidate_name: candidate.name.display.clone(),
                score,
                reason,
                status: ReviewStatus::Pending,
                created_at: Utc::now(),
            },
        );
        warn!(
            "Queued review {}: {:?} vs {:?} ({}, score {:.3})",
            review, candidate.name.display, existing_name, reason, score
        );

        Resolution::Ambiguous {
            person,
            existing,
            review,
            score,
            reason,
        }
    }

    fn best_fuzzy_match(&self, name: &NormalizedName) -> Option<(PersonId, f64)> {
        let block = self.by_block.get(&name.block())?;
        let mut best: Option<(PersonId, f64)> = None;
        for id in block {
            let Some(person) = self.persons.get(id) else { continue };
            let score = edit_ratio(&name.key, &person.name.key);
            if score < self.fuzzy_threshold {
                continue;
            }
            match best {
                Some((best_id, best_score))
                    if best_score > score || (best_score == score && best_id < *id) => {}
                _ => best = Some((*id, score)),
            }
        }
        best
    }

    fn index(&mut self, person: &Person) {
        self.by_key
            .entry(person.name.key.to_lowercase())
            .or_default()
            .push(person.id);
        self.by_block.entry(person.name.block()).or_default().push(person.id);
    }

    fn unindex(&mut self, person: &Person) {
        if let Some(ids) = self.by_key.get_mut(&person.name.key.to_lowercase()) {
            ids.retain(|id| *id != person.id);
        }
        if let Some(ids) = self.by_block.get_mut(&person.name.block()) {
            ids.retain(|id| *id != person.id);
        }
    }
}

impl Default for PersonRegistry {
    fn default() -> Self {
        Self::new(0.85)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(name: &str, source: &str, record: &str) -> PersonCandidate {
        PersonCandidate::new(name, source, record).unwrap()
    }

    #[test]
    fn test_exact_key_without_identifiers_merges() {
        let mut registry = PersonRegistry::default();
        let a = registry.resolve(&mention("Jane Smith", "990-2021", "r1"));
        let b = registry.resolve(&mention("SMITH, JANE", "990-2022", "r2"));

        assert!(matches!(a, Resolution::Created(_)));
        assert_eq!(b, Resolution::Merged(a.person_id()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(a.person_id()).unwrap().source_count, 2);
    }

    #[test]
    fn test_fuzzy_match_is_queued_not_merged() {
        let mut registry = PersonRegistry::default();
        let first = registry.resolve(&mention("Dr. Jane A. Smith Jr.", "990-2021", "r1"));
        let second = registry.resolve(&mention("Jane Smith", "web", "r2"));

        match second {
            Resolution::Ambiguous { existing, score, reason, person, .. } => {
                assert_eq!(existing, first.person_id());
                assert_ne!(person, existing);
                assert!(score >= 0.85);
                assert_eq!(reason, MatchReason::FuzzyName);
            }
            other => panic!("expected ambiguous match, got {:?}", other),
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.pending_reviews().len(), 1);
        assert!(registry.get(second.person_id()).unwrap().provisional);
    }

    #[test]
    fn test_repeated_ambiguous_mention_does_not_requeue() {
        let mut registry = PersonRegistry::default();
        registry.resolve(&mention("Jane A Smith", "990", "r1"));
        let first = registry.resolve(&mention("Jane Smith", "web", "r2"));
        let again = registry.resolve(&mention("Jane Smith", "web", "r2"));

        assert_eq!(again, Resolution::Merged(first.person_id()));
        assert_eq!(registry.pending_reviews().len(), 1);
        assert_eq!(registry.get(first.person_id()).unwrap().source_count, 1);
    }

    #[test]
    fn test_identifier_conflict_is_queued() {
        let mut registry = PersonRegistry::default();
        let a = registry.resolve(&mention("John Doe", "990", "r1").with_identifier(Some("ID-1")));
        let b = registry.resolve(&mention("John Doe", "990", "r2").with_identifier(Some("ID-2")));
        let c = registry.resolve(&mention("John Doe", "990", "r3"));
        let d = registry.resolve(&mention("John Doe", "990", "r4").with_identifier(Some("ID-1")));

        assert!(matches!(b, Resolution::Ambiguous { reason: MatchReason::IdentifierConflict, .. }));
        assert!(matches!(c, Resolution::Ambiguous { reason: MatchReason::IdentifierConflict, .. }));
        assert_eq!(d, Resolution::Merged(a.person_id()));
        assert_eq!(registry.pending_reviews().len(), 2);
    }

    #[test]
    fn test_dissimilar_names_create_distinct_people() {
        let mut registry = PersonRegistry::default();
        registry.resolve(&mention("Jane Smith", "990", "r1"));
        let other = registry.resolve(&mention("John Smith", "990", "r2"));
        assert!(matches!(other, Resolution::Created(_)));
        assert!(registry.pending_reviews().is_empty());
    }

    #[test]
    fn test_confidence_is_weighted_not_max() {
        let mut registry = PersonRegistry::default();
        let id = registry
            .resolve(&mention("Ann Lee", "990", "r1").with_confidence(0.9))
            .person_id();
        registry.resolve(&mention("Ann Lee", "web", "w1").with_confidence(0.3));
        registry.resolve(&mention("Ann Lee", "web", "w2").with_confidence(0.3));

        let person = registry.get(id).unwrap();
        assert_eq!(person.source_count, 3);
        assert!((person.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_merge_is_associative_and_idempotent() {
        let mut registry = PersonRegistry::default();
        let ids: Vec<PersonId> = [("Al Roe", "a", "r1", 0.2), ("Al Roe", "b", "r2", 0.6), ("Al Roe", "c", "r3", 0.9)]
            .iter()
            .map(|(name, source, record, conf)| {
                let mut candidate = mention(name, source, record).with_confidence(*conf);
                candidate.identifier = Some(format!("id-{}", record));
                registry.resolve(&candidate).person_id()
            })
            .collect();
        let a = registry.get(ids[0]).unwrap().clone();
        let b = registry.get(ids[1]).unwrap().clone();
        let c = registry.get(ids[2]).unwrap().clone();

        let left = a.merge(&b).merge(&c);
        let right = a.merge(&b.merge(&c));
        assert_eq!(left.sources, right.sources);
        assert_eq!(left.confidence, right.confidence);
        assert_eq!(left.source_count, right.source_count);
        assert_eq!(left.identifier, right.identifier);
        assert_eq!(left.merge(&b), left);
    }

    #[test]
    fn test_review_merge_folds_provisional_person() {
        let mut registry = PersonRegistry::default();
        let existing = registry.resolve(&mention("Jane A Smith", "990", "r1")).person_id();
        let ambiguous = registry.resolve(&mention("Jane Smith", "web", "r2"));
        let Resolution::Ambiguous { review, person, .. } = ambiguous else {
            panic!("expected ambiguous");
        };

        let outcome = registry.resolve_review(review, ReviewDecision::Merge).unwrap();
        assert_eq!(outcome, ReviewOutcome::Merged { survivor: existing, absorbed: person });
        assert!(registry.get(person).is_none());
        assert_eq!(registry.get(existing).unwrap().source_count, 2);
        assert!(registry.pending_reviews().is_empty());
        assert_eq!(
            registry.resolve_review(review, ReviewDecision::Merge),
            Err(IdentityError::ReviewClosed(review))
        );
    }

    #[test]
    fn test_review_keep_separate() {
        let mut registry = PersonRegistry::default();
        registry.resolve(&mention("Jane A Smith", "990", "r1"));
        let Resolution::Ambiguous { review, person, .. } = registry.resolve(&mention("Jane Smith", "web", "r2")) else {
            panic!("expected ambiguous");
        };
        registry.resolve_review(review, ReviewDecision::KeepSeparate).unwrap();
        assert!(!registry.get(person).unwrap().provisional);
        assert!(matches!(
            registry.resolve_review(Uuid::new_v4(), ReviewDecision::Merge),
            Err(IdentityError::ReviewNotFound(_))
        ));
    }

    #[test]
    fn test_review_merge_rekeys_survivor() {
        let mut registry = PersonRegistry::default();
        let first = registry.resolve(&mention("John Doe", "990", "r1")).person_id();
        let Resolution::Ambiguous { review, .. } =
            registry.resolve(&mention("John Doe", "990", "r2").with_identifier(Some("ID-1")))
        else {
            panic!("expected ambiguous");
        };
        registry.resolve_review(review, ReviewDecision::Merge).unwrap();

        let survivor = registry.get(first).unwrap();
        assert_eq!(survivor.identifier.as_deref(), Some("ID-1"));
        assert_eq!(survivor.dedup_key, dedup_key(&survivor.name.key, Some("ID-1")));

        let later = registry.resolve(&mention("John Doe", "990", "r3"));
        assert_ne!(later.person_id(), first);
        assert_eq!(
            registry.resolve(&mention("John Doe", "990", "r4").with_identifier(Some("ID-1"))),
            Resolution::Merged(first)
        );

        let keys: BTreeSet<&str> = registry.iter().map(|p| p.dedup_key.as_str()).collect();
        assert_eq!(keys.len(), registry.len());
    }

    #[test]
    fn test_reindex_after_roundtrip() {
        let mut registry = PersonRegistry::default();
        let id = registry.resolve(&mention("Mo Khan", "990", "r1")).person_id();
        let bytes = bincode::serialize(&registry).unwrap();
        let mut restored: PersonRegistry = bincode::deserialize(&bytes).unwrap();
        restored.reindex();
        assert_eq!(restored.resolve(&mention("Mo Khan", "990", "r2")), Resolution::Merged(id));
    }
}
