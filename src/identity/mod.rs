//! Person identity resolution
//!
//! Normalization turns raw filing names into canonical keys; the deduplicator
//! decides whether a candidate is a known person, a new one, or an ambiguous
//! match that needs a human decision.

pub mod dedup;
pub mod normalizer;

pub use dedup::{
    MatchReason, Person, PersonCandidate, PersonRegistry, Resolution, ReviewDecision,
    ReviewItem, ReviewOutcome, ReviewStatus, SourceAttribution,
};
pub use normalizer::{dedup_key, edit_ratio, normalize_org_name, normalize_person_name, NormalizedName};

use crate::graph::types::PersonId;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while resolving identities
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Ambiguous match: {candidate:?} resembles {existing} (score {score:.3}, {reason})")]
    AmbiguousMatch {
        candidate: String,
        existing: PersonId,
        score: f64,
        reason: MatchReason,
    },

    #[error("Person {0} not found")]
    PersonNotFound(PersonId),

    #[error("Review item {0} not found")]
    ReviewNotFound(Uuid),

    #[error("Review item {0} is already resolved")]
    ReviewClosed(Uuid),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
