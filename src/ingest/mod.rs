//! Relationship extraction from upstream records

pub mod extractor;
pub mod records;

pub use extractor::{BatchSummary, OrganizationDirectory, RelationshipExtractor, StaticDirectory};
pub use records::{parse_records, GrantRecord, IngestRecord, OrganizationRecord, RoleRecord, ValidRecord};

use crate::graph::GraphError;
use crate::identity::IdentityError;
use thiserror::Error;

/// Errors raised while ingesting records
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;
