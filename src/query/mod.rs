//! Query layer
//!
//! Read-only questions over the network:
//! - Bundling of recipients shared by several funders
//! - Funder similarity and peer groups
//! - A filtered graph handle for co-funders, bounded pathfinding, influence and stats

pub mod bundle;
pub mod handle;
pub mod paths;

pub use bundle::{bundle, BundledGrantee, BundledGrantees, FunderContribution};
pub use handle::{CoFunder, Connector, GraphHandle, GraphStats, SharedRecipient};
pub use paths::{PathHop, PathSearch, PathStep, PathStrategy, Pathfinder, RankedPath};

use thiserror::Error;

/// Query errors are returned synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
