//! Grantgraph
//!
//! Relationship-graph analytics over funders, grantees and the people who
//! serve on their boards and staffs.
//!
//! # Architecture
//!
//! - `identity`: name normalization and person deduplication with a review queue
//! - `ingest`: validation of role and grant filings into the store, in filing order
//! - `graph`: relational store, derived connection edges and the rebuilt network view
//! - `metrics`: per-component centrality and influence, funder similarity, versioned runs
//! - `query`: bundling, co-funders, bounded pathfinding and graph statistics
//! - `recompute`: invalidation-driven background recomputation with timeouts
//! - `export`: GraphML and node/link JSON
//!
//! ## Example Usage
//!
//! ```rust
//! use grantgraph::graph::{GrantDraft, GraphStore};
//! use grantgraph::query::bundle;
//!
//! let mut store = GraphStore::new();
//! for (funder, amount) in [("F1", 500_000.0), ("F2", 600_000.0)] {
//!     store.ensure_organization(&funder.into(), None);
//!     store.ensure_organization(&"R".into(), Some("Food Bank"));
//!     store
//!         .upsert_grant(GrantDraft {
//!             funder: funder.into(),
//!             recipient: "R".into(),
//!             recipient_name: None,
//!             amount,
//!             year: 2022,
//!             purpose: None,
//!         })
//!         .unwrap();
//! }
//!
//! let bundled = bundle(&store, &["F1".into(), "F2".into()], 2, None).unwrap();
//! assert_eq!(bundled.grantees[0].total_funding, 1_100_000.0);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod config;
pub mod export;
pub mod graph;
pub mod identity;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod recompute;
pub mod service;

use thiserror::Error;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigResult, NetworkConfig};
pub use export::{ExportError, ExportFormat, ExportResult, WebGraph};
pub use graph::{
    ComponentKey, Edge, EdgeKind, GraphError, GraphFilter, GraphResult, GraphStore, Network, Node,
    NodeKey, NodeKind, OrgId, PersonId, PropertyMap, PropertyValue, RoleKind, SnapshotError,
};
pub use identity::IdentityError;
pub use ingest::{BatchSummary, IngestError, IngestRecord, IngestResult, RelationshipExtractor};
pub use metrics::{
    InfluenceReport, MetricRun, MetricStore, MetricsEngine, SharedMetrics, SimilarityReport,
};
pub use query::{
    BundledGrantees, GraphHandle, GraphStats, PathSearch, QueryError, QueryResult, RankedPath,
};
pub use recompute::{CoordinatorStatus, CycleReport, RecomputeCoordinator, RecomputeError};
pub use service::GrantNetwork;

/// Any error raised by the library
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Recompute(#[from] RecomputeError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
