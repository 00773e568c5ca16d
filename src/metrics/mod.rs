//! Derived network metrics
//!
//! Centrality and influence are recomputed wholesale per organization
//! component and published as immutable, versioned runs. Funder similarity and
//! peer groups are computed on demand from the grant tables.

pub mod engine;
pub mod similarity;
pub mod store;

pub use engine::{
    role_weight, BetweennessMethod, ComputeMode, MetricContext, MetricRun, MetricsEngine, OrgMetrics,
    PersonMetrics,
};
pub use similarity::{funder_similarity, FunderSimilarityGraph, PeerGroup, SimilarityEdge, SimilarityReport};
pub use store::{InfluenceReport, MetricStore, NodeMetrics, SharedMetrics};
