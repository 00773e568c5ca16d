//! Relationship graph storage
//!
//! This module implements the network data model with:
//! - Flat relational tables for organizations, persons, roles and grants
//! - Derived connection edges between organizations sharing people
//! - An in-memory arena view rebuilt wholesale for algorithms and queries
//! - Compressed snapshot persistence

pub mod edge;
pub mod event;
pub mod network;
pub mod node;
pub mod property;
pub mod records;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::{grant_weight, Edge, EdgeDetail};
pub use event::{InvalidationCause, InvalidationEvent};
pub use network::{Component, ComponentKey, GraphFilter, Network};
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use records::{
    ConnectionEdge, Grant, GrantContribution, GrantDraft, GrantKey, Organization,
    OrganizationAttributes, Role, RoleDraft, RoleKey, UpsertOutcome,
};
pub use snapshot::{SnapshotError, SnapshotInfo, SnapshotResult};
pub use store::{DeletionSummary, GraphError, GraphResult, GraphStore};
pub use types::{EdgeId, EdgeKind, NodeId, NodeKey, NodeKind, OrgId, OrgPair, PersonId, RoleId, RoleKind};
