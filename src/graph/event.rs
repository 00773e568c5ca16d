//! Invalidation events for the recompute coordinator
//!
//! Every mutation of a Role, Grant or derived Connection emits one event per
//! affected organization.

use super::types::OrgId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationCause {
    RoleUpserted,
    GrantUpserted,
    ConnectionChanged,
    PersonMerged,
    /// The organization itself was removed
    OrganizationDeleted,
    /// A grant or connection partner was removed
    NeighborDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub organization: OrgId,
    pub cause: InvalidationCause,
}

impl InvalidationEvent {
    pub fn new(organization: OrgId, cause: InvalidationCause) -> Self {
        InvalidationEvent { organization, cause }
    }
}
