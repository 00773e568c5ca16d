//! Invalidation-driven metric recompute
//!
//! Store mutations mark organizations Stale; a batch cycle recomputes the
//! components holding stale organizations and publishes fresh runs.

pub mod coordinator;
pub mod state;

pub use coordinator::{ComponentCompute, CoordinatorStatus, CycleReport, RecomputeCoordinator};
pub use state::{NodeState, StateTable};

use crate::graph::ComponentKey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecomputeError {
    #[error("Recompute of {component} timed out after {attempts} attempts")]
    Timeout { component: ComponentKey, attempts: u32 },

    #[error("Recompute task failed: {0}")]
    TaskFailed(String),
}

pub type RecomputeResult<T> = Result<T, RecomputeError>;
