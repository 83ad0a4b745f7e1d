#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-types** – Shared primitive data structures for the Taskforge core.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It intentionally makes no assumptions about I/O, async runtimes, or
//! storage: entities, status enums, transition rules, and the closed error
//! set live here; everything that touches the filesystem, the network, or
//! the oracle lives above.

//─────────────────────────────
//  Validation constants
//─────────────────────────────

/// Maximum allowed length for a task title.
pub const MAX_TASK_TITLE_LEN: usize = 200;

/// Lower bound of the atomic estimate range, in hours (5 minutes).
pub const ATOMIC_MIN_HOURS: f64 = 0.08;

/// Upper bound of the atomic estimate range, in hours (10 minutes).
pub const ATOMIC_MAX_HOURS: f64 = 0.17;

/// Format version stamped into every persisted entity for migration.
pub const FORMAT_VERSION: &str = "1.0";

/// Oracle verdicts below this confidence are downgraded unless the
/// heuristic agrees.
pub const MIN_ORACLE_CONFIDENCE: f64 = 0.6;

/// Decomposition recursion stops short-circuiting only above this
/// confidence.
pub const ATOMIC_SHORT_CIRCUIT_CONFIDENCE: f64 = 0.9;

/// Maximum recursion depth for the decomposition engine.
pub const MAX_DECOMPOSITION_DEPTH: u32 = 3;

//─────────────────────────────
//  Identifier aliases
//─────────────────────────────

/// Identifier of a [`Project`] (`PID-<SLUG>-NNN`).
pub type ProjectId = String;

/// Identifier of an [`Epic`] (`<projectId>-E<NNN>` or area-derived).
pub type EpicId = String;

/// Identifier of an [`AtomicTask`] (`T<n>` or `<projectId>-<epicId>-T<NNN>`).
pub type TaskId = String;

/// Identifier of a [`Dependency`] (`DEP-<from>-<to>-<NNN>`).
pub type DependencyId = String;

/// Identifier of an [`Agent`].
pub type AgentId = String;

//─────────────────────────────
//  Modules
//─────────────────────────────

/// Closed error set shared by every crate in the workspace.
pub mod error;
/// Task entity, status machine, priorities, and types.
pub mod task;
/// Project and epic entities.
pub mod project;
/// Dependency edges and the derived per-project graph.
pub mod dependency;
/// Agent entity, capabilities, transports, and the agent status machine.
pub mod agent;
/// Transient decomposition session state.
pub mod session;

pub use agent::{
    Agent, AgentCapability, AgentMetadata, AgentPerformance, AgentStatus, TransportType,
};
pub use dependency::{
    Dependency, DependencyGraph, DependencyType, GraphMetadata, GraphNode, GraphStatistics,
};
pub use error::{CoreError, CoreResult, ErrorKind, PathViolationKind};
pub use project::{Epic, LifecycleStatus, Project, ProjectMetadata, TechStack};
pub use session::{DecompositionOutcome, DecompositionSession, SessionStatus};
pub use task::{AtomicTask, TaskPriority, TaskStatus, TaskType};

/// Returns true when an hour estimate falls inside the canonical atomic
/// range (5–10 minutes).
pub fn is_atomic_estimate(hours: f64) -> bool {
    (ATOMIC_MIN_HOURS..=ATOMIC_MAX_HOURS).contains(&hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_range_is_inclusive() {
        assert!(is_atomic_estimate(ATOMIC_MIN_HOURS));
        assert!(is_atomic_estimate(ATOMIC_MAX_HOURS));
        assert!(is_atomic_estimate(0.1));
        assert!(!is_atomic_estimate(0.05));
        assert!(!is_atomic_estimate(0.2));
    }
}
