#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-graph** – Dependency DAG maintenance and task scheduling.
//!
//! [`DependencyOps`] owns edge CRUD over the store: it refuses self-loops
//! and cycle-closing edges, keeps the per-task `dependencies`/`dependents`
//! lists in sync, and derives the per-project [`DependencyGraph`] (Kahn
//! topological order, simplified additive critical path, statistics).
//! [`TaskScheduler`] turns the ready set into an execution plan under one
//! of six policies.

pub mod dependency;
pub mod schedule;

pub use dependency::{
    DependencyOps, NewDependency, ValidationFinding, ValidationReport, ValidationSeverity,
};
pub use schedule::{ready_task_ids, Schedule, ScheduleEntry, SchedulingPolicy, TaskScheduler};
