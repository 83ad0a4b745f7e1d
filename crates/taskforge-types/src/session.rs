//! Transient decomposition session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::AtomicTask;
use crate::{ProjectId, TaskId};

/// Lifecycle of a decomposition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet started.
    Pending,
    /// Decomposition is running.
    Running,
    /// All leaves persisted.
    Completed,
    /// Decomposition failed or was cancelled.
    Failed,
}

/// Per-task outcome recorded while a session runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionOutcome {
    /// Task the outcome refers to.
    pub task_id: TaskId,
    /// Recursion depth the task was produced at.
    pub depth: u32,
    /// Whether the task satisfied the atomic predicate.
    pub atomic: bool,
    /// Warnings recorded for this task (depth cap reached, estimate drift).
    pub warnings: Vec<String>,
}

/// A single run of the decomposition engine over one root task.
///
/// Sessions are owned by exactly one worker; cross-worker access goes
/// through the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionSession {
    /// Session identifier.
    pub id: String,
    /// Project the root task belongs to.
    pub project_id: ProjectId,
    /// The task being decomposed.
    pub root_task: AtomicTask,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Completion estimate, 0–100.
    pub progress: u8,
    /// Every leaf written to storage, in persistence order. Empty when the
    /// root was already atomic.
    pub persisted_tasks: Vec<TaskId>,
    /// Per-task outcomes.
    pub rich_results: Vec<DecompositionOutcome>,
    /// When the session started.
    pub start_time: DateTime<Utc>,
    /// When the session reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl DecompositionSession {
    /// Creates a pending session for a root task.
    pub fn new(id: impl Into<String>, root_task: AtomicTask) -> Self {
        Self {
            id: id.into(),
            project_id: root_task.project_id.clone(),
            root_task,
            status: SessionStatus::Pending,
            progress: 0,
            persisted_tasks: Vec::new(),
            rich_results: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Marks the session terminal with the given status.
    pub fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.progress = if status == SessionStatus::Completed { 100 } else { self.progress };
        self.end_time = Some(Utc::now());
    }
}
