//! Task entity and its status machine.
//!
//! An [`AtomicTask`] is the unit of work dispatched to agents. Tasks in the
//! canonical atomic range (5–10 minutes, exactly one acceptance criterion)
//! are leaves of the decomposition tree; anything larger is fed back into
//! the decomposition engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentCapability;
use crate::error::{CoreError, CoreResult};
use crate::{AgentId, EpicId, ProjectId, TaskId, FORMAT_VERSION, MAX_TASK_TITLE_LEN};

/// Lifecycle status of a task.
///
/// Transitions are totally ordered per task (serialized under the task's
/// write lock) and validated through [`TaskStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting on dependencies or an agent.
    Pending,
    /// Assigned and running on an agent.
    InProgress,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished unsuccessfully; may be retried.
    Failed,
    /// Blocked on an external condition; may be retried.
    Blocked,
    /// Cancelled by the caller. Terminal.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Validates a status transition.
    ///
    /// The machine is `pending → in_progress → (completed | failed |
    /// blocked)`; failed and blocked tasks may return to `pending` on retry,
    /// an in-progress task returns to `pending` when its agent goes offline,
    /// and `cancelled` is reachable from any non-terminal state.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, InProgress) => true,
            (InProgress, Completed) | (InProgress, Failed) | (InProgress, Blocked) => true,
            // Requeue paths: agent lost, retry after failure, unblocked.
            (InProgress, Pending) | (Failed, Pending) | (Blocked, Pending) => true,
            (s, Cancelled) if !s.is_terminal() => true,
            _ => false,
        }
    }
}

/// Priority of a task, project, or epic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Scheduled ahead of medium and low.
    High,
    /// Scheduled first; critical-path candidates.
    Critical,
}

impl TaskPriority {
    /// Numeric weight used by scheduling policies (higher schedules first).
    pub fn weight(self) -> u8 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Medium => 1,
            TaskPriority::High => 2,
            TaskPriority::Critical => 3,
        }
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Feature or implementation work.
    Development,
    /// Test authoring or execution.
    Testing,
    /// Documentation work.
    Documentation,
    /// Investigation with no direct code output.
    Research,
    /// Code or design review.
    Review,
    /// Behavior-preserving restructuring.
    Refactoring,
    /// Release or infrastructure work.
    Deployment,
    /// Defect diagnosis and repair.
    Debugging,
}

impl TaskType {
    /// Capability an agent must hold to execute a task of this type.
    pub fn required_capability(self) -> AgentCapability {
        match self {
            TaskType::Development | TaskType::Research | TaskType::Review => {
                AgentCapability::General
            }
            TaskType::Testing => AgentCapability::Testing,
            TaskType::Documentation => AgentCapability::Documentation,
            TaskType::Refactoring => AgentCapability::Refactoring,
            TaskType::Deployment => AgentCapability::Devops,
            TaskType::Debugging => AgentCapability::Debugging,
        }
    }
}

/// The unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicTask {
    /// Unique task identifier.
    pub task_id: TaskId,
    /// Short human-readable title (at most 200 characters).
    pub title: String,
    /// Non-empty description of the work.
    pub description: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Kind of work.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Functional area the task belongs to (`auth`, `api`, `ui`, ...).
    pub functional_area: String,
    /// Estimated effort in hours; the atomic range is 0.08–0.17.
    pub estimated_hours: f64,
    /// Acceptance criteria; exactly one for an atomic task.
    pub acceptance_criteria: Vec<String>,
    /// Tasks this task depends on (they must complete first).
    pub dependencies: Vec<TaskId>,
    /// Tasks that depend on this task.
    pub dependents: Vec<TaskId>,
    /// Files the task is expected to touch.
    pub file_paths: Vec<String>,
    /// Testing expectations attached to the task.
    pub testing_requirements: Vec<String>,
    /// Quality gates attached to the task.
    pub quality_criteria: Vec<String>,
    /// Agent currently assigned, if any.
    pub assigned_agent: Option<AgentId>,
    /// Owning epic.
    pub epic_id: EpicId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Who created the task.
    pub created_by: String,
    /// Free-form tags for search and documentation.
    pub tags: Vec<String>,
    /// Optional completion deadline consumed by deadline-driven scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persistence format version.
    pub format_version: String,
}

impl AtomicTask {
    /// Creates a pending task with the given identity and sensible defaults.
    pub fn new(
        task_id: impl Into<TaskId>,
        title: impl Into<String>,
        description: impl Into<String>,
        project_id: impl Into<ProjectId>,
        epic_id: impl Into<EpicId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            task_type: TaskType::Development,
            functional_area: String::new(),
            estimated_hours: 0.0,
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            file_paths: Vec::new(),
            testing_requirements: Vec::new(),
            quality_criteria: Vec::new(),
            assigned_agent: None,
            epic_id: epic_id.into(),
            project_id: project_id.into(),
            created_by: String::new(),
            tags: Vec::new(),
            deadline: None,
            created_at: now,
            updated_at: now,
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Validates the task against the schema limits.
    pub fn validate(&self) -> CoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("task title cannot be empty".into()));
        }
        if self.title.chars().count() > MAX_TASK_TITLE_LEN {
            return Err(CoreError::Validation(format!(
                "task title exceeds {} characters",
                MAX_TASK_TITLE_LEN
            )));
        }
        if self.description.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "task {} has an empty description",
                self.task_id
            )));
        }
        if self.estimated_hours < 0.0 || !self.estimated_hours.is_finite() {
            return Err(CoreError::Validation(format!(
                "task {} has an invalid estimate: {}",
                self.task_id, self.estimated_hours
            )));
        }
        Ok(())
    }

    /// Whether the task satisfies the deterministic atomic heuristic:
    /// estimate inside the 5–10 minute range, exactly one acceptance
    /// criterion, and at most three file paths.
    pub fn satisfies_atomic_heuristic(&self) -> bool {
        crate::is_atomic_estimate(self.estimated_hours)
            && self.acceptance_criteria.len() == 1
            && self.file_paths.len() <= 3
    }

    /// Capabilities an agent must hold to run this task.
    pub fn required_capabilities(&self) -> Vec<AgentCapability> {
        vec![self.task_type.required_capability()]
    }

    /// Applies a status transition, enforcing the state machine.
    pub fn transition_to(&mut self, next: TaskStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Validation(format!(
                "task {}: illegal status transition {:?} -> {:?}",
                self.task_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> AtomicTask {
        let mut t = AtomicTask::new("T1", "Add login form", "Build the login form", "P1", "P1-auth-epic");
        t.description = "Build the login form component".into();
        t
    }

    #[test]
    fn status_machine_accepts_lifecycle_paths() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Pending));
        assert!(Failed.can_transition_to(Pending));
        assert!(Blocked.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn status_machine_rejects_terminal_exits() {
        use TaskStatus::*;
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn overlong_title_fails_validation() {
        let mut t = task();
        t.title = "x".repeat(201);
        let err = t.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn atomic_heuristic_requires_single_criterion() {
        let mut t = task();
        t.estimated_hours = 0.1;
        t.acceptance_criteria = vec!["form renders".into()];
        assert!(t.satisfies_atomic_heuristic());

        t.acceptance_criteria.push("form validates".into());
        assert!(!t.satisfies_atomic_heuristic());
    }

    #[test]
    fn transition_updates_timestamp() {
        let mut t = task();
        let before = t.updated_at;
        t.transition_to(TaskStatus::InProgress).unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        assert!(t.updated_at >= before);
        assert!(t.transition_to(TaskStatus::InProgress).is_err());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let t = task();
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"taskId\""));
        assert!(json.contains("\"estimatedHours\""));
        assert!(json.contains("\"type\":\"development\""));
        assert!(json.contains("\"status\":\"pending\""));
    }

    #[test]
    fn priority_ordering_matches_weight() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Medium);
        assert!(TaskPriority::Medium > TaskPriority::Low);
        assert_eq!(TaskPriority::Critical.weight(), 3);
    }
}
