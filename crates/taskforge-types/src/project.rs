//! Project and epic entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::task::TaskPriority;
use crate::{EpicId, ProjectId, TaskId, FORMAT_VERSION};

/// Lifecycle status shared by projects and epics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// Work is underway.
    InProgress,
    /// All contained work completed.
    Completed,
    /// Waiting on an external condition.
    Blocked,
    /// Abandoned. Terminal.
    Cancelled,
}

/// Languages, frameworks, and tools a project is built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechStack {
    /// Programming languages in use.
    pub languages: Vec<String>,
    /// Frameworks in use.
    pub frameworks: Vec<String>,
    /// Build and development tools in use.
    pub tools: Vec<String>,
}

/// Bookkeeping metadata attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Entity schema version.
    pub version: String,
    /// Who created the project.
    pub created_by: String,
}

/// Top-level grouping of epics and tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project identifier (`PID-<SLUG>-NNN`).
    pub project_id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Root path of the project's working tree.
    pub root_path: String,
    /// Current lifecycle status.
    pub status: LifecycleStatus,
    /// Project priority.
    pub priority: TaskPriority,
    /// Languages, frameworks, and tools.
    pub tech_stack: TechStack,
    /// Ordered epics belonging to this project. Invariant: only live epics
    /// whose `project_id` matches this project.
    pub epic_ids: Vec<EpicId>,
    /// Bookkeeping metadata.
    pub metadata: ProjectMetadata,
    /// Persistence format version.
    pub format_version: String,
}

impl Project {
    /// Creates a pending project.
    pub fn new(
        project_id: impl Into<ProjectId>,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            name: name.into(),
            description: String::new(),
            root_path: String::new(),
            status: LifecycleStatus::Pending,
            priority: TaskPriority::Medium,
            tech_stack: TechStack::default(),
            epic_ids: Vec::new(),
            metadata: ProjectMetadata {
                created_at: now,
                updated_at: now,
                version: FORMAT_VERSION.to_string(),
                created_by: created_by.into(),
            },
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Validates the project against the schema limits.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("project name cannot be empty".into()));
        }
        Ok(())
    }
}

/// A named grouping of tasks inside a project by functional area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    /// Unique epic identifier. Must never match the reserved scaffolding
    /// patterns (`E001`, `default-epic`, ...).
    pub epic_id: EpicId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Current lifecycle status.
    pub status: LifecycleStatus,
    /// Epic priority.
    pub priority: TaskPriority,
    /// Aggregate effort estimate in hours.
    pub estimated_hours: f64,
    /// Ordered tasks belonging to this epic. Invariant: every entry
    /// references an existing task whose `epic_id` is this epic.
    pub task_ids: Vec<TaskId>,
    /// Epic-level dependencies, if any.
    #[serde(default)]
    pub dependencies: Vec<EpicId>,
    /// Epic-level dependents, if any.
    #[serde(default)]
    pub dependents: Vec<EpicId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persistence format version.
    pub format_version: String,
}

impl Epic {
    /// Creates a pending epic.
    pub fn new(
        epic_id: impl Into<EpicId>,
        project_id: impl Into<ProjectId>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            epic_id: epic_id.into(),
            project_id: project_id.into(),
            title: title.into(),
            description: String::new(),
            status: LifecycleStatus::Pending,
            priority: TaskPriority::Medium,
            estimated_hours: 0.0,
            task_ids: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            created_at: now,
            updated_at: now,
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Validates the epic against the schema limits.
    pub fn validate(&self) -> CoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "epic {} has an empty title",
                self.epic_id
            )));
        }
        if self.project_id.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "epic {} has no owning project",
                self.epic_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_yaml_round_trip() {
        let project = Project::new("PID-WEB-APP-001", "Web App", "gateway");
        let yaml = serde_yaml::to_string(&project).unwrap();
        let back: Project = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(project, back);
    }

    #[test]
    fn epic_requires_owning_project() {
        let mut epic = Epic::new("PID-WEB-APP-001-E001", "", "Authentication");
        epic.project_id = String::new();
        assert!(epic.validate().is_err());
    }

    #[test]
    fn empty_project_name_rejected() {
        let project = Project::new("PID-X-001", "  ", "gateway");
        assert!(project.validate().is_err());
    }
}
