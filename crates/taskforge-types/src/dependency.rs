//! Dependency edges between tasks and the derived per-project graph.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::task::{TaskPriority, TaskStatus};
use crate::{DependencyId, ProjectId, TaskId, FORMAT_VERSION};

/// Strength of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// The downstream task cannot start until the upstream completes.
    #[default]
    Blocks,
    /// The upstream unlocks the downstream but does not hard-block it.
    Enables,
    /// The downstream consumes an artifact of the upstream.
    Requires,
    /// Advisory ordering only.
    Suggests,
}

/// A directed edge: `from_task_id` depends on `to_task_id`, meaning the
/// target must complete first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Unique edge identifier (`DEP-<from>-<to>-<NNN>`).
    pub dependency_id: DependencyId,
    /// The dependent task.
    pub from_task_id: TaskId,
    /// The prerequisite task; must complete before `from_task_id` starts.
    pub to_task_id: TaskId,
    /// Strength of the edge.
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,
    /// Why the edge exists.
    pub description: String,
    /// Whether the edge participates in critical-path weighting.
    pub critical: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persistence format version.
    pub format_version: String,
}

impl Dependency {
    /// Creates a blocking dependency edge.
    pub fn new(
        dependency_id: impl Into<DependencyId>,
        from_task_id: impl Into<TaskId>,
        to_task_id: impl Into<TaskId>,
    ) -> Self {
        Self {
            dependency_id: dependency_id.into(),
            from_task_id: from_task_id.into(),
            to_task_id: to_task_id.into(),
            dependency_type: DependencyType::Blocks,
            description: String::new(),
            critical: false,
            created_at: Utc::now(),
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Rejects self-loops.
    pub fn validate(&self) -> CoreResult<()> {
        if self.from_task_id == self.to_task_id {
            return Err(CoreError::Validation(format!(
                "dependency {} is a self-loop on task {}",
                self.dependency_id, self.from_task_id
            )));
        }
        Ok(())
    }
}

/// A task's position inside the derived graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Task identifier.
    pub task_id: TaskId,
    /// Task title at generation time.
    pub title: String,
    /// Task status at generation time.
    pub status: TaskStatus,
    /// Task priority at generation time.
    pub priority: TaskPriority,
    /// Estimated effort in hours.
    pub estimated_hours: f64,
    /// Prerequisite tasks.
    pub dependencies: Vec<TaskId>,
    /// Dependent tasks.
    pub dependents: Vec<TaskId>,
    /// Longest prerequisite chain length below this node.
    pub depth: usize,
    /// Whether the node lies on the critical path.
    pub critical_path: bool,
}

/// Aggregate statistics of a generated graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStatistics {
    /// Number of nodes.
    pub total_tasks: usize,
    /// Number of edges.
    pub total_dependencies: usize,
    /// Maximum node depth.
    pub max_depth: usize,
    /// Number of tasks trapped in cycles.
    pub cyclic_dependencies: usize,
    /// Tasks with neither dependencies nor dependents.
    pub orphaned_tasks: usize,
}

/// Generation metadata of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    /// When the graph was generated.
    pub generated_at: DateTime<Utc>,
    /// False when cycles were detected during generation.
    pub is_valid: bool,
    /// Human-readable findings recorded during generation.
    pub validation_errors: Vec<String>,
}

/// Per-project derived dependency view.
///
/// Invariant: when `metadata.is_valid`, `execution_order` is a topological
/// sort covering every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Owning project.
    pub project_id: ProjectId,
    /// Task nodes keyed by ID, in insertion order.
    pub nodes: IndexMap<TaskId, GraphNode>,
    /// All edges contributing to the graph.
    pub edges: Vec<Dependency>,
    /// Topological execution order (empty when invalid).
    pub execution_order: Vec<TaskId>,
    /// The longest chain of dependent tasks by cumulative estimated hours.
    pub critical_path: Vec<TaskId>,
    /// Aggregate statistics.
    pub statistics: GraphStatistics,
    /// Generation metadata.
    pub metadata: GraphMetadata,
    /// Persistence format version.
    pub format_version: String,
}

impl DependencyGraph {
    /// Creates an empty graph for a project.
    pub fn empty(project_id: impl Into<ProjectId>) -> Self {
        Self {
            project_id: project_id.into(),
            nodes: IndexMap::new(),
            edges: Vec::new(),
            execution_order: Vec::new(),
            critical_path: Vec::new(),
            statistics: GraphStatistics::default(),
            metadata: GraphMetadata {
                generated_at: Utc::now(),
                is_valid: true,
                validation_errors: Vec::new(),
            },
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Checks the structural invariant on a valid graph: the execution
    /// order covers every node exactly once and never schedules a task
    /// before one of its prerequisites.
    pub fn check_topology(&self) -> CoreResult<()> {
        if !self.metadata.is_valid {
            return Ok(());
        }
        if self.execution_order.len() != self.nodes.len() {
            return Err(CoreError::Internal(format!(
                "graph for {}: execution order covers {} of {} nodes",
                self.project_id,
                self.execution_order.len(),
                self.nodes.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for task_id in &self.execution_order {
            let node = self.nodes.get(task_id).ok_or_else(|| {
                CoreError::Internal(format!(
                    "graph for {}: execution order references unknown task {}",
                    self.project_id, task_id
                ))
            })?;
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep) && !seen.contains(dep) {
                    return Err(CoreError::Internal(format!(
                        "graph for {}: {} scheduled before prerequisite {}",
                        self.project_id, task_id, dep
                    )));
                }
            }
            seen.insert(task_id.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_loop_rejected() {
        let dep = Dependency::new("DEP-T1-T1-001", "T1", "T1");
        assert!(dep.validate().is_err());
    }

    #[test]
    fn valid_edge_accepted() {
        let dep = Dependency::new("DEP-T1-T2-001", "T1", "T2");
        assert!(dep.validate().is_ok());
    }

    #[test]
    fn topology_check_flags_out_of_order_schedule() {
        let mut graph = DependencyGraph::empty("P1");
        graph.nodes.insert(
            "T1".into(),
            GraphNode {
                task_id: "T1".into(),
                title: "first".into(),
                status: TaskStatus::Pending,
                priority: TaskPriority::Medium,
                estimated_hours: 0.1,
                dependencies: vec!["T2".into()],
                dependents: vec![],
                depth: 1,
                critical_path: false,
            },
        );
        graph.nodes.insert(
            "T2".into(),
            GraphNode {
                task_id: "T2".into(),
                title: "second".into(),
                status: TaskStatus::Pending,
                priority: TaskPriority::Medium,
                estimated_hours: 0.1,
                dependencies: vec![],
                dependents: vec!["T1".into()],
                depth: 0,
                critical_path: false,
            },
        );
        graph.execution_order = vec!["T1".into(), "T2".into()];
        assert!(graph.check_topology().is_err());

        graph.execution_order = vec!["T2".into(), "T1".into()];
        assert!(graph.check_topology().is_ok());
    }

    #[test]
    fn dependency_type_serializes_snake_case() {
        let dep = Dependency::new("DEP-T1-T2-001", "T1", "T2");
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains("\"type\":\"blocks\""));
        assert!(json.contains("\"fromTaskId\":\"T1\""));
    }
}
