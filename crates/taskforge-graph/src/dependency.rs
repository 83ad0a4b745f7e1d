//! Edge CRUD, cycle checking, and graph derivation.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use taskforge_store::{IdGenerator, StorageEngine};
use taskforge_types::{
    AtomicTask, CoreError, CoreResult, Dependency, DependencyGraph, DependencyType, GraphMetadata,
    GraphNode, GraphStatistics, ProjectId, TaskId, TaskPriority,
};

/// Parameters for a new dependency edge.
#[derive(Debug, Clone)]
pub struct NewDependency {
    /// The dependent task.
    pub from_task_id: TaskId,
    /// The prerequisite task.
    pub to_task_id: TaskId,
    /// Strength of the edge.
    pub dependency_type: DependencyType,
    /// Why the edge exists.
    pub description: String,
    /// Whether the edge participates in critical-path weighting.
    pub critical: bool,
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    /// Advisory.
    Low,
    /// Worth fixing soon.
    Medium,
    /// Likely to break scheduling.
    High,
    /// Breaks the graph contract.
    Critical,
}

/// One finding from project dependency validation.
#[derive(Debug, Clone)]
pub struct ValidationFinding {
    /// How serious the finding is.
    pub severity: ValidationSeverity,
    /// What was found.
    pub message: String,
}

/// Outcome of validating a project's dependencies. Always non-fatal.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Severity-annotated errors.
    pub errors: Vec<ValidationFinding>,
    /// Non-error observations.
    pub warnings: Vec<String>,
    /// Suggested fixes.
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// Whether no error-level findings were recorded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Edge CRUD and graph derivation over the store.
pub struct DependencyOps {
    store: Arc<StorageEngine>,
    ids: Arc<IdGenerator>,
    graph_cache: Mutex<HashMap<ProjectId, DependencyGraph>>,
}

impl DependencyOps {
    /// Creates dependency operations over a store.
    pub fn new(store: Arc<StorageEngine>, ids: Arc<IdGenerator>) -> Self {
        Self {
            store,
            ids,
            graph_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a dependency edge.
    ///
    /// Both endpoints must exist, self-loops are `Validation` errors, and
    /// an edge that would close a cycle is refused with `CycleDetected`
    /// before anything is persisted. On success the edge is stored and both
    /// tasks' back-reference lists are updated.
    pub async fn create_dependency(&self, request: NewDependency) -> CoreResult<Dependency> {
        if request.from_task_id == request.to_task_id {
            return Err(CoreError::Validation(format!(
                "task {} cannot depend on itself",
                request.from_task_id
            )));
        }

        let mut from_task = self.store.get_task(&request.from_task_id).await?;
        let mut to_task = self.store.get_task(&request.to_task_id).await?;

        // Walk the existing depends-on edges from the prerequisite; reaching
        // the dependent means the new edge would close a cycle.
        let tasks = self
            .store
            .list_tasks(Some(&from_task.project_id), None)
            .await?;
        let dependency_lists: HashMap<&str, &Vec<TaskId>> = tasks
            .iter()
            .map(|t| (t.task_id.as_str(), &t.dependencies))
            .collect();
        if reaches(&dependency_lists, &request.to_task_id, &request.from_task_id) {
            return Err(CoreError::CycleDetected(format!(
                "adding {} -> {} would close a dependency cycle",
                request.from_task_id, request.to_task_id
            )));
        }

        let index = self.store.index_snapshot().await;
        let id = self
            .ids
            .next_dependency_id(&request.from_task_id, &request.to_task_id, &index)?;

        let mut dependency = Dependency::new(id, &request.from_task_id, &request.to_task_id);
        dependency.dependency_type = request.dependency_type;
        dependency.description = request.description;
        dependency.critical = request.critical;
        let dependency = self.store.create_dependency(dependency).await?;

        if !from_task.dependencies.contains(&request.to_task_id) {
            from_task.dependencies.push(request.to_task_id.clone());
            self.store.update_task(from_task).await?;
        }
        if !to_task.dependents.contains(&request.from_task_id) {
            to_task.dependents.push(request.from_task_id.clone());
            self.store.update_task(to_task).await?;
        }

        self.invalidate_cache(&dependency_project(&dependency, &tasks)).await;
        info!(
            dependency = %dependency.dependency_id,
            from = %dependency.from_task_id,
            to = %dependency.to_task_id,
            "dependency created"
        );
        Ok(dependency)
    }

    /// Deletes a dependency edge, reversing both back-reference updates.
    pub async fn delete_dependency(&self, dependency_id: &str) -> CoreResult<()> {
        let dependency = self.store.get_dependency(dependency_id).await?;

        if let Ok(mut from_task) = self.store.get_task(&dependency.from_task_id).await {
            from_task.dependencies.retain(|t| t != &dependency.to_task_id);
            let project = from_task.project_id.clone();
            self.store.update_task(from_task).await?;
            self.invalidate_cache(&project).await;
        }
        if let Ok(mut to_task) = self.store.get_task(&dependency.to_task_id).await {
            to_task.dependents.retain(|t| t != &dependency.from_task_id);
            self.store.update_task(to_task).await?;
        }

        self.store.delete_dependency(dependency_id).await?;
        debug!(dependency = %dependency_id, "dependency deleted");
        Ok(())
    }

    /// Returns the cached graph for a project, deriving it if necessary.
    pub async fn dependency_graph(&self, project_id: &str) -> CoreResult<DependencyGraph> {
        if let Some(graph) = self.graph_cache.lock().await.get(project_id) {
            return Ok(graph.clone());
        }
        self.generate_dependency_graph(project_id).await
    }

    /// Derives, persists, and caches the dependency graph for a project.
    pub async fn generate_dependency_graph(&self, project_id: &str) -> CoreResult<DependencyGraph> {
        let tasks = self.store.list_tasks(Some(project_id), None).await?;
        let task_ids: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        let edges: Vec<Dependency> = self
            .store
            .list_dependencies()
            .await?
            .into_iter()
            .filter(|d| {
                task_ids.contains(d.from_task_id.as_str())
                    && task_ids.contains(d.to_task_id.as_str())
            })
            .collect();

        let graph = build_graph(project_id, &tasks, edges);
        self.store.save_dependency_graph(project_id, &graph).await?;
        self.graph_cache
            .lock()
            .await
            .insert(project_id.to_string(), graph.clone());

        info!(
            project = project_id,
            tasks = graph.statistics.total_tasks,
            edges = graph.statistics.total_dependencies,
            valid = graph.metadata.is_valid,
            "dependency graph generated"
        );
        Ok(graph)
    }

    /// Drops the cached graph for a project; callers do this after any task
    /// mutation that affects ordering.
    pub async fn invalidate_cache(&self, project_id: &str) {
        self.graph_cache.lock().await.remove(project_id);
    }

    /// Severity-annotated, never-fatal review of a project's dependencies.
    pub async fn validate_project_dependencies(
        &self,
        project_id: &str,
    ) -> CoreResult<ValidationReport> {
        let tasks = self.store.list_tasks(Some(project_id), None).await?;
        let task_ids: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        let mut report = ValidationReport::default();

        let graph = self.dependency_graph(project_id).await?;
        if !graph.metadata.is_valid {
            report.errors.push(ValidationFinding {
                severity: ValidationSeverity::Critical,
                message: format!(
                    "{} task(s) are trapped in dependency cycles",
                    graph.statistics.cyclic_dependencies
                ),
            });
            report
                .suggestions
                .push("remove or invert one edge in each cycle".into());
        }

        for task in &tasks {
            for dep in &task.dependencies {
                if !task_ids.contains(dep.as_str()) {
                    report.errors.push(ValidationFinding {
                        severity: ValidationSeverity::High,
                        message: format!(
                            "task {} depends on {} which does not exist in project {}",
                            task.task_id, dep, project_id
                        ),
                    });
                }
            }
            let unique: HashSet<&str> = task.dependencies.iter().map(String::as_str).collect();
            if unique.len() != task.dependencies.len() {
                report.errors.push(ValidationFinding {
                    severity: ValidationSeverity::Medium,
                    message: format!("task {} lists duplicate dependencies", task.task_id),
                });
            }
        }

        if graph.statistics.orphaned_tasks > 0 {
            report.warnings.push(format!(
                "{} task(s) have no dependencies or dependents",
                graph.statistics.orphaned_tasks
            ));
            report
                .suggestions
                .push("link orphaned tasks into an epic-level ordering if one exists".into());
        }

        Ok(report)
    }
}

/// Project a dependency belongs to, resolved through its endpoints.
fn dependency_project(dependency: &Dependency, tasks: &[AtomicTask]) -> String {
    tasks
        .iter()
        .find(|t| t.task_id == dependency.from_task_id)
        .map(|t| t.project_id.clone())
        .unwrap_or_default()
}

/// DFS over depends-on lists: is `target` reachable from `start`?
fn reaches(
    dependency_lists: &HashMap<&str, &Vec<TaskId>>,
    start: &str,
    target: &str,
) -> bool {
    let mut stack = vec![start];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(deps) = dependency_lists.get(current) {
            for dep in deps.iter() {
                stack.push(dep.as_str());
            }
        }
    }
    false
}

/// Candidate ordering for the Kahn queue: priority desc, then created_at
/// asc, then lexicographic task ID.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    priority: TaskPriority,
    created_at: DateTime<Utc>,
    task_id: TaskId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the derived graph: nodes, Kahn order, depths, critical path,
/// statistics.
fn build_graph(project_id: &str, tasks: &[AtomicTask], edges: Vec<Dependency>) -> DependencyGraph {
    let in_project: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    let by_id: HashMap<&str, &AtomicTask> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();

    let mut nodes: IndexMap<TaskId, GraphNode> = IndexMap::new();
    let mut sorted_tasks: Vec<&AtomicTask> = tasks.iter().collect();
    sorted_tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    for task in &sorted_tasks {
        let dependencies: Vec<TaskId> = task
            .dependencies
            .iter()
            .filter(|d| in_project.contains(d.as_str()))
            .cloned()
            .collect();
        let dependents: Vec<TaskId> = task
            .dependents
            .iter()
            .filter(|d| in_project.contains(d.as_str()))
            .cloned()
            .collect();
        nodes.insert(
            task.task_id.clone(),
            GraphNode {
                task_id: task.task_id.clone(),
                title: task.title.clone(),
                status: task.status,
                priority: task.priority,
                estimated_hours: task.estimated_hours,
                dependencies,
                dependents,
                depth: 0,
                critical_path: false,
            },
        );
    }

    // Kahn's algorithm over the depends-on relation: zero in-degree means
    // no outstanding prerequisites.
    let mut in_degree: HashMap<TaskId, usize> = nodes
        .values()
        .map(|n| (n.task_id.clone(), n.dependencies.len()))
        .collect();
    let mut heap: BinaryHeap<Candidate> = nodes
        .values()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| candidate(by_id[n.task_id.as_str()]))
        .collect();

    let mut execution_order: Vec<TaskId> = Vec::with_capacity(nodes.len());
    let mut depths: HashMap<TaskId, usize> = HashMap::new();
    while let Some(next) = heap.pop() {
        let depth = nodes[next.task_id.as_str()]
            .dependencies
            .iter()
            .filter_map(|d| depths.get(d))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depths.insert(next.task_id.clone(), depth);
        execution_order.push(next.task_id.clone());

        for dependent in nodes[next.task_id.as_str()].dependents.clone() {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                if *degree > 0 {
                    *degree -= 1;
                    if *degree == 0 {
                        heap.push(candidate(by_id[dependent.as_str()]));
                    }
                }
            }
        }
    }

    let cyclic = nodes.len() - execution_order.len();
    if cyclic > 0 {
        warn!(project = project_id, cyclic, "dependency graph contains cycles");
    }

    for (task_id, depth) in &depths {
        if let Some(node) = nodes.get_mut(task_id) {
            node.depth = *depth;
        }
    }

    // Simplified additive critical path: longest cumulative-hours chain,
    // computed in topological order.
    let mut path_hours: HashMap<TaskId, f64> = HashMap::new();
    let mut predecessor: HashMap<TaskId, TaskId> = HashMap::new();
    for task_id in &execution_order {
        let node = &nodes[task_id.as_str()];
        let mut best = node.estimated_hours;
        let mut pred: Option<TaskId> = None;
        for dep in &node.dependencies {
            if let Some(dep_total) = path_hours.get(dep) {
                let through = dep_total + node.estimated_hours;
                if through > best {
                    best = through;
                    pred = Some(dep.clone());
                }
            }
        }
        path_hours.insert(task_id.clone(), best);
        if let Some(p) = pred {
            predecessor.insert(task_id.clone(), p);
        }
    }

    let mut critical_path: Vec<TaskId> = Vec::new();
    if let Some((end, _)) = path_hours.iter().max_by(|a, b| {
        a.1.partial_cmp(b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.0.cmp(a.0))
    }) {
        let mut current = end.clone();
        critical_path.push(current.clone());
        while let Some(prev) = predecessor.get(&current) {
            critical_path.push(prev.clone());
            current = prev.clone();
        }
        critical_path.reverse();
    }
    for task_id in &critical_path {
        if let Some(node) = nodes.get_mut(task_id.as_str()) {
            node.critical_path = true;
        }
    }

    let orphaned = nodes
        .values()
        .filter(|n| n.dependencies.is_empty() && n.dependents.is_empty())
        .count();
    let max_depth = depths.values().copied().max().unwrap_or(0);
    let is_valid = cyclic == 0;

    let mut validation_errors = Vec::new();
    if !is_valid {
        validation_errors.push(format!("{cyclic} task(s) participate in dependency cycles"));
    }

    let statistics = GraphStatistics {
        total_tasks: nodes.len(),
        total_dependencies: edges.len(),
        max_depth,
        cyclic_dependencies: cyclic,
        orphaned_tasks: orphaned,
    };

    DependencyGraph {
        project_id: project_id.to_string(),
        nodes,
        edges,
        execution_order: if is_valid { execution_order } else { Vec::new() },
        critical_path: if is_valid { critical_path } else { Vec::new() },
        statistics,
        metadata: GraphMetadata {
            generated_at: Utc::now(),
            is_valid,
            validation_errors,
        },
        format_version: taskforge_types::FORMAT_VERSION.to_string(),
    }
}

fn candidate(task: &AtomicTask) -> Candidate {
    Candidate {
        priority: task.priority,
        created_at: task.created_at,
        task_id: task.task_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_store::StoreConfig;
    use taskforge_types::{ErrorKind, TaskStatus};
    use tempfile::TempDir;

    async fn ops() -> (TempDir, Arc<StorageEngine>, DependencyOps) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
                .await
                .unwrap(),
        );
        let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
        let ops = DependencyOps::new(store.clone(), ids);
        (dir, store, ops)
    }

    async fn seed_task(store: &StorageEngine, id: &str, hours: f64, priority: TaskPriority) {
        let mut task = AtomicTask::new(id, format!("Task {id}"), "work", "P1", "P1-main-epic");
        task.estimated_hours = hours;
        task.priority = priority;
        store.create_task(task).await.unwrap();
    }

    fn request(from: &str, to: &str) -> NewDependency {
        NewDependency {
            from_task_id: from.into(),
            to_task_id: to.into(),
            dependency_type: DependencyType::Blocks,
            description: String::new(),
            critical: false,
        }
    }

    #[tokio::test]
    async fn create_updates_both_back_references() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        seed_task(&store, "T2", 0.1, TaskPriority::Medium).await;

        ops.create_dependency(request("T1", "T2")).await.unwrap();

        let from = store.get_task("T1").await.unwrap();
        let to = store.get_task("T2").await.unwrap();
        assert_eq!(from.dependencies, vec!["T2"]);
        assert_eq!(to.dependents, vec!["T1"]);
    }

    #[tokio::test]
    async fn self_loop_is_validation_error() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        let err = ops.create_dependency(request("T1", "T1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cycle_closing_edge_rejected_without_state_change() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "TA", 0.1, TaskPriority::Medium).await;
        seed_task(&store, "TB", 0.1, TaskPriority::Medium).await;
        ops.create_dependency(request("TA", "TB")).await.unwrap();

        let err = ops.create_dependency(request("TB", "TA")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        let message = err.to_string();
        assert!(message.contains("TA") && message.contains("TB"));

        // No dangling edge or back-reference was written.
        let a = store.get_task("TA").await.unwrap();
        let b = store.get_task("TB").await.unwrap();
        assert_eq!(b.dependencies, Vec::<String>::new());
        assert_eq!(a.dependents, Vec::<String>::new());
        assert_eq!(store.list_dependencies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reverses_back_references() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        seed_task(&store, "T2", 0.1, TaskPriority::Medium).await;
        let dep = ops.create_dependency(request("T1", "T2")).await.unwrap();

        ops.delete_dependency(&dep.dependency_id).await.unwrap();
        let from = store.get_task("T1").await.unwrap();
        let to = store.get_task("T2").await.unwrap();
        assert!(from.dependencies.is_empty());
        assert!(to.dependents.is_empty());
    }

    #[tokio::test]
    async fn topological_order_covers_all_nodes() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 3.0, TaskPriority::Critical).await;
        seed_task(&store, "T2", 2.0, TaskPriority::High).await;
        seed_task(&store, "T3", 1.0, TaskPriority::Low).await;
        ops.create_dependency(request("T2", "T1")).await.unwrap();

        let graph = ops.generate_dependency_graph("P1").await.unwrap();
        assert!(graph.metadata.is_valid);
        assert_eq!(graph.execution_order.len(), 3);
        graph.check_topology().unwrap();

        let t1 = graph.execution_order.iter().position(|t| t == "T1").unwrap();
        let t2 = graph.execution_order.iter().position(|t| t == "T2").unwrap();
        assert!(t1 < t2);
    }

    #[tokio::test]
    async fn tie_break_prefers_priority_then_id() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "TA", 1.0, TaskPriority::Low).await;
        seed_task(&store, "TB", 1.0, TaskPriority::Critical).await;

        let graph = ops.generate_dependency_graph("P1").await.unwrap();
        assert_eq!(graph.execution_order[0], "TB");
    }

    #[tokio::test]
    async fn critical_path_follows_cumulative_hours() {
        let (_dir, store, ops) = ops().await;
        // Chain: T3 -> T2 -> T1 (T3 depends on T2 depends on T1), plus a
        // heavy standalone T4.
        seed_task(&store, "T1", 1.0, TaskPriority::Medium).await;
        seed_task(&store, "T2", 2.0, TaskPriority::Medium).await;
        seed_task(&store, "T3", 1.5, TaskPriority::Medium).await;
        seed_task(&store, "T4", 4.0, TaskPriority::Medium).await;
        ops.create_dependency(request("T2", "T1")).await.unwrap();
        ops.create_dependency(request("T3", "T2")).await.unwrap();

        let graph = ops.generate_dependency_graph("P1").await.unwrap();
        // Chain totals 4.5h, beating the 4h standalone task.
        assert_eq!(graph.critical_path, vec!["T1", "T2", "T3"]);
        assert!(graph.nodes["T2"].critical_path);
        assert!(!graph.nodes["T4"].critical_path);
        assert_eq!(graph.statistics.max_depth, 2);
    }

    #[tokio::test]
    async fn cycle_marks_graph_invalid() {
        let (_dir, store, ops) = ops().await;
        // Write the cycle through the store directly; DependencyOps would
        // have refused it.
        let mut t1 = AtomicTask::new("T1", "Task T1", "work", "P1", "P1-main-epic");
        t1.dependencies = vec!["T2".into()];
        t1.dependents = vec!["T2".into()];
        let mut t2 = AtomicTask::new("T2", "Task T2", "work", "P1", "P1-main-epic");
        t2.dependencies = vec!["T1".into()];
        t2.dependents = vec!["T1".into()];
        store.create_task(t1).await.unwrap();
        store.create_task(t2).await.unwrap();

        let graph = ops.generate_dependency_graph("P1").await.unwrap();
        assert!(!graph.metadata.is_valid);
        assert_eq!(graph.statistics.cyclic_dependencies, 2);
        assert!(graph.execution_order.is_empty());
    }

    #[tokio::test]
    async fn validation_reports_dangling_reference() {
        let (_dir, store, ops) = ops().await;
        let mut t1 = AtomicTask::new("T1", "Task T1", "work", "P1", "P1-main-epic");
        t1.dependencies = vec!["T404".into()];
        store.create_task(t1).await.unwrap();

        let report = ops.validate_project_dependencies("P1").await.unwrap();
        assert!(!report.is_clean());
        assert!(report
            .errors
            .iter()
            .any(|f| f.severity == ValidationSeverity::High && f.message.contains("T404")));
    }

    #[tokio::test]
    async fn validation_notes_orphans_as_warnings() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        let report = ops.validate_project_dependencies("P1").await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn graph_cache_invalidated_on_edge_change() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        seed_task(&store, "T2", 0.1, TaskPriority::Medium).await;

        let before = ops.dependency_graph("P1").await.unwrap();
        assert_eq!(before.statistics.total_dependencies, 0);

        ops.create_dependency(request("T1", "T2")).await.unwrap();
        let after = ops.dependency_graph("P1").await.unwrap();
        assert_eq!(after.statistics.total_dependencies, 1);
    }

    #[tokio::test]
    async fn completed_prerequisites_still_order_before_dependents() {
        let (_dir, store, ops) = ops().await;
        seed_task(&store, "T1", 0.1, TaskPriority::Medium).await;
        seed_task(&store, "T2", 0.1, TaskPriority::Medium).await;
        ops.create_dependency(request("T2", "T1")).await.unwrap();

        let mut done = store.get_task("T1").await.unwrap();
        done.transition_to(TaskStatus::InProgress).unwrap();
        done.transition_to(TaskStatus::Completed).unwrap();
        store.update_task(done).await.unwrap();
        ops.invalidate_cache("P1").await;

        let graph = ops.dependency_graph("P1").await.unwrap();
        graph.check_topology().unwrap();
    }
}
