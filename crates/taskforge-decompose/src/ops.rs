//! Task creation with epic auto-resolution.
//!
//! The command gateway hands recognized intents here. Creation resolves a
//! functional-area epic whenever the caller did not name one, keeps the
//! owning epic's task list in sync, and never emits a scaffolding epic.

use std::sync::Arc;

use tracing::info;

use taskforge_store::{IdGenerator, StorageEngine};
use taskforge_types::{
    AtomicTask, CoreResult, EpicId, ProjectId, TaskPriority, TaskType,
};

use crate::epic::{EpicResolver, TaskContext};

/// Parameters for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Owning project.
    pub project_id: ProjectId,
    /// Owning epic; resolved from the task's functional area when absent.
    pub epic_id: Option<EpicId>,
    /// Task priority.
    pub priority: TaskPriority,
    /// Kind of work.
    pub task_type: TaskType,
    /// Effort estimate in hours.
    pub estimated_hours: f64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Who asked for the task.
    pub created_by: String,
}

impl NewTask {
    /// A medium-priority development task with the given identity.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        project_id: impl Into<ProjectId>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            project_id: project_id.into(),
            epic_id: None,
            priority: TaskPriority::Medium,
            task_type: TaskType::Development,
            estimated_hours: 0.0,
            tags: Vec::new(),
            created_by: String::new(),
        }
    }
}

/// Task CRUD above the raw store: ID generation, epic resolution, and
/// epic back-references.
pub struct TaskOps {
    store: Arc<StorageEngine>,
    ids: Arc<IdGenerator>,
    resolver: EpicResolver,
}

impl TaskOps {
    /// Creates task operations over a store.
    pub fn new(store: Arc<StorageEngine>, ids: Arc<IdGenerator>) -> Self {
        Self {
            resolver: EpicResolver::new(store.clone()),
            store,
            ids,
        }
    }

    /// Creates and persists a task.
    ///
    /// When `epic_id` is absent the resolver assigns a functional-area
    /// epic (creating one as needed). The task lands in the epic's
    /// `task_ids` either way.
    pub async fn create_task(&self, request: NewTask) -> CoreResult<AtomicTask> {
        let epic_id = match request.epic_id {
            Some(epic_id) => epic_id,
            None => {
                self.resolver
                    .resolve_epic_context(
                        &request.project_id,
                        &TaskContext {
                            title: request.title.clone(),
                            description: request.description.clone(),
                            tags: request.tags.clone(),
                            functional_area: None,
                        },
                    )
                    .await?
                    .epic_id
            }
        };

        let index = self.store.index_snapshot().await;
        let task_id = self.ids.next_task_id(&index)?;

        let mut task = AtomicTask::new(
            task_id,
            request.title,
            request.description,
            request.project_id,
            epic_id.clone(),
        );
        task.priority = request.priority;
        task.task_type = request.task_type;
        task.estimated_hours = request.estimated_hours;
        task.tags = request.tags;
        task.created_by = request.created_by;
        task.validate()?;

        let task = self.store.create_task(task).await?;

        if let Ok(mut epic) = self.store.get_epic(&epic_id).await {
            if !epic.task_ids.contains(&task.task_id) {
                epic.task_ids.push(task.task_id.clone());
                epic.updated_at = chrono::Utc::now();
                self.store.update_epic(epic).await?;
            }
        }

        info!(task = %task.task_id, epic = %epic_id, "task created");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_store::{is_scaffolding_epic_id, StoreConfig};
    use taskforge_types::TaskStatus;
    use tempfile::TempDir;

    async fn ops() -> (TempDir, Arc<StorageEngine>, TaskOps) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
                .await
                .unwrap(),
        );
        let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
        let ops = TaskOps::new(store.clone(), ids);
        (dir, store, ops)
    }

    #[tokio::test]
    async fn creation_resolves_epic_when_omitted() {
        let (_dir, store, ops) = ops().await;
        let task = ops
            .create_task(NewTask::new(
                "authentication",
                "Add authentication to Web App",
                "PID-WEB-APP-001",
            ))
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.epic_id, "PID-WEB-APP-001-auth-epic");
        assert!(!is_scaffolding_epic_id(&task.epic_id));

        let epic = store.get_epic(&task.epic_id).await.unwrap();
        assert_eq!(epic.task_ids, vec![task.task_id.clone()]);
    }

    #[tokio::test]
    async fn explicit_epic_is_respected() {
        let (_dir, store, ops) = ops().await;
        store
            .create_epic(taskforge_types::Epic::new("P1-data-epic", "P1", "Data"))
            .await
            .unwrap();

        let mut request = NewTask::new("Write migration", "Schema change", "P1");
        request.epic_id = Some("P1-data-epic".into());
        let task = ops.create_task(request).await.unwrap();
        assert_eq!(task.epic_id, "P1-data-epic");
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let (_dir, _store, ops) = ops().await;
        let ops = Arc::new(ops);

        let mut handles = Vec::new();
        for i in 0..8 {
            let ops = ops.clone();
            handles.push(tokio::spawn(async move {
                ops.create_task(NewTask::new(
                    format!("task number {i}"),
                    "concurrent creation",
                    "P1",
                ))
                .await
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let task = handle.await.unwrap().unwrap();
            assert!(ids.insert(task.task_id), "duplicate task id");
        }
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn overlong_title_is_rejected() {
        let (_dir, _store, ops) = ops().await;
        let err = ops
            .create_task(NewTask::new("x".repeat(201), "desc", "P1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), taskforge_types::ErrorKind::Validation);
    }
}
