//! Persistence round-trip properties.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use taskforge_store::{StorageEngine, StoreConfig};
use taskforge_types::{AtomicTask, TaskPriority, TaskStatus, TaskType};

fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
        Just(TaskPriority::Critical),
    ]
}

fn task_strategy() -> impl Strategy<Value = AtomicTask> {
    (
        "[A-Za-z0-9 ]{1,80}",
        "[A-Za-z0-9 .,]{1,200}",
        0.01f64..8.0,
        priority_strategy(),
        prop::collection::vec("[a-z]{2,12}", 0..5),
    )
        .prop_map(|(title, description, hours, priority, tags)| {
            let mut task = AtomicTask::new("T1", title, description, "P1", "P1-main-epic");
            task.estimated_hours = hours;
            task.priority = priority;
            task.tags = tags;
            task.task_type = TaskType::Development;
            task.acceptance_criteria = vec!["done".to_string()];
            task
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// saveTask followed by loadTask yields a deeply equal task, with and
    /// without compression.
    #[test]
    fn task_round_trip_is_lossless(task in task_strategy(), compress in any::<bool>()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let dir = TempDir::new().unwrap();
            let mut config = StoreConfig::new(dir.path(), dir.path());
            config.compress_tasks = compress;
            let engine = Arc::new(StorageEngine::open(config).await.unwrap());

            engine.create_task(task.clone()).await.unwrap();
            let loaded = engine.get_task(&task.task_id).await.unwrap();
            prop_assert_eq!(&task, &loaded);

            // The same bytes survive an engine restart (no hot cache).
            drop(engine);
            let mut config = StoreConfig::new(dir.path(), dir.path());
            config.compress_tasks = compress;
            let engine = StorageEngine::open(config).await.unwrap();
            let reloaded = engine.get_task(&task.task_id).await.unwrap();
            prop_assert_eq!(&task, &reloaded);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn status_transitions_survive_persistence() {
    let dir = TempDir::new().unwrap();
    let engine = StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
        .await
        .unwrap();

    let mut task = AtomicTask::new("T1", "Persisted", "Stateful task", "P1", "P1-main-epic");
    task.estimated_hours = 0.1;
    engine.create_task(task.clone()).await.unwrap();

    task.transition_to(TaskStatus::InProgress).unwrap();
    engine.update_task(task.clone()).await.unwrap();
    task.transition_to(TaskStatus::Completed).unwrap();
    engine.update_task(task).await.unwrap();

    let loaded = engine.get_task("T1").await.unwrap();
    assert_eq!(loaded.status, TaskStatus::Completed);
}
