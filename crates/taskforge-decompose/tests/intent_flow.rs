//! The gateway-to-persistence flow: a recognized intent becomes a stored
//! task with a meaningful epic.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use taskforge_decompose::{NewTask, TaskOps};
use taskforge_oracle::{Intent, IntentAlternative, IntentResult, Oracle, ScriptedOracle};
use taskforge_store::{is_scaffolding_epic_id, IdGenerator, StorageEngine, StoreConfig};
use taskforge_types::TaskStatus;

#[tokio::test]
async fn create_task_intent_persists_a_pending_task() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
            .await
            .unwrap(),
    );
    let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
    let ops = TaskOps::new(store.clone(), ids.clone());

    // The project the utterance names.
    let project_id = ids
        .next_project_id("Web App", &store.index_snapshot().await)
        .unwrap();
    assert_eq!(project_id, "PID-WEB-APP-001");
    store
        .create_project(taskforge_types::Project::new(
            project_id.clone(),
            "Web App",
            "gateway",
        ))
        .await
        .unwrap();

    // The gateway recognizes the utterance through the oracle.
    let oracle = ScriptedOracle::new();
    oracle.push_intent(Ok(IntentResult {
        intent: Intent::CreateTask,
        confidence: 0.85,
        parameters: HashMap::from([
            ("projectName".to_string(), serde_json::json!("Web App")),
            ("title".to_string(), serde_json::json!("authentication")),
        ]),
        alternatives: vec![IntentAlternative {
            intent: Intent::CreateProject,
            confidence: 0.1,
        }],
    }));
    let recognized = oracle
        .recognize_intent("Create a task called authentication for Web App", None)
        .await
        .unwrap();
    assert_eq!(recognized.intent, Intent::CreateTask);

    // The core acts on the recognized parameters.
    let title = recognized.parameters["title"].as_str().unwrap();
    let task = ops
        .create_task(NewTask::new(
            title,
            "Add authentication to the Web App",
            project_id.clone(),
        ))
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.project_id, project_id);
    assert!(store.exists(&task.task_id).await);

    // Epic resolution produced a functional-area epic, never scaffolding.
    assert_eq!(task.epic_id, format!("{project_id}-auth-epic"));
    assert!(!is_scaffolding_epic_id(&task.epic_id));
    assert_ne!(task.epic_id, "default-epic");
    assert_ne!(task.epic_id, "E001");

    // The project record picked up the new epic.
    let project = store.get_project(&project_id).await.unwrap();
    assert!(project.epic_ids.contains(&task.epic_id));
}
