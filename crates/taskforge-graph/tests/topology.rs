//! Topological-order properties over randomly shaped DAGs.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use taskforge_graph::{DependencyOps, NewDependency};
use taskforge_store::{IdGenerator, StorageEngine, StoreConfig};
use taskforge_types::{AtomicTask, DependencyType};

async fn seeded_ops(task_count: usize) -> (TempDir, Arc<StorageEngine>, DependencyOps) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
            .await
            .unwrap(),
    );
    for i in 0..task_count {
        let mut task = AtomicTask::new(
            format!("T{i:02}"),
            format!("Task {i}"),
            "generated",
            "P1",
            "P1-main-epic",
        );
        task.estimated_hours = 0.1 + i as f64 * 0.05;
        store.create_task(task).await.unwrap();
    }
    let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
    let ops = DependencyOps::new(store.clone(), ids);
    (dir, store, ops)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Any set of forward edges (from a higher index to a lower one) is
    /// acyclic, so the generated graph must be valid, cover every node,
    /// and schedule prerequisites first.
    #[test]
    fn generated_order_is_a_valid_topological_sort(
        task_count in 3usize..8,
        edge_seeds in prop::collection::vec((0usize..16, 0usize..16), 0..20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let (_dir, _store, ops) = seeded_ops(task_count).await;

            for (a, b) in edge_seeds {
                let from = a % task_count;
                let to = b % task_count;
                // Dependent always has the higher index; no cycles possible.
                if from <= to {
                    continue;
                }
                let _ = ops
                    .create_dependency(NewDependency {
                        from_task_id: format!("T{from:02}"),
                        to_task_id: format!("T{to:02}"),
                        dependency_type: DependencyType::Blocks,
                        description: String::new(),
                        critical: false,
                    })
                    .await;
            }

            let graph = ops.generate_dependency_graph("P1").await.unwrap();
            prop_assert!(graph.metadata.is_valid);
            prop_assert_eq!(graph.execution_order.len(), graph.nodes.len());
            prop_assert!(graph.check_topology().is_ok());
            prop_assert_eq!(graph.statistics.cyclic_dependencies, 0);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn created_dependencies_never_leave_a_cycle_behind() {
    let (_dir, _store, ops) = seeded_ops(4).await;

    let mut accepted = 0;
    for (from, to) in [(1usize, 0usize), (2, 1), (3, 2), (0, 3), (0, 2)] {
        let result = ops
            .create_dependency(NewDependency {
                from_task_id: format!("T{from:02}"),
                to_task_id: format!("T{to:02}"),
                dependency_type: DependencyType::Blocks,
                description: String::new(),
                critical: false,
            })
            .await;
        if result.is_ok() {
            accepted += 1;
        }
    }
    // T00 -> T03 and T00 -> T02 both close cycles and must be refused.
    assert_eq!(accepted, 3);

    let graph = ops.generate_dependency_graph("P1").await.unwrap();
    assert!(graph.metadata.is_valid);
    graph.check_topology().unwrap();
}
