//! The depth-bounded recursive decomposition engine.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use taskforge_oracle::{ChildDraft, OracleClient, ProjectContext};
use taskforge_store::{IdGenerator, StorageEngine};
use taskforge_types::{
    AtomicTask, CoreError, CoreResult, DecompositionOutcome, TaskStatus,
    ATOMIC_SHORT_CIRCUIT_CONFIDENCE, MAX_DECOMPOSITION_DEPTH,
};

use crate::detect::AtomicDetector;
use crate::epic::{EpicResolver, TaskContext};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct RddConfig {
    /// Maximum recursion depth; tasks at this depth are accepted as-is.
    pub max_depth: u32,
    /// Allowed relative drift between a parent's estimate and the sum of
    /// its children's, before a warning is recorded.
    pub estimate_tolerance: f64,
}

impl Default for RddConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DECOMPOSITION_DEPTH,
            estimate_tolerance: 0.25,
        }
    }
}

/// Result of decomposing one task.
#[derive(Debug, Clone)]
pub struct DecompositionResult {
    /// Whether decomposition ran to completion.
    pub success: bool,
    /// Whether the root itself was atomic (no children produced).
    pub is_atomic: bool,
    /// Depth the call ran at.
    pub depth: u32,
    /// Atomic leaves, in oracle production order. Empty when the root was
    /// atomic.
    pub sub_tasks: Vec<AtomicTask>,
    /// Per-leaf outcomes mirroring `sub_tasks`.
    pub outcomes: Vec<DecompositionOutcome>,
    /// Warnings recorded along the way (depth caps, estimate drift).
    pub warnings: Vec<String>,
}

/// Recursive decomposition: splits a task into atomic leaves, bounded by
/// depth and convergence rules.
pub struct RddEngine {
    client: Arc<OracleClient>,
    detector: AtomicDetector,
    resolver: EpicResolver,
    ids: Arc<IdGenerator>,
    store: Arc<StorageEngine>,
    config: RddConfig,
}

impl RddEngine {
    /// Creates an engine over the oracle, store, and ID source.
    pub fn new(
        client: Arc<OracleClient>,
        store: Arc<StorageEngine>,
        ids: Arc<IdGenerator>,
        config: RddConfig,
    ) -> Self {
        Self {
            detector: AtomicDetector::new(client.clone()),
            resolver: EpicResolver::new(store.clone()),
            client,
            ids,
            store,
            config,
        }
    }

    /// Decomposes a task into atomic leaves.
    ///
    /// At or beyond the depth bound the task is accepted as atomic without
    /// consulting the oracle. An atomic verdict with confidence at or above
    /// the short-circuit threshold ends recursion immediately. Duplicate
    /// `(title, description)` children within one call tree are coalesced.
    pub async fn decompose_task(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<DecompositionResult> {
        let mut seen = HashSet::new();
        fingerprint_insert(&mut seen, task);
        let result = self.decompose_inner(task.clone(), context, 0, &mut seen).await?;
        info!(
            task = %task.task_id,
            atomic = result.is_atomic,
            leaves = result.sub_tasks.len(),
            warnings = result.warnings.len(),
            "decomposition finished"
        );
        Ok(result)
    }

    fn decompose_inner<'a>(
        &'a self,
        task: AtomicTask,
        context: &'a ProjectContext,
        depth: u32,
        seen: &'a mut HashSet<(String, String)>,
    ) -> BoxFuture<'a, CoreResult<DecompositionResult>> {
        async move {
            if depth >= self.config.max_depth {
                // Forced termination: no oracle call at the bound.
                let warning = format!(
                    "task {:?} accepted at depth cap {} without atomicity proof",
                    task.title, depth
                );
                warn!(task = %task.task_id, depth, "depth cap reached");
                return Ok(DecompositionResult {
                    success: true,
                    is_atomic: true,
                    depth,
                    sub_tasks: Vec::new(),
                    outcomes: Vec::new(),
                    warnings: vec![warning],
                });
            }

            let assessment = self.detector.is_atomic(&task, context).await?;
            if assessment.is_atomic && assessment.confidence >= ATOMIC_SHORT_CIRCUIT_CONFIDENCE {
                debug!(task = %task.task_id, depth, "atomic; recursion ends");
                return Ok(DecompositionResult {
                    success: true,
                    is_atomic: true,
                    depth,
                    sub_tasks: Vec::new(),
                    outcomes: Vec::new(),
                    warnings: Vec::new(),
                });
            }

            let plan = self.client.decompose_task(&task, context).await?;
            validate_drafts(&task, &plan.tasks)?;

            let mut sub_tasks = Vec::new();
            let mut outcomes = Vec::new();
            let mut warnings = Vec::new();
            let mut children_hours = 0.0;

            for draft in plan.tasks {
                children_hours += draft.estimated_hours;
                let child = self.materialize_child(&task, &draft, context).await?;
                if !fingerprint_insert(seen, &child) {
                    debug!(title = %child.title, "coalescing duplicate child");
                    continue;
                }

                let child_result = self
                    .decompose_inner(child.clone(), context, depth + 1, seen)
                    .await?;
                if child_result.is_atomic {
                    outcomes.push(DecompositionOutcome {
                        task_id: child.task_id.clone(),
                        depth: depth + 1,
                        atomic: child.satisfies_atomic_heuristic(),
                        warnings: child_result.warnings.clone(),
                    });
                    warnings.extend(child_result.warnings);
                    sub_tasks.push(child);
                } else {
                    warnings.extend(child_result.warnings);
                    outcomes.extend(child_result.outcomes);
                    sub_tasks.extend(child_result.sub_tasks);
                }
            }

            // Soft conservation check: children should roughly add up to
            // the parent.
            if task.estimated_hours > 0.0 {
                let drift = (children_hours - task.estimated_hours).abs() / task.estimated_hours;
                if drift > self.config.estimate_tolerance {
                    warnings.push(format!(
                        "children of {:?} total {children_hours:.2}h against a parent estimate of {:.2}h",
                        task.title, task.estimated_hours
                    ));
                }
            }

            Ok(DecompositionResult {
                success: true,
                is_atomic: false,
                depth,
                sub_tasks,
                outcomes,
                warnings,
            })
        }
        .boxed()
    }

    /// Builds a concrete child task from an oracle draft: resolved epic,
    /// generated ID, inherited project.
    async fn materialize_child(
        &self,
        parent: &AtomicTask,
        draft: &ChildDraft,
        _context: &ProjectContext,
    ) -> CoreResult<AtomicTask> {
        let epic = self
            .resolver
            .resolve_epic_context(
                &parent.project_id,
                &TaskContext {
                    title: draft.title.clone(),
                    description: draft.description.clone(),
                    tags: draft.tags.clone(),
                    functional_area: None,
                },
            )
            .await?;

        let index = self.store.index_snapshot().await;
        let task_id = self.ids.next_task_id(&index)?;

        let mut child = AtomicTask::new(
            task_id,
            draft.title.clone(),
            draft.description.clone(),
            parent.project_id.clone(),
            epic.epic_id,
        );
        child.status = TaskStatus::Pending;
        child.priority = draft.priority;
        child.task_type = parent.task_type;
        child.estimated_hours = draft.estimated_hours;
        child.acceptance_criteria = draft.acceptance_criteria.clone();
        child.tags = draft.tags.clone();
        child.created_by = parent.created_by.clone();
        child.validate()?;
        Ok(child)
    }
}

/// Oracle drafts must come in twos-to-eights with exactly one acceptance
/// criterion each; anything else is a malformed response.
fn validate_drafts(parent: &AtomicTask, drafts: &[ChildDraft]) -> CoreResult<()> {
    if drafts.is_empty() {
        return Err(CoreError::OracleMalformed(format!(
            "decomposition of {} produced no children",
            parent.task_id
        )));
    }
    for draft in drafts {
        if draft.title.trim().is_empty() || draft.description.trim().is_empty() {
            return Err(CoreError::OracleMalformed(format!(
                "decomposition of {} produced a child without title or description",
                parent.task_id
            )));
        }
        if draft.acceptance_criteria.len() != 1 {
            return Err(CoreError::OracleMalformed(format!(
                "child {:?} carries {} acceptance criteria; exactly one is required",
                draft.title,
                draft.acceptance_criteria.len()
            )));
        }
    }
    Ok(())
}

/// Inserts a task's `(title, description)` fingerprint; false when it was
/// already present.
fn fingerprint_insert(seen: &mut HashSet<(String, String)>, task: &AtomicTask) -> bool {
    seen.insert((task.title.clone(), task.description.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_oracle::{
        AtomicAssessment, DecompositionPlan, OracleClientConfig, ScriptedOracle,
    };
    use taskforge_store::StoreConfig;
    use taskforge_types::TaskPriority;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        oracle: Arc<ScriptedOracle>,
        engine: RddEngine,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
                .await
                .unwrap(),
        );
        let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
        let oracle = Arc::new(ScriptedOracle::new());
        let client = Arc::new(OracleClient::with_config(
            oracle.clone(),
            OracleClientConfig {
                max_retries: 0,
                ..Default::default()
            },
        ));
        let engine = RddEngine::new(client, store, ids, RddConfig::default());
        Fixture {
            _dir: dir,
            oracle,
            engine,
        }
    }

    fn root_task() -> AtomicTask {
        let mut t = AtomicTask::new(
            "T-root",
            "Implement Email Notification System",
            "Send transactional email on key events",
            "P1",
            "P1-main-epic",
        );
        t.estimated_hours = 0.2;
        t
    }

    fn verdict(is_atomic: bool, confidence: f64) -> AtomicAssessment {
        AtomicAssessment {
            is_atomic,
            confidence,
            reasoning: "scripted".into(),
            estimated_hours: 0.1,
            complexity_factors: vec![],
            recommendations: vec![],
        }
    }

    fn draft(title: &str, hours: f64) -> ChildDraft {
        ChildDraft {
            title: title.to_string(),
            description: format!("{title} in detail"),
            estimated_hours: hours,
            acceptance_criteria: vec![format!("{title} verified")],
            priority: TaskPriority::Medium,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn two_level_decomposition_converges() {
        let f = fixture().await;
        // Root judged non-atomic, yielding two children; each child atomic
        // at high confidence.
        f.oracle.push_assessment(Ok(verdict(false, 0.9)));
        f.oracle.push_plan(Ok(DecompositionPlan {
            tasks: vec![draft("Render email template", 0.1), draft("Send via SMTP", 0.1)],
        }));
        f.oracle.push_assessment(Ok(verdict(true, 0.98)));
        f.oracle.push_assessment(Ok(verdict(true, 0.98)));

        let result = f
            .engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap();

        assert!(result.success);
        assert!(!result.is_atomic);
        assert_eq!(result.sub_tasks.len(), 2);
        for child in &result.sub_tasks {
            assert_eq!(child.acceptance_criteria.len(), 1);
            assert!(taskforge_types::is_atomic_estimate(child.estimated_hours));
            assert_eq!(child.project_id, "P1");
            assert!(!taskforge_store::is_scaffolding_epic_id(&child.epic_id));
        }
        assert_eq!(f.oracle.remaining(), 0);
    }

    #[tokio::test]
    async fn atomic_root_short_circuits() {
        let f = fixture().await;
        f.oracle.push_assessment(Ok(verdict(true, 0.95)));

        let result = f
            .engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(result.is_atomic);
        assert!(result.sub_tasks.is_empty());
    }

    #[tokio::test]
    async fn depth_cap_skips_the_oracle() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
                .await
                .unwrap(),
        );
        let ids = Arc::new(IdGenerator::new(&store.index_snapshot().await));
        let oracle = Arc::new(ScriptedOracle::new());
        let client = Arc::new(OracleClient::new(oracle.clone()));
        let engine = RddEngine::new(
            client,
            store,
            ids,
            RddConfig {
                max_depth: 0,
                estimate_tolerance: 0.25,
            },
        );

        let result = engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(result.is_atomic);
        assert_eq!(result.warnings.len(), 1);
        // The scripted oracle was never consulted.
        assert_eq!(oracle.remaining(), 0);
    }

    #[tokio::test]
    async fn duplicate_children_are_coalesced() {
        let f = fixture().await;
        f.oracle.push_assessment(Ok(verdict(false, 0.9)));
        f.oracle.push_plan(Ok(DecompositionPlan {
            tasks: vec![draft("Send via SMTP", 0.1), draft("Send via SMTP", 0.1)],
        }));
        f.oracle.push_assessment(Ok(verdict(true, 0.98)));

        let result = f
            .engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert_eq!(result.sub_tasks.len(), 1);
    }

    #[tokio::test]
    async fn estimate_drift_is_a_warning_not_an_error() {
        let f = fixture().await;
        f.oracle.push_assessment(Ok(verdict(false, 0.9)));
        // Children total 1.0h against a 0.2h parent.
        f.oracle.push_plan(Ok(DecompositionPlan {
            tasks: vec![draft("Big child A", 0.5), draft("Big child B", 0.5)],
        }));
        f.oracle.push_assessment(Ok(verdict(true, 0.98)));
        f.oracle.push_assessment(Ok(verdict(true, 0.98)));

        let result = f
            .engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(result.success);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("parent estimate")));
    }

    #[tokio::test]
    async fn child_with_multiple_criteria_is_malformed() {
        let f = fixture().await;
        f.oracle.push_assessment(Ok(verdict(false, 0.9)));
        let mut bad = draft("Over-specified child", 0.1);
        bad.acceptance_criteria.push("second criterion".into());
        f.oracle
            .push_plan(Ok(DecompositionPlan { tasks: vec![bad] }));

        let err = f
            .engine
            .decompose_task(&root_task(), &ProjectContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), taskforge_types::ErrorKind::OracleMalformed);
    }
}
