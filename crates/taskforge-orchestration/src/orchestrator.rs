//! Task-to-agent assignment and heartbeat supervision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, info, warn};

use taskforge_locks::{LockManager, LockMode};
use taskforge_store::StorageEngine;
use taskforge_types::{
    Agent, AgentId, AgentStatus, AtomicTask, CoreError, CoreResult, TaskId, TaskStatus,
};

use crate::transport::{DispatchPayload, TransportRouter};

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Expected heartbeat cadence; agents silent for twice this are
    /// marked offline.
    pub heartbeat_interval: Duration,
    /// Upper bound on the jitter inserted before the single dispatch
    /// retry.
    pub retry_jitter: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            retry_jitter: Duration::from_millis(200),
        }
    }
}

/// The dispatch view of the fleet: which agent runs which task.
///
/// This map is written only here and by the [`crate::IntegrationBridge`];
/// the registry owns identity and capabilities. Task and agent mutations
/// are serialized under write locks taken in the global order
/// (`task` before `agent`).
pub struct AgentOrchestrator {
    store: Arc<StorageEngine>,
    locks: Arc<LockManager>,
    router: TransportRouter,
    agents: DashMap<AgentId, Agent>,
    config: OrchestratorConfig,
}

impl AgentOrchestrator {
    /// Creates an orchestrator over the store, lock table, and transports.
    pub fn new(
        store: Arc<StorageEngine>,
        locks: Arc<LockManager>,
        router: TransportRouter,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            locks,
            router,
            agents: DashMap::new(),
            config,
        }
    }

    /// Admits an agent into the dispatch view. Bridge use only.
    pub(crate) fn admit(&self, agent: Agent) {
        self.agents.insert(agent.agent_id.clone(), agent);
    }

    /// Removes an agent from the dispatch view. Bridge use only.
    pub(crate) fn evict(&self, agent_id: &str) -> Option<Agent> {
        self.agents.remove(agent_id).map(|(_, a)| a)
    }

    /// The orchestrator's copy of an agent.
    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    /// All agents in the dispatch view.
    pub fn all_agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    /// Assigns a ready task to the best capable agent and dispatches it.
    ///
    /// Selection: available agents holding every required capability,
    /// least-loaded first, agent ID breaking ties. Both mutations happen
    /// under `task:<id>` and `agent:<id>` write locks; a dispatch failure
    /// (after one jittered retry) rolls both back.
    pub async fn assign_task(&self, task_id: &str) -> CoreResult<AgentId> {
        let task = self.store.get_task(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::Validation(format!(
                "task {task_id} is {:?}, not pending",
                task.status
            )));
        }

        let agent_id = self.select_agent(&task).ok_or_else(|| {
            CoreError::Conflict(format!(
                "no available agent holds the capabilities for task {task_id}"
            ))
        })?;

        let task_resource = format!("task:{task_id}");
        let agent_resource = format!("agent:{agent_id}");
        let holder = format!("orchestrator:{task_id}");
        let lock_set = self
            .locks
            .acquire_many(
                &[
                    (task_resource.as_str(), LockMode::Write),
                    (agent_resource.as_str(), LockMode::Write),
                ],
                &holder,
                None,
            )
            .await?;

        let result = self.assign_locked(&agent_id, task).await;
        lock_set.release_all();

        match &result {
            Ok(()) => info!(task = %task_id, agent = %agent_id, "task dispatched"),
            Err(e) => warn!(task = %task_id, agent = %agent_id, error = %e, "assignment failed"),
        }
        result.map(|()| agent_id)
    }

    /// The capability-and-load selection rule.
    fn select_agent(&self, task: &AtomicTask) -> Option<AgentId> {
        let required = task.required_capabilities();
        let mut candidates: Vec<Agent> = self
            .agents
            .iter()
            .filter(|a| a.status == AgentStatus::Available)
            .filter(|a| a.has_capabilities(&required))
            .filter(|a| a.current_tasks.len() < a.max_concurrent_tasks)
            .map(|a| a.clone())
            .collect();
        candidates.sort_by(|a, b| {
            a.current_tasks
                .len()
                .cmp(&b.current_tasks.len())
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        candidates.first().map(|a| a.agent_id.clone())
    }

    /// Body of the assignment, run while both write locks are held.
    async fn assign_locked(&self, agent_id: &str, task: AtomicTask) -> CoreResult<()> {
        // Re-read under the lock; the pre-lock snapshot may be stale.
        let mut task = self.store.get_task(&task.task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "task {} was taken concurrently",
                task.task_id
            )));
        }

        let agent_snapshot = {
            let mut agent = self
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?;
            agent.assign_task(task.task_id.clone())?;
            agent.clone()
        };

        let task_id = task.task_id.clone();
        let outcome: CoreResult<()> = async {
            task.transition_to(TaskStatus::InProgress)?;
            task.assigned_agent = Some(agent_id.to_string());
            let task = self.store.update_task(task).await?;
            let payload = DispatchPayload {
                task_id: task.task_id.clone(),
                deadline: task.deadline,
                task,
            };
            self.dispatch_with_retry(&agent_snapshot, &payload).await
        }
        .await;

        if let Err(e) = outcome {
            // Roll both mutations back before surfacing the failure.
            self.rollback_assignment(agent_id, &task_id).await?;
            return Err(e);
        }
        Ok(())
    }

    /// One jittered retry for transport failures, per the propagation
    /// policy; anything else fails straight through.
    async fn dispatch_with_retry(&self, agent: &Agent, payload: &DispatchPayload) -> CoreResult<()> {
        let transport = self.router.for_agent(agent)?;
        match transport.dispatch(agent, payload).await {
            Ok(()) => Ok(()),
            Err(CoreError::TransportFailure(first)) => {
                let jitter = rand::thread_rng()
                    .gen_range(0..=self.config.retry_jitter.as_millis() as u64);
                debug!(agent = %agent.agent_id, %first, jitter, "dispatch failed; retrying once");
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                transport.dispatch(agent, payload).await
            }
            Err(e) => Err(e),
        }
    }

    async fn rollback_assignment(&self, agent_id: &str, task_id: &str) -> CoreResult<()> {
        if let Some(mut agent) = self.agents.get_mut(agent_id) {
            agent.unassign_task(task_id);
        }
        let mut task = self.store.get_task(task_id).await?;
        if task.status == TaskStatus::InProgress {
            task.transition_to(TaskStatus::Pending)?;
            task.assigned_agent = None;
            self.store.update_task(task).await?;
        }
        Ok(())
    }

    /// Records a task outcome reported by an agent: updates the task, the
    /// agent's load, and its rolling performance statistics.
    pub async fn complete_task(
        &self,
        agent_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> CoreResult<()> {
        if !matches!(
            status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
        ) {
            return Err(CoreError::Validation(format!(
                "agents may only report completed, failed, or blocked; got {status:?}"
            )));
        }

        let task_resource = format!("task:{task_id}");
        let holder = format!("orchestrator:{task_id}");
        let guard = self
            .locks
            .write_guard(&task_resource, &holder, None)
            .await?;

        let mut task = self.store.get_task(task_id).await?;
        let started = task.updated_at;
        task.transition_to(status)?;
        task.assigned_agent = None;
        self.store.update_task(task).await?;
        drop(guard);

        if let Some(mut agent) = self.agents.get_mut(agent_id) {
            agent.unassign_task(task_id);
            let perf = &mut agent.performance;
            let elapsed = (Utc::now() - started).num_seconds().max(0) as f64;
            let done = perf.tasks_completed as f64;
            perf.average_completion_time_secs =
                (perf.average_completion_time_secs * done + elapsed) / (done + 1.0);
            perf.tasks_completed += 1;
            let success = if status == TaskStatus::Completed { 1.0 } else { 0.0 };
            perf.success_rate = (perf.success_rate * done + success) / (done + 1.0);
        }
        info!(task = %task_id, agent = %agent_id, ?status, "task outcome recorded");
        Ok(())
    }

    /// Records a heartbeat in the dispatch view.
    pub fn heartbeat(&self, agent_id: &str) -> CoreResult<()> {
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?;
        let now = Utc::now();
        agent.last_heartbeat = now;
        agent.last_seen = now;
        Ok(())
    }

    /// Sweeps the fleet for silent agents: anything quiet for longer than
    /// twice the heartbeat interval goes offline and its in-progress tasks
    /// return to the pending pool.
    ///
    /// Returns the IDs of requeued tasks.
    pub async fn check_heartbeats(&self) -> CoreResult<Vec<TaskId>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.heartbeat_interval * 2)
                .map_err(|e| CoreError::Internal(format!("heartbeat interval overflow: {e}")))?;

        let stale: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|a| {
                !matches!(a.status, AgentStatus::Offline | AgentStatus::Error)
                    && a.last_heartbeat < cutoff
            })
            .map(|a| a.agent_id.clone())
            .collect();

        let mut requeued = Vec::new();
        for agent_id in stale {
            let orphaned: Vec<TaskId> = {
                let Some(mut agent) = self.agents.get_mut(&agent_id) else {
                    continue;
                };
                warn!(agent = %agent_id, "heartbeat lost; marking offline");
                agent.status = AgentStatus::Offline;
                std::mem::take(&mut agent.current_tasks)
            };

            for task_id in orphaned {
                match self.requeue_task(&task_id).await {
                    Ok(()) => requeued.push(task_id),
                    Err(e) => warn!(task = %task_id, error = %e, "failed to requeue task"),
                }
            }
        }
        Ok(requeued)
    }

    async fn requeue_task(&self, task_id: &str) -> CoreResult<()> {
        let resource = format!("task:{task_id}");
        let holder = format!("orchestrator:requeue:{task_id}");
        let guard = self.locks.write_guard(&resource, &holder, None).await?;

        let mut task = self.store.get_task(task_id).await?;
        if task.status == TaskStatus::InProgress {
            task.transition_to(TaskStatus::Pending)?;
            task.assigned_agent = None;
            self.store.update_task(task).await?;
            info!(task = %task_id, "task requeued after agent loss");
        }
        drop(guard);
        Ok(())
    }
}
