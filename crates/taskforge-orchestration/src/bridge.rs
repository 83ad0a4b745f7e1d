//! Bidirectional consistency between the registry and the orchestrator.
//!
//! The registry is the source of truth for identity and capabilities; the
//! orchestrator for task load and load-derived status. Nothing else may
//! write across the two views. Registration is non-reentrant per agent,
//! and every propagation is an idempotent single delta.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, info, warn};

use taskforge_types::{
    Agent, AgentCapability, AgentId, AgentStatus, CoreError, CoreResult, TaskStatus,
};

use crate::orchestrator::AgentOrchestrator;
use crate::registry::AgentRegistry;

/// Which side observed the change being propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    /// The registry observed it; push toward the orchestrator.
    Registry,
    /// The orchestrator observed it; push toward the registry.
    Orchestrator,
}

/// Mediates all cross-view agent state.
pub struct IntegrationBridge {
    registry: Arc<AgentRegistry>,
    orchestrator: Arc<AgentOrchestrator>,
    in_progress: DashSet<AgentId>,
}

impl IntegrationBridge {
    /// Creates the bridge over both views.
    pub fn new(registry: Arc<AgentRegistry>, orchestrator: Arc<AgentOrchestrator>) -> Self {
        Self {
            registry,
            orchestrator,
            in_progress: DashSet::new(),
        }
    }

    /// Registers a unified agent record on both sides.
    ///
    /// Guarded by a per-agent in-progress set: a re-entrant registration
    /// for the same agent (e.g. a callback fired by one side during the
    /// two-sided write) is a no-op rather than a loop.
    pub fn register_agent(&self, agent: Agent) -> CoreResult<()> {
        let agent_id = agent.agent_id.clone();
        if !self.in_progress.insert(agent_id.clone()) {
            debug!(agent = %agent_id, "re-entrant registration suppressed");
            return Ok(());
        }

        let result = (|| {
            self.registry.register(agent.clone())?;
            self.orchestrator.admit(agent);
            Ok(())
        })();

        self.in_progress.remove(&agent_id);
        if result.is_ok() {
            info!(agent = %agent_id, "agent registered on both views");
        }
        result
    }

    /// Deregisters an agent from both sides.
    pub fn deregister_agent(&self, agent_id: &str) -> CoreResult<()> {
        self.registry.deregister(agent_id)?;
        self.orchestrator.evict(agent_id);
        Ok(())
    }

    /// Maps a free-form registry capability string onto the closed
    /// scheduling enum. Unknown strings collapse to `General`.
    pub fn map_capability(registry_capability: &str) -> AgentCapability {
        AgentCapability::from_registry_str(registry_capability)
    }

    /// Reconciles both views.
    ///
    /// Per agent: identity, capabilities, transport, and metadata come
    /// from the registry; `current_tasks` and load-derived status come
    /// from the orchestrator. Agents known only to the registry are
    /// admitted; agents known only to the orchestrator were never
    /// registered and are evicted.
    pub fn synchronize_agents(&self) -> CoreResult<usize> {
        let mut reconciled = 0usize;

        for registry_agent in self.registry.all_agents() {
            match self.orchestrator.get_agent(&registry_agent.agent_id) {
                Some(orchestrator_agent) => {
                    let mut merged = registry_agent.clone();
                    merged.current_tasks = orchestrator_agent.current_tasks.clone();
                    merged.last_heartbeat = merged
                        .last_heartbeat
                        .max(orchestrator_agent.last_heartbeat);
                    merged.performance = orchestrator_agent.performance.clone();
                    // Load-derived status wins for connected agents; the
                    // registry keeps authority over offline/error.
                    if !matches!(registry_agent.status, AgentStatus::Offline | AgentStatus::Error)
                    {
                        merged.status = orchestrator_agent.status;
                    }
                    if merged != registry_agent || merged != orchestrator_agent {
                        reconciled += 1;
                    }
                    self.registry.replace(merged.clone());
                    self.orchestrator.admit(merged);
                }
                None => {
                    debug!(agent = %registry_agent.agent_id, "admitting registry-only agent");
                    self.orchestrator.admit(registry_agent);
                    reconciled += 1;
                }
            }
        }

        for orchestrator_agent in self.orchestrator.all_agents() {
            if self.registry.get_agent(&orchestrator_agent.agent_id).is_err() {
                warn!(
                    agent = %orchestrator_agent.agent_id,
                    "evicting unregistered agent from the dispatch view"
                );
                self.orchestrator.evict(&orchestrator_agent.agent_id);
                reconciled += 1;
            }
        }

        Ok(reconciled)
    }

    /// Pushes one agent-status delta to the opposite view. Idempotent: a
    /// delta that matches the target's current state is a no-op.
    pub fn propagate_status_change(
        &self,
        agent_id: &str,
        new_status: AgentStatus,
        source: SyncSource,
    ) -> CoreResult<()> {
        match source {
            SyncSource::Registry => {
                let Some(current) = self.orchestrator.get_agent(agent_id) else {
                    return Err(CoreError::NotFound(format!("agent {agent_id}")));
                };
                if current.status == new_status {
                    return Ok(());
                }
                let mut updated = current;
                updated.status = new_status;
                self.orchestrator.admit(updated);
            }
            SyncSource::Orchestrator => {
                let current = self.registry.get_agent(agent_id)?;
                if current.status == new_status {
                    return Ok(());
                }
                let mut updated = current;
                updated.status = new_status;
                self.registry.replace(updated);
            }
        }
        debug!(agent = %agent_id, ?new_status, ?source, "status delta propagated");
        Ok(())
    }

    /// Pushes one task-assignment delta to the opposite view. Idempotent.
    pub fn propagate_task_status_change(
        &self,
        agent_id: &str,
        task_id: &str,
        task_status: TaskStatus,
        source: SyncSource,
    ) -> CoreResult<()> {
        let mut target = match source {
            SyncSource::Registry => self
                .orchestrator
                .get_agent(agent_id)
                .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?,
            SyncSource::Orchestrator => self.registry.get_agent(agent_id)?,
        };

        let should_hold = task_status == TaskStatus::InProgress;
        let holds = target.current_tasks.iter().any(|t| t == task_id);
        if should_hold == holds {
            return Ok(());
        }
        if should_hold {
            target.assign_task(task_id.to_string())?;
        } else {
            target.unassign_task(task_id);
        }

        match source {
            SyncSource::Registry => self.orchestrator.admit(target),
            SyncSource::Orchestrator => self.registry.replace(target),
        }
        debug!(agent = %agent_id, task = %task_id, ?task_status, ?source, "task delta propagated");
        Ok(())
    }
}
