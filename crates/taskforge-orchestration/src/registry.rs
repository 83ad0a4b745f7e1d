//! The authoritative agent registry.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use taskforge_types::{Agent, AgentId, AgentStatus, CoreError, CoreResult};

/// Authoritative record of every agent in the fleet: identity,
/// capabilities, transport, and liveness. Task load lives in the
/// orchestrator's view; only the [`crate::IntegrationBridge`] writes both.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<AgentId, Agent>,
    sessions: DashMap<String, AgentId>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent.
    ///
    /// A duplicate `agent_id` is rejected unless the incoming record is an
    /// update, meaning the same ID with a newer `last_seen`.
    pub fn register(&self, agent: Agent) -> CoreResult<()> {
        agent.validate()?;
        if let Some(existing) = self.agents.get(&agent.agent_id) {
            if agent.last_seen <= existing.last_seen {
                return Err(CoreError::Conflict(format!(
                    "agent {} is already registered with a newer record",
                    agent.agent_id
                )));
            }
        }
        if let Some(session_id) = &agent.session_id {
            self.sessions
                .insert(session_id.clone(), agent.agent_id.clone());
        }
        info!(agent = %agent.agent_id, transport = ?agent.transport_type, "agent registered");
        self.agents.insert(agent.agent_id.clone(), agent);
        Ok(())
    }

    /// Removes an agent and its session index entry.
    pub fn deregister(&self, agent_id: &str) -> CoreResult<Agent> {
        let (_, agent) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?;
        if let Some(session_id) = &agent.session_id {
            self.sessions.remove(session_id);
        }
        info!(agent = %agent_id, "agent deregistered");
        Ok(agent)
    }

    /// Looks up an agent by ID.
    pub fn get_agent(&self, agent_id: &str) -> CoreResult<Agent> {
        self.agents
            .get(agent_id)
            .map(|a| a.clone())
            .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))
    }

    /// All registered agents, in unspecified order.
    pub fn all_agents(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    /// Resolves the agent bound to a transport session.
    pub fn agent_by_session(&self, session_id: &str) -> Option<Agent> {
        let agent_id = self.sessions.get(session_id)?.clone();
        self.agents.get(&agent_id).map(|a| a.clone())
    }

    /// Applies a status transition, enforcing the agent state machine.
    /// A transition to `Error` requires an explicit reason.
    pub fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        reason: Option<&str>,
    ) -> CoreResult<()> {
        if status == AgentStatus::Error && reason.map_or(true, str::is_empty) {
            return Err(CoreError::Validation(format!(
                "transition of agent {agent_id} to error requires a reason"
            )));
        }
        let mut agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?;
        if !agent.status.can_transition_to(status) {
            return Err(CoreError::Validation(format!(
                "agent {agent_id}: illegal status transition {:?} -> {status:?}",
                agent.status
            )));
        }
        if let Some(reason) = reason {
            warn!(agent = %agent_id, ?status, reason, "agent status change");
        } else {
            debug!(agent = %agent_id, ?status, "agent status change");
        }
        agent.status = status;
        agent.last_seen = Utc::now();
        Ok(())
    }

    /// Overwrites an agent record in place. Bridge use only.
    pub(crate) fn replace(&self, agent: Agent) {
        self.agents.insert(agent.agent_id.clone(), agent);
    }

    /// Records a heartbeat, refreshing liveness timestamps.
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

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
