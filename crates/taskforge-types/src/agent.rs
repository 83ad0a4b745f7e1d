//! Agent entity, capability enum, and the agent status machine.
//!
//! Scheduling decisions use the closed [`AgentCapability`] enum; free-form
//! registry strings are mapped through [`AgentCapability::from_registry_str`]
//! at the bridge, with unknown strings collapsing to `General`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::{AgentId, TaskId, FORMAT_VERSION};

/// Closed capability set used for scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    /// General code generation.
    General,
    /// Frontend work.
    Frontend,
    /// Backend work.
    Backend,
    /// Database work.
    Database,
    /// Test authoring and execution.
    Testing,
    /// Deployment and infrastructure.
    Devops,
    /// Documentation work.
    Documentation,
    /// Behavior-preserving restructuring.
    Refactoring,
    /// Defect diagnosis.
    Debugging,
}

impl AgentCapability {
    /// Maps a registry capability string onto the closed enum.
    ///
    /// The table is stable: `code_generation → general`, `devops` and
    /// `deployment` both map to `devops`, and anything unknown collapses to
    /// `general`.
    pub fn from_registry_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "code_generation" | "general" => AgentCapability::General,
            "frontend" => AgentCapability::Frontend,
            "backend" => AgentCapability::Backend,
            "database" => AgentCapability::Database,
            "testing" => AgentCapability::Testing,
            "devops" | "deployment" => AgentCapability::Devops,
            "documentation" => AgentCapability::Documentation,
            "refactoring" => AgentCapability::Refactoring,
            "debugging" => AgentCapability::Debugging,
            _ => AgentCapability::General,
        }
    }
}

/// Connectivity state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered and reachable, not yet accepting work.
    Online,
    /// Accepting work; below its concurrency cap.
    Available,
    /// At its concurrency cap.
    Busy,
    /// Unreachable; its tasks are re-queued.
    Offline,
    /// Faulted with an explicit reason.
    Error,
}

impl AgentStatus {
    /// Validates a status transition.
    ///
    /// The machine is `offline → online → available ⇄ busy → offline |
    /// error`; `error` always requires an explicit reason at the call site
    /// and recovers only through `offline`.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, next) {
            (Offline, Online) => true,
            (Online, Available) | (Online, Offline) => true,
            (Available, Busy) | (Busy, Available) => true,
            (Available, Offline) | (Busy, Offline) => true,
            (Available, Error) | (Busy, Error) | (Online, Error) => true,
            (Error, Offline) => true,
            _ => false,
        }
    }
}

/// Wire transport an agent is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Line-delimited JSON over a child process's stdin/stdout.
    Stdio,
    /// Server-sent events channel with POSTed requests.
    Sse,
    /// Bidirectional JSON envelopes over WebSocket frames.
    Websocket,
    /// Authenticated POST with polling for agents without a push channel.
    Http,
}

/// Rolling execution statistics for an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    /// Tasks completed over the agent's lifetime.
    pub tasks_completed: u64,
    /// Mean completion time in seconds.
    pub average_completion_time_secs: f64,
    /// Fraction of dispatched tasks that completed successfully.
    pub success_rate: f64,
}

/// Free-form agent metadata carried alongside the closed capability set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    /// Agent software version.
    pub version: String,
    /// Protocols the agent claims to speak.
    pub supported_protocols: Vec<String>,
    /// Arbitrary key/value preferences.
    pub preferences: HashMap<String, String>,
    /// Endpoint for the HTTP transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_endpoint: Option<String>,
    /// Bearer token for the HTTP transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_auth_token: Option<String>,
    /// Polling cadence in milliseconds for pull-based transports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_ms: Option<u64>,
}

/// An executor registered with the fleet.
///
/// Invariant: `status == Busy` exactly when `current_tasks` is at
/// `max_concurrent_tasks`; `Available` implies spare capacity. Both are
/// maintained through [`Agent::recompute_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique agent identifier.
    pub agent_id: AgentId,
    /// Closed capabilities used for matching.
    pub capabilities: Vec<AgentCapability>,
    /// Free-form capability tags for documentation and search.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Current connectivity status.
    pub status: AgentStatus,
    /// Transport the agent is dispatched over.
    pub transport_type: TransportType,
    /// Transport-level session identifier, when connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Concurrency cap.
    pub max_concurrent_tasks: usize,
    /// Tasks currently assigned. Never exceeds the cap.
    pub current_tasks: Vec<TaskId>,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
    /// Last time any traffic was seen from the agent.
    pub last_seen: DateTime<Utc>,
    /// Last heartbeat receipt.
    pub last_heartbeat: DateTime<Utc>,
    /// Rolling execution statistics.
    pub performance: AgentPerformance,
    /// Free-form metadata.
    pub metadata: AgentMetadata,
    /// Persistence format version.
    pub format_version: String,
}

impl Agent {
    /// Creates an online agent with the given identity and capacity.
    pub fn new(
        agent_id: impl Into<AgentId>,
        capabilities: Vec<AgentCapability>,
        transport_type: TransportType,
        max_concurrent_tasks: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            capabilities,
            tags: Vec::new(),
            status: AgentStatus::Online,
            transport_type,
            session_id: None,
            max_concurrent_tasks,
            current_tasks: Vec::new(),
            registered_at: now,
            last_seen: now,
            last_heartbeat: now,
            performance: AgentPerformance::default(),
            metadata: AgentMetadata::default(),
            format_version: FORMAT_VERSION.to_string(),
        }
    }

    /// Validates the agent record.
    pub fn validate(&self) -> CoreResult<()> {
        if self.agent_id.trim().is_empty() {
            return Err(CoreError::Validation("agent id cannot be empty".into()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(CoreError::Validation(format!(
                "agent {} has a zero concurrency cap",
                self.agent_id
            )));
        }
        if self.current_tasks.len() > self.max_concurrent_tasks {
            return Err(CoreError::Validation(format!(
                "agent {} holds {} tasks over its cap of {}",
                self.agent_id,
                self.current_tasks.len(),
                self.max_concurrent_tasks
            )));
        }
        Ok(())
    }

    /// Whether the agent holds every required capability.
    pub fn has_capabilities(&self, required: &[AgentCapability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Whether the agent can accept another task right now.
    pub fn can_accept_task(&self) -> bool {
        self.status == AgentStatus::Available
            && self.current_tasks.len() < self.max_concurrent_tasks
    }

    /// Re-derives `status` from the current load, maintaining the
    /// busy-at-capacity invariant. Only meaningful for connected agents.
    pub fn recompute_status(&mut self) {
        if matches!(self.status, AgentStatus::Offline | AgentStatus::Error) {
            return;
        }
        self.status = if self.current_tasks.len() >= self.max_concurrent_tasks {
            AgentStatus::Busy
        } else {
            AgentStatus::Available
        };
    }

    /// Assigns a task, enforcing the capacity invariant.
    pub fn assign_task(&mut self, task_id: TaskId) -> CoreResult<()> {
        if self.current_tasks.len() >= self.max_concurrent_tasks {
            return Err(CoreError::Conflict(format!(
                "agent {} is at its concurrency cap",
                self.agent_id
            )));
        }
        if self.current_tasks.contains(&task_id) {
            return Err(CoreError::Conflict(format!(
                "task {} already assigned to agent {}",
                task_id, self.agent_id
            )));
        }
        self.current_tasks.push(task_id);
        self.recompute_status();
        Ok(())
    }

    /// Removes a task assignment, if present.
    pub fn unassign_task(&mut self, task_id: &str) {
        self.current_tasks.retain(|t| t != task_id);
        self.recompute_status();
    }
}
