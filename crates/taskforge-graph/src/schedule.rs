//! Execution planning over the dependency DAG.
//!
//! The scheduler is pure: given the same tasks, graph, roster, and policy
//! it produces the same plan (timestamps aside). It schedules every
//! pending task, never placing a task before its prerequisites; the policy
//! decides ordering among simultaneously-ready tasks, greedily, one pick
//! at a time.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use taskforge_types::{
    Agent, AgentId, AtomicTask, DependencyGraph, TaskId, TaskStatus,
};

/// The six scheduling policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Priority descending, then creation time ascending.
    PriorityFirst,
    /// Deadline ascending; tasks without a deadline schedule last.
    EarliestDeadline,
    /// Critical-path members first, then by priority.
    CriticalPath,
    /// Least-loaded capable agent; round-robin among ties.
    ResourceBalanced,
    /// Shortest estimate first.
    ShortestJob,
    /// Weighted blend: 0.4 priority + 0.3 critical path + 0.2 shortest job
    /// + 0.1 resource balance.
    HybridOptimal,
}

/// One planned assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    /// Agent chosen by resource-aware policies; `None` leaves the pick to
    /// the orchestrator.
    pub agent_id: Option<AgentId>,
    /// When the entry was planned.
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
    /// Expected duration in hours.
    pub expected_duration_hours: f64,
}

/// A full execution plan; iteration order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Policy the plan was produced under.
    pub policy: SchedulingPolicy,
    /// Planned entries keyed by task, in execution order.
    pub entries: IndexMap<TaskId, ScheduleEntry>,
}

impl Schedule {
    /// Task IDs in planned execution order.
    pub fn order(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

/// IDs of ready tasks: pending, with every dependency completed.
pub fn ready_task_ids(tasks: &[AtomicTask]) -> Vec<TaskId> {
    let status_by_id: HashMap<&str, TaskStatus> = tasks
        .iter()
        .map(|t| (t.task_id.as_str(), t.status))
        .collect();
    let mut ready: Vec<TaskId> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| {
            t.dependencies.iter().all(|d| {
                status_by_id
                    .get(d.as_str())
                    .map_or(true, |s| *s == TaskStatus::Completed)
            })
        })
        .map(|t| t.task_id.clone())
        .collect();
    ready.sort();
    ready
}

/// Produces execution plans over the DAG.
pub struct TaskScheduler;

impl TaskScheduler {
    /// Plans every pending task under the given policy.
    ///
    /// Planning walks the ready frontier greedily: at each step the policy
    /// scores all currently-eligible tasks, the best is appended (ties
    /// break on task ID), and its completion is assumed for the next step.
    pub fn plan(
        tasks: &[AtomicTask],
        graph: &DependencyGraph,
        agents: &[Agent],
        policy: SchedulingPolicy,
    ) -> Schedule {
        let by_id: HashMap<&str, &AtomicTask> =
            tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
        let critical: HashSet<&str> = graph.critical_path.iter().map(String::as_str).collect();

        let pending: Vec<&AtomicTask> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        let (min_hours, max_hours) = hour_bounds(&pending);

        // Tasks already complete count as satisfied prerequisites.
        let mut satisfied: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.task_id.as_str())
            .collect();
        let mut remaining: Vec<&AtomicTask> = pending.clone();
        let mut loads: HashMap<&str, usize> = agents
            .iter()
            .map(|a| (a.agent_id.as_str(), a.current_tasks.len()))
            .collect();
        let mut entries: IndexMap<TaskId, ScheduleEntry> = IndexMap::new();

        while !remaining.is_empty() {
            let mut eligible: Vec<&AtomicTask> = remaining
                .iter()
                .copied()
                .filter(|t| {
                    t.dependencies
                        .iter()
                        .all(|d| satisfied.contains(d.as_str()) || !by_id.contains_key(d.as_str()))
                })
                .collect();
            if eligible.is_empty() {
                // Cycles or dangling prerequisites: schedule nothing more.
                debug!(
                    unscheduled = remaining.len(),
                    "scheduler halted on unsatisfiable prerequisites"
                );
                break;
            }

            eligible.sort_by(|a, b| {
                score(b, policy, &critical, agents, &loads, min_hours, max_hours)
                    .partial_cmp(&score(
                        a, policy, &critical, agents, &loads, min_hours, max_hours,
                    ))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.task_id.cmp(&b.task_id))
            });
            let chosen = eligible[0];

            let agent_id = match policy {
                SchedulingPolicy::ResourceBalanced | SchedulingPolicy::HybridOptimal => {
                    pick_agent(chosen, agents, &mut loads)
                }
                _ => None,
            };

            entries.insert(
                chosen.task_id.clone(),
                ScheduleEntry {
                    agent_id,
                    scheduled_at: Utc::now(),
                    expected_duration_hours: chosen.estimated_hours,
                },
            );
            satisfied.insert(chosen.task_id.as_str());
            remaining.retain(|t| t.task_id != chosen.task_id);
        }

        Schedule { policy, entries }
    }
}

/// Policy score for one eligible task; higher schedules earlier.
fn score(
    task: &AtomicTask,
    policy: SchedulingPolicy,
    critical: &HashSet<&str>,
    agents: &[Agent],
    loads: &HashMap<&str, usize>,
    min_hours: f64,
    max_hours: f64,
) -> f64 {
    match policy {
        SchedulingPolicy::PriorityFirst => {
            priority_component(task) * 10.0 + recency_component(task)
        }
        SchedulingPolicy::EarliestDeadline => match task.deadline {
            // Earlier deadlines score higher; no deadline scores lowest.
            Some(deadline) => -(deadline.timestamp() as f64),
            None => f64::MIN,
        },
        SchedulingPolicy::CriticalPath => {
            let cp = if critical.contains(task.task_id.as_str()) { 10.0 } else { 0.0 };
            cp + priority_component(task)
        }
        SchedulingPolicy::ShortestJob => -task.estimated_hours,
        SchedulingPolicy::ResourceBalanced => {
            priority_component(task) * 10.0 + recency_component(task)
        }
        SchedulingPolicy::HybridOptimal => {
            let cp = if critical.contains(task.task_id.as_str()) { 1.0 } else { 0.0 };
            0.4 * priority_component(task)
                + 0.3 * cp
                + 0.2 * shortness_component(task, min_hours, max_hours)
                + 0.1 * resource_component(task, agents, loads)
        }
    }
}

fn priority_component(task: &AtomicTask) -> f64 {
    f64::from(task.priority.weight()) / 3.0
}

/// Older tasks score marginally higher, implementing created-at ascending
/// inside one priority band.
fn recency_component(task: &AtomicTask) -> f64 {
    -(task.created_at.timestamp() as f64) / 1e12
}

/// 1.0 for the shortest pending task, 0.0 for the longest.
fn shortness_component(task: &AtomicTask, min_hours: f64, max_hours: f64) -> f64 {
    if (max_hours - min_hours).abs() < f64::EPSILON {
        return 1.0;
    }
    1.0 - (task.estimated_hours - min_hours) / (max_hours - min_hours)
}

/// Fraction of the roster that is capable of the task and has spare
/// capacity right now.
fn resource_component(task: &AtomicTask, agents: &[Agent], loads: &HashMap<&str, usize>) -> f64 {
    if agents.is_empty() {
        return 0.0;
    }
    let required = task.required_capabilities();
    let capable = agents
        .iter()
        .filter(|a| a.has_capabilities(&required))
        .filter(|a| {
            loads
                .get(a.agent_id.as_str())
                .map_or(true, |l| *l < a.max_concurrent_tasks)
        })
        .count();
    capable as f64 / agents.len() as f64
}

/// Least-loaded capable agent with spare capacity; ID order breaks ties,
/// which round-robins as loads accumulate during planning.
fn pick_agent<'a>(
    task: &AtomicTask,
    agents: &'a [Agent],
    loads: &mut HashMap<&'a str, usize>,
) -> Option<AgentId> {
    let required = task.required_capabilities();
    let mut capable: Vec<&Agent> = agents
        .iter()
        .filter(|a| {
            matches!(
                a.status,
                taskforge_types::AgentStatus::Available | taskforge_types::AgentStatus::Busy
            )
        })
        .filter(|a| a.has_capabilities(&required))
        .filter(|a| {
            loads
                .get(a.agent_id.as_str())
                .map_or(true, |l| *l < a.max_concurrent_tasks)
        })
        .collect();
    capable.sort_by(|a, b| {
        let load_a = loads.get(a.agent_id.as_str()).copied().unwrap_or(0);
        let load_b = loads.get(b.agent_id.as_str()).copied().unwrap_or(0);
        load_a.cmp(&load_b).then_with(|| a.agent_id.cmp(&b.agent_id))
    });

    let chosen = capable.first()?;
    *loads.entry(chosen.agent_id.as_str()).or_insert(0) += 1;
    Some(chosen.agent_id.clone())
}

fn hour_bounds(tasks: &[&AtomicTask]) -> (f64, f64) {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for task in tasks {
        min = min.min(task.estimated_hours);
        max = max.max(task.estimated_hours);
    }
    if tasks.is_empty() {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}
