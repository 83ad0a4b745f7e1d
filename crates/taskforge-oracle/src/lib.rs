#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-oracle** – The LLM oracle seam for the Taskforge core.
//!
//! The core consumes three RPC-like calls (intent recognition, atomic
//! detection, task decomposition) behind the [`Oracle`] trait. Production
//! wires a real LLM client in from outside; tests use the deterministic
//! [`ScriptedOracle`]. [`OracleClient`] adds the retry policy shared by all
//! call sites: per-call timeout, exponential back-off with jitter, and
//! retries only for `OracleUnavailable`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskforge_types::{AtomicTask, CoreError, CoreResult, TaskPriority};

pub mod salvage;
pub mod scripted;

pub use salvage::{parse_with_salvage, salvage_json, SALVAGE_THRESHOLD};
pub use scripted::ScriptedOracle;

/// Default per-call timeout.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget for unavailable oracles.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Closed set of intents the gateway can hand the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Create a new project.
    CreateProject,
    /// Create a new task.
    CreateTask,
    /// List projects.
    ListProjects,
    /// List tasks.
    ListTasks,
    /// Update a project.
    UpdateProject,
    /// Report status.
    CheckStatus,
    /// Execute a task.
    RunTask,
    /// Parse a PRD artifact.
    ParsePrd,
    /// Parse a task-list artifact.
    ParseTasks,
    /// Import an external artifact.
    ImportArtifact,
    /// Could not be classified.
    Unknown,
}

/// A lower-confidence alternative reading of an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAlternative {
    /// Alternative intent.
    pub intent: Intent,
    /// Confidence in the alternative, 0–1.
    pub confidence: f64,
}

/// Result of intent recognition over an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    /// Best-guess intent.
    pub intent: Intent,
    /// Confidence in the best guess, 0–1.
    pub confidence: f64,
    /// Extracted parameters (project name, title, ...).
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Lower-confidence alternatives.
    #[serde(default)]
    pub alternatives: Vec<IntentAlternative>,
}

/// The oracle's verdict on whether a task is atomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicAssessment {
    /// Whether the task needs no further decomposition.
    pub is_atomic: bool,
    /// Confidence in the verdict, 0–1.
    pub confidence: f64,
    /// Free-text reasoning.
    pub reasoning: String,
    /// Oracle's own effort estimate in hours.
    pub estimated_hours: f64,
    /// Factors contributing to complexity.
    #[serde(default)]
    pub complexity_factors: Vec<String>,
    /// Suggested follow-ups.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// One proposed child task in a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildDraft {
    /// Child title.
    pub title: String,
    /// Child description.
    pub description: String,
    /// Effort estimate in hours.
    pub estimated_hours: f64,
    /// Acceptance criteria; exactly one for an atomic child.
    pub acceptance_criteria: Vec<String>,
    /// Child priority.
    pub priority: TaskPriority,
    /// Optional tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A decomposition proposal: the candidate children of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    /// Proposed children, in the order the oracle produced them.
    pub tasks: Vec<ChildDraft>,
}

/// Project context handed to the oracle alongside a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    /// Project identifier.
    pub project_id: String,
    /// Project description.
    pub description: String,
    /// Languages and frameworks in play.
    #[serde(default)]
    pub tech: Vec<String>,
}

/// The three RPC-like calls the core consumes from the LLM layer.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Classifies a natural-language utterance.
    async fn recognize_intent(
        &self,
        utterance: &str,
        context: Option<&ProjectContext>,
    ) -> CoreResult<IntentResult>;

    /// Judges whether a task is atomic.
    async fn detect_atomic(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<AtomicAssessment>;

    /// Proposes child tasks for a non-atomic task.
    async fn decompose_task(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<DecompositionPlan>;
}

/// Retry policy configuration for [`OracleClient`].
#[derive(Debug, Clone)]
pub struct OracleClientConfig {
    /// Per-call timeout.
    pub timeout: Duration,
    /// Retries after the first attempt, for `OracleUnavailable` only.
    pub max_retries: u32,
    /// Base delay for exponential back-off.
    pub backoff_base: Duration,
}

impl Default for OracleClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ORACLE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// Wraps any [`Oracle`] with the shared timeout-and-retry policy.
///
/// Only `OracleUnavailable` (including a call that exceeds the timeout) is
/// retried; `Cancelled` and every other error pass through immediately.
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    config: OracleClientConfig,
}

impl OracleClient {
    /// Wraps an oracle with the default policy.
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self::with_config(oracle, OracleClientConfig::default())
    }

    /// Wraps an oracle with an explicit policy.
    pub fn with_config(oracle: Arc<dyn Oracle>, config: OracleClientConfig) -> Self {
        Self { oracle, config }
    }

    /// See [`Oracle::recognize_intent`].
    pub async fn recognize_intent(
        &self,
        utterance: &str,
        context: Option<&ProjectContext>,
    ) -> CoreResult<IntentResult> {
        self.with_retry("recognize_intent", || {
            self.oracle.recognize_intent(utterance, context)
        })
        .await
    }

    /// See [`Oracle::detect_atomic`].
    pub async fn detect_atomic(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<AtomicAssessment> {
        self.with_retry("detect_atomic", || self.oracle.detect_atomic(task, context))
            .await
    }

    /// See [`Oracle::decompose_task`].
    pub async fn decompose_task(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<DecompositionPlan> {
        self.with_retry("decompose_task", || self.oracle.decompose_task(task, context))
            .await
    }

    async fn with_retry<T, Fut>(&self, op: &str, call: impl Fn() -> Fut) -> CoreResult<T>
    where
        Fut: std::future::Future<Output = CoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::OracleUnavailable(format!(
                    "{op} timed out after {:?}",
                    self.config.timeout
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(CoreError::OracleUnavailable(detail)) if attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(op, attempt, %detail, ?delay, "oracle unavailable; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(op, attempt, error = %e, "oracle call failed");
                    return Err(e);
                }
            }
        }
    }

    /// Exponential back-off with up-to-half-base jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskforge_types::ErrorKind;

    struct FlakyOracle {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Oracle for FlakyOracle {
        async fn recognize_intent(
            &self,
            _utterance: &str,
            _context: Option<&ProjectContext>,
        ) -> CoreResult<IntentResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(CoreError::OracleUnavailable("connection refused".into()))
            } else {
                Ok(IntentResult {
                    intent: Intent::CreateTask,
                    confidence: 0.9,
                    parameters: HashMap::new(),
                    alternatives: vec![],
                })
            }
        }

        async fn detect_atomic(
            &self,
            _task: &AtomicTask,
            _context: &ProjectContext,
        ) -> CoreResult<AtomicAssessment> {
            Err(CoreError::Cancelled)
        }

        async fn decompose_task(
            &self,
            _task: &AtomicTask,
            _context: &ProjectContext,
        ) -> CoreResult<DecompositionPlan> {
            Err(CoreError::OracleMalformed("not json".into()))
        }
    }

    fn client(failures: u32, max_retries: u32) -> (OracleClient, Arc<FlakyOracle>) {
        let oracle = Arc::new(FlakyOracle {
            failures_before_success: failures,
            calls: AtomicU32::new(0),
        });
        let config = OracleClientConfig {
            timeout: Duration::from_secs(1),
            max_retries,
            backoff_base: Duration::from_millis(1),
        };
        (OracleClient::with_config(oracle.clone(), config), oracle)
    }

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let (client, oracle) = client(2, 3);
        let result = client.recognize_intent("create a task", None).await.unwrap();
        assert_eq!(result.intent, Intent::CreateTask);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retry_budget() {
        let (client, oracle) = client(10, 2);
        let err = client.recognize_intent("create a task", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3); // 1 + 2 retries
    }

    #[tokio::test]
    async fn cancelled_passes_through_immediately() {
        let (client, _) = client(0, 3);
        let task = AtomicTask::new("T1", "t", "d", "P1", "P1-main-epic");
        let err = client
            .detect_atomic(&task, &ProjectContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn malformed_is_not_retried() {
        let (client, _) = client(0, 3);
        let task = AtomicTask::new("T1", "t", "d", "P1", "P1-main-epic");
        let err = client
            .decompose_task(&task, &ProjectContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OracleMalformed);
    }
}
