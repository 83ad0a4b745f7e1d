//! Deterministic oracle for tests.
//!
//! Responses are FIFO queues keyed by operation type; an exhausted queue
//! answers `OracleUnavailable`, which exercises the same fallback paths a
//! real outage would.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use taskforge_types::{AtomicTask, CoreError, CoreResult};

use crate::{AtomicAssessment, DecompositionPlan, IntentResult, Oracle, ProjectContext};

/// A scriptable oracle whose answers are supplied up front.
#[derive(Default)]
pub struct ScriptedOracle {
    intents: Mutex<VecDeque<CoreResult<IntentResult>>>,
    assessments: Mutex<VecDeque<CoreResult<AtomicAssessment>>>,
    plans: Mutex<VecDeque<CoreResult<DecompositionPlan>>>,
}

impl ScriptedOracle {
    /// Creates an oracle with empty scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an intent-recognition response.
    pub fn push_intent(&self, response: CoreResult<IntentResult>) {
        self.intents.lock().expect("script queue").push_back(response);
    }

    /// Queues an atomic-detection response.
    pub fn push_assessment(&self, response: CoreResult<AtomicAssessment>) {
        self.assessments
            .lock()
            .expect("script queue")
            .push_back(response);
    }

    /// Queues a decomposition response.
    pub fn push_plan(&self, response: CoreResult<DecompositionPlan>) {
        self.plans.lock().expect("script queue").push_back(response);
    }

    /// Remaining queued responses across all operations.
    pub fn remaining(&self) -> usize {
        self.intents.lock().expect("script queue").len()
            + self.assessments.lock().expect("script queue").len()
            + self.plans.lock().expect("script queue").len()
    }

    fn pop<T>(queue: &Mutex<VecDeque<CoreResult<T>>>, op: &str) -> CoreResult<T> {
        queue
            .lock()
            .expect("script queue")
            .pop_front()
            .unwrap_or_else(|| {
                Err(CoreError::OracleUnavailable(format!(
                    "scripted oracle has no response left for {op}"
                )))
            })
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn recognize_intent(
        &self,
        _utterance: &str,
        _context: Option<&ProjectContext>,
    ) -> CoreResult<IntentResult> {
        Self::pop(&self.intents, "recognize_intent")
    }

    async fn detect_atomic(
        &self,
        _task: &AtomicTask,
        _context: &ProjectContext,
    ) -> CoreResult<AtomicAssessment> {
        Self::pop(&self.assessments, "detect_atomic")
    }

    async fn decompose_task(
        &self,
        _task: &AtomicTask,
        _context: &ProjectContext,
    ) -> CoreResult<DecompositionPlan> {
        Self::pop(&self.plans, "decompose_task")
    }
}
