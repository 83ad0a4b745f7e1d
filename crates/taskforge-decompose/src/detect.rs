//! Atomic detection with a deterministic fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use taskforge_oracle::{AtomicAssessment, OracleClient, ProjectContext};
use taskforge_types::{AtomicTask, CoreError, CoreResult, MIN_ORACLE_CONFIDENCE};

/// Oracle-backed predicate: "is this task atomic?".
///
/// The oracle gets the first word. When it is unreachable, the
/// deterministic heuristic decides (estimate in the 5–10 minute range, one
/// acceptance criterion, at most three files). Low-confidence oracle
/// verdicts are downgraded to non-atomic unless the heuristic agrees.
pub struct AtomicDetector {
    client: Arc<OracleClient>,
}

impl AtomicDetector {
    /// Creates a detector over an oracle client.
    pub fn new(client: Arc<OracleClient>) -> Self {
        Self { client }
    }

    /// Judges whether a task is atomic.
    pub async fn is_atomic(
        &self,
        task: &AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<AtomicAssessment> {
        let mut assessment = match self.client.detect_atomic(task, context).await {
            Ok(assessment) => assessment,
            Err(CoreError::OracleUnavailable(detail)) => {
                warn!(task = %task.task_id, %detail, "oracle unreachable; applying heuristic");
                return Ok(heuristic_assessment(task));
            }
            Err(e) => return Err(e),
        };

        if assessment.confidence < MIN_ORACLE_CONFIDENCE
            && assessment.is_atomic
            && !task.satisfies_atomic_heuristic()
        {
            debug!(
                task = %task.task_id,
                confidence = assessment.confidence,
                "downgrading low-confidence atomic verdict"
            );
            assessment.is_atomic = false;
            assessment
                .recommendations
                .push("verdict downgraded: confidence below threshold and heuristic disagrees".into());
        }

        Ok(assessment)
    }
}

/// The deterministic fallback verdict.
fn heuristic_assessment(task: &AtomicTask) -> AtomicAssessment {
    let is_atomic = task.satisfies_atomic_heuristic();
    AtomicAssessment {
        is_atomic,
        confidence: 1.0,
        reasoning: "oracle unreachable; deterministic heuristic applied".to_string(),
        estimated_hours: task.estimated_hours,
        complexity_factors: Vec::new(),
        recommendations: if is_atomic {
            Vec::new()
        } else {
            vec!["decompose into 5-10 minute pieces with one acceptance criterion each".into()]
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_oracle::ScriptedOracle;

    fn atomic_task() -> AtomicTask {
        let mut t = AtomicTask::new("T1", "Small", "One tiny change", "P1", "P1-main-epic");
        t.estimated_hours = 0.1;
        t.acceptance_criteria = vec!["it works".into()];
        t
    }

    fn detector(oracle: ScriptedOracle) -> AtomicDetector {
        AtomicDetector::new(Arc::new(OracleClient::with_config(
            Arc::new(oracle),
            taskforge_oracle::OracleClientConfig {
                max_retries: 0,
                ..Default::default()
            },
        )))
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

    #[tokio::test]
    async fn oracle_verdict_passes_through() {
        let oracle = ScriptedOracle::new();
        oracle.push_assessment(Ok(verdict(true, 0.95)));
        let detector = detector(oracle);

        let assessment = detector
            .is_atomic(&atomic_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(assessment.is_atomic);
        assert_eq!(assessment.confidence, 0.95);
    }

    #[tokio::test]
    async fn unreachable_oracle_falls_back_to_heuristic() {
        let detector = detector(ScriptedOracle::new()); // empty script = unavailable
        let assessment = detector
            .is_atomic(&atomic_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(assessment.is_atomic);
        assert_eq!(assessment.confidence, 1.0);

        let mut big = atomic_task();
        big.estimated_hours = 4.0;
        let detector = detector_empty();
        let assessment = detector
            .is_atomic(&big, &ProjectContext::default())
            .await
            .unwrap();
        assert!(!assessment.is_atomic);
    }

    fn detector_empty() -> AtomicDetector {
        detector(ScriptedOracle::new())
    }

    #[tokio::test]
    async fn low_confidence_atomic_downgraded_when_heuristic_disagrees() {
        let oracle = ScriptedOracle::new();
        oracle.push_assessment(Ok(verdict(true, 0.4)));
        let detector = detector(oracle);

        let mut big = atomic_task();
        big.estimated_hours = 5.0; // fails the heuristic
        let assessment = detector
            .is_atomic(&big, &ProjectContext::default())
            .await
            .unwrap();
        assert!(!assessment.is_atomic);
    }

    #[tokio::test]
    async fn low_confidence_atomic_kept_when_heuristic_agrees() {
        let oracle = ScriptedOracle::new();
        oracle.push_assessment(Ok(verdict(true, 0.4)));
        let detector = detector(oracle);

        let assessment = detector
            .is_atomic(&atomic_task(), &ProjectContext::default())
            .await
            .unwrap();
        assert!(assessment.is_atomic);
    }
}
