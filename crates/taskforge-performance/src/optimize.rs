//! Automatic remedies for detected regressions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::regression::{RegressionFinding, RegressionSeverity};

/// A remedy the optimizer applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum OptimizationAction {
    /// Registered cache-prune hooks ran, dropping this many entries.
    PruneCaches {
        /// Entries dropped across all hooks.
        dropped: usize,
    },
    /// Allocator hint issued; next allocations prefer reuse.
    GcHint,
    /// The concurrency cap was lowered.
    ReduceConcurrency {
        /// Cap before the reduction.
        from: usize,
        /// Cap after the reduction.
        to: usize,
    },
}

type PruneHook = Box<dyn Fn() -> usize + Send + Sync>;

/// Applies known remedies when regression findings cross thresholds.
///
/// Remedies, by worst finding: medium prunes caches; high additionally
/// issues an allocator hint; critical also drops the concurrency cap by a
/// quarter (never below one).
pub struct AutoOptimizer {
    concurrency_cap: AtomicUsize,
    prune_hooks: Mutex<Vec<PruneHook>>,
}

impl AutoOptimizer {
    /// Creates an optimizer managing the given concurrency cap.
    pub fn new(concurrency_cap: usize) -> Self {
        Self {
            concurrency_cap: AtomicUsize::new(concurrency_cap.max(1)),
            prune_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a cache-prune hook returning how many entries it dropped.
    pub fn register_prune_hook(&self, hook: impl Fn() -> usize + Send + Sync + 'static) {
        if let Ok(mut hooks) = self.prune_hooks.lock() {
            hooks.push(Box::new(hook));
        }
    }

    /// The current concurrency cap.
    pub fn concurrency_cap(&self) -> usize {
        self.concurrency_cap.load(Ordering::SeqCst)
    }

    /// Applies remedies for the given findings and returns what was done.
    /// No findings, or nothing above `Low`, means no actions.
    pub fn apply(&self, findings: &[RegressionFinding]) -> Vec<OptimizationAction> {
        let Some(worst) = findings.iter().map(|f| f.severity).max() else {
            return Vec::new();
        };
        let mut actions = Vec::new();

        if worst >= RegressionSeverity::Medium {
            let dropped = self
                .prune_hooks
                .lock()
                .map(|hooks| hooks.iter().map(|h| h()).sum())
                .unwrap_or(0);
            actions.push(OptimizationAction::PruneCaches { dropped });
        }
        if worst >= RegressionSeverity::High {
            actions.push(OptimizationAction::GcHint);
        }
        if worst >= RegressionSeverity::Critical {
            let from = self.concurrency_cap.load(Ordering::SeqCst);
            let to = (from - from / 4).max(1);
            self.concurrency_cap.store(to, Ordering::SeqCst);
            actions.push(OptimizationAction::ReduceConcurrency { from, to });
        }

        if !actions.is_empty() {
            info!(?worst, applied = actions.len(), "auto-optimization applied");
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finding(severity: RegressionSeverity) -> RegressionFinding {
        RegressionFinding {
            operation: "op".into(),
            baseline_ms: 100.0,
            recent_ms: 200.0,
            change_percent: 100.0,
            severity,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn no_findings_no_actions() {
        let optimizer = AutoOptimizer::new(8);
        assert!(optimizer.apply(&[]).is_empty());
        assert!(optimizer.apply(&[finding(RegressionSeverity::Low)]).is_empty());
    }

    #[test]
    fn medium_prunes_caches() {
        let optimizer = AutoOptimizer::new(8);
        optimizer.register_prune_hook(|| 42);
        let actions = optimizer.apply(&[finding(RegressionSeverity::Medium)]);
        assert_eq!(actions, vec![OptimizationAction::PruneCaches { dropped: 42 }]);
    }

    #[test]
    fn critical_applies_every_remedy() {
        let optimizer = AutoOptimizer::new(8);
        optimizer.register_prune_hook(|| 10);
        let actions = optimizer.apply(&[finding(RegressionSeverity::Critical)]);
        assert_eq!(
            actions,
            vec![
                OptimizationAction::PruneCaches { dropped: 10 },
                OptimizationAction::GcHint,
                OptimizationAction::ReduceConcurrency { from: 8, to: 6 },
            ]
        );
        assert_eq!(optimizer.concurrency_cap(), 6);
    }

    #[test]
    fn cap_never_drops_below_one() {
        let optimizer = AutoOptimizer::new(1);
        optimizer.apply(&[finding(RegressionSeverity::Critical)]);
        assert_eq!(optimizer.concurrency_cap(), 1);
    }
}
