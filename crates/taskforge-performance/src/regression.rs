//! Regression detection over operation sample windows.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::monitor::{OperationSample, PerformanceMonitor};

/// How bad a detected regression is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionSeverity {
    /// More than 10% slower.
    Low,
    /// More than 20% slower.
    Medium,
    /// More than 30% slower.
    High,
    /// More than 50% slower.
    Critical,
}

impl RegressionSeverity {
    fn classify(change_percent: f64) -> Option<Self> {
        if change_percent > 50.0 {
            Some(RegressionSeverity::Critical)
        } else if change_percent > 30.0 {
            Some(RegressionSeverity::High)
        } else if change_percent > 20.0 {
            Some(RegressionSeverity::Medium)
        } else if change_percent > 10.0 {
            Some(RegressionSeverity::Low)
        } else {
            None
        }
    }
}

/// One detected regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionFinding {
    /// Operation that regressed.
    pub operation: String,
    /// Mean duration of the aged baseline, in milliseconds.
    pub baseline_ms: f64,
    /// Mean duration of the recent samples, in milliseconds.
    pub recent_ms: f64,
    /// Relative slowdown: `(recent - baseline) / baseline`, in percent.
    pub change_percent: f64,
    /// Severity band the slowdown falls in.
    pub severity: RegressionSeverity,
    /// When the comparison ran.
    pub detected_at: DateTime<Utc>,
}

/// Splits each operation's window at an age boundary and compares the two
/// halves.
pub struct RegressionDetector {
    /// Samples older than this count as baseline.
    baseline_age: ChronoDuration,
    /// Minimum samples required on each side of the boundary.
    min_samples: usize,
}

impl Default for RegressionDetector {
    fn default() -> Self {
        Self {
            baseline_age: ChronoDuration::hours(1),
            min_samples: 5,
        }
    }
}

impl RegressionDetector {
    /// Creates a detector with an explicit baseline age and sample floor.
    pub fn new(baseline_age: ChronoDuration, min_samples: usize) -> Self {
        Self {
            baseline_age,
            min_samples,
        }
    }

    /// Compares baseline and recent means for every monitored operation,
    /// most severe first.
    pub fn detect(&self, monitor: &PerformanceMonitor) -> Vec<RegressionFinding> {
        let cutoff = Utc::now() - self.baseline_age;
        let mut findings = Vec::new();

        for operation in monitor.operation_names() {
            let samples = monitor.samples(&operation);
            let (baseline, recent): (Vec<&OperationSample>, Vec<&OperationSample>) =
                samples.iter().partition(|s| s.at < cutoff);
            if baseline.len() < self.min_samples || recent.len() < self.min_samples {
                continue;
            }

            let baseline_ms = mean_ms(&baseline);
            let recent_ms = mean_ms(&recent);
            if baseline_ms <= 0.0 {
                continue;
            }
            let change_percent = (recent_ms - baseline_ms) / baseline_ms * 100.0;
            if let Some(severity) = RegressionSeverity::classify(change_percent) {
                warn!(
                    %operation,
                    baseline_ms,
                    recent_ms,
                    change_percent,
                    ?severity,
                    "performance regression detected"
                );
                findings.push(RegressionFinding {
                    operation,
                    baseline_ms,
                    recent_ms,
                    change_percent,
                    severity,
                    detected_at: Utc::now(),
                });
            }
        }

        findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        findings
    }
}

fn mean_ms(samples: &[&OperationSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|s| s.duration.as_secs_f64() * 1000.0)
        .sum();
    total / samples.len() as f64
}
