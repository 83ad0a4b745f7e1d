//! Operation timing with bounded per-operation sample windows.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Samples retained per operation.
const WINDOW_CAPACITY: usize = 512;

/// One timed execution of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSample {
    /// Wall-clock duration.
    pub duration: Duration,
    /// Resident-memory change across the operation, in bytes.
    pub memory_delta: i64,
    /// When the sample was recorded.
    pub at: DateTime<Utc>,
}

/// Handle returned by `start_operation`; closed by `end_operation`.
#[derive(Debug)]
pub struct OperationToken {
    name: String,
    started: Instant,
    memory_before: i64,
}

/// What one bracketed operation cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationMetrics {
    /// Wall-clock duration.
    pub duration: Duration,
    /// Resident-memory change, in bytes.
    pub memory_delta: i64,
}

/// Aggregates over one operation's sample window.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStats {
    /// Samples currently in the window.
    pub count: usize,
    /// Mean duration.
    pub mean: Duration,
    /// Largest duration observed in the window.
    pub max: Duration,
}

/// Wraps core operations with timing and sliding-window metrics.
///
/// The monitor observes wall-clock ordering only; it is not a
/// synchronization primitive.
pub struct PerformanceMonitor {
    threshold: Duration,
    windows: Mutex<HashMap<String, VecDeque<OperationSample>>>,
}

impl PerformanceMonitor {
    /// Creates a monitor that logs operations slower than `threshold`.
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a timing bracket for a named operation.
    pub fn start_operation(&self, name: impl Into<String>) -> OperationToken {
        OperationToken {
            name: name.into(),
            started: Instant::now(),
            memory_before: resident_memory_bytes(),
        }
    }

    /// Closes a timing bracket, recording and returning its metrics.
    pub fn end_operation(&self, token: OperationToken) -> OperationMetrics {
        let duration = token.started.elapsed();
        let memory_delta = resident_memory_bytes() - token.memory_before;
        if duration > self.threshold {
            warn!(
                operation = %token.name,
                duration_ms = duration.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "operation exceeded the performance threshold"
            );
        }
        self.record_sample(
            &token.name,
            OperationSample {
                duration,
                memory_delta,
                at: Utc::now(),
            },
        );
        OperationMetrics {
            duration,
            memory_delta,
        }
    }

    /// Appends a sample to an operation's window, evicting the oldest at
    /// capacity. Public so benchmarks and the regression detector's tests
    /// can feed history directly.
    pub fn record_sample(&self, name: &str, sample: OperationSample) {
        let Ok(mut windows) = self.windows.lock() else { return };
        let window = windows.entry(name.to_string()).or_default();
        if window.len() == WINDOW_CAPACITY {
            window.pop_front();
        }
        window.push_back(sample);
    }

    /// Aggregate statistics for one operation.
    pub fn stats(&self, name: &str) -> Option<OperationStats> {
        let windows = self.windows.lock().ok()?;
        let window = windows.get(name)?;
        if window.is_empty() {
            return None;
        }
        let total: Duration = window.iter().map(|s| s.duration).sum();
        let max = window.iter().map(|s| s.duration).max().unwrap_or_default();
        Some(OperationStats {
            count: window.len(),
            mean: total / window.len() as u32,
            max,
        })
    }

    /// A copy of one operation's sample window.
    pub fn samples(&self, name: &str) -> Vec<OperationSample> {
        self.windows
            .lock()
            .ok()
            .and_then(|w| w.get(name).map(|v| v.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// Names of all operations with recorded samples.
    pub fn operation_names(&self) -> Vec<String> {
        self.windows
            .lock()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops all recorded samples. Used by the optimizer's cache-prune
    /// remedy.
    pub fn prune(&self) -> usize {
        let Ok(mut windows) = self.windows.lock() else { return 0 };
        let dropped = windows.values().map(VecDeque::len).sum();
        windows.clear();
        dropped
    }
}

/// Resident set size of the current process in bytes, best effort.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> i64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let rss_pages: i64 = statm
        .split_whitespace()
        .nth(1)
        .and_then(|f| f.parse().ok())
        .unwrap_or(0);
    rss_pages * 4096
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> i64 {
    0
}
