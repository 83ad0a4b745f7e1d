#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-performance** – Operation timing and regression detection.
//!
//! Core operations run inside `start_operation`/`end_operation` brackets
//! yielding duration and memory delta. Samples accumulate in bounded
//! sliding windows per operation; the [`RegressionDetector`] compares the
//! aged part of a window against the recent part, and the
//! [`AutoOptimizer`] applies known remedies when the comparison trips a
//! severity band.

pub mod monitor;
pub mod optimize;
pub mod regression;

pub use monitor::{OperationMetrics, OperationStats, OperationToken, PerformanceMonitor};
pub use optimize::{AutoOptimizer, OptimizationAction};
pub use regression::{RegressionDetector, RegressionFinding, RegressionSeverity};
