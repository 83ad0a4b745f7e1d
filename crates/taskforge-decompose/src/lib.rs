#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-decompose** – Recursive decomposition of tasks into atomic work.
//!
//! The pipeline: [`EpicResolver`] places a task in a meaningful
//! functional-area epic (never a scaffolding placeholder),
//! [`AtomicDetector`] asks the oracle whether a task needs further
//! splitting (with a deterministic fallback when the oracle is down), and
//! [`RddEngine`] recurses to a depth-bounded set of atomic leaves.
//! [`SessionManager`] owns the transient sessions, persists leaves in
//! oracle order, and reverts partial work on cancellation.

pub mod detect;
pub mod engine;
pub mod epic;
pub mod ops;
pub mod session;

pub use detect::AtomicDetector;
pub use engine::{DecompositionResult, RddConfig, RddEngine};
pub use epic::{EpicResolution, EpicResolver, EpicSource, TaskContext};
pub use ops::{NewTask, TaskOps};
pub use session::SessionManager;
