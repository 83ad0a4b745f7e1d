//! The closed error set surfaced across component boundaries.
//!
//! Every public operation in the workspace returns [`CoreResult`]. Errors
//! never cross a component boundary as panics; each variant carries a
//! human-readable message that collaborators render verbatim, plus a
//! machine-checkable [`ErrorKind`] and recoverability flag.

use serde::{Deserialize, Serialize};

/// Result alias used by every public operation in the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Classification of a path-validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathViolationKind {
    /// Resolved path escapes the configured root.
    Escape,
    /// Resolved path is the filesystem root itself.
    ReservedRoot,
    /// Path still contains parent-directory segments after normalization.
    Traversal,
}

/// Machine-readable discriminator for [`CoreError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed a schema, range, or pattern check.
    Validation,
    /// Entity does not exist.
    NotFound,
    /// Duplicate ID, concurrent modification, or generation collision.
    Conflict,
    /// Dependency edge would introduce a cycle.
    CycleDetected,
    /// Emitted epic ID matched a forbidden scaffolding pattern.
    ScaffoldingEpicRejected,
    /// Lock acquisition waited beyond its timeout.
    LockTimeout,
    /// Lock acquisition would deadlock.
    Deadlock,
    /// Filesystem path rejected by the validator.
    PathViolation,
    /// Oracle could not be reached.
    OracleUnavailable,
    /// Oracle response could not be parsed or salvaged.
    OracleMalformed,
    /// Agent dispatch or heartbeat lost.
    TransportFailure,
    /// On-disk bytes failed schema validation.
    Corrupt,
    /// Cooperative cancellation.
    Cancelled,
    /// Invariant violation; fatal for the operation.
    Internal,
}

/// Errors produced by the orchestration core.
///
/// The set is closed: collaborators match on [`ErrorKind`] and rely on
/// [`CoreError::recoverable`] to decide whether a retry or user correction
/// can help.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Input failed a schema, range, or pattern check.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate ID, concurrent modification, or ID generation collision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Creating the dependency would introduce a cycle.
    #[error("dependency cycle: {0}")]
    CycleDetected(String),

    /// An epic ID matched a forbidden scaffolding pattern.
    #[error("scaffolding epic rejected: {0}")]
    ScaffoldingEpicRejected(String),

    /// A lock acquisition waited beyond its timeout.
    #[error("lock timeout: {holder} waiting for {resource}")]
    LockTimeout {
        /// Resource string the acquirer waited on.
        resource: String,
        /// Identity of the waiting holder.
        holder: String,
    },

    /// A lock acquisition was aborted to break a wait-for cycle.
    #[error("deadlock detected: {holder} waiting for {resource}")]
    Deadlock {
        /// Resource string the acquirer waited on.
        resource: String,
        /// Identity of the holder whose wait was aborted.
        holder: String,
    },

    /// A filesystem path fell outside the configured roots.
    #[error("path violation ({kind:?}): {path}")]
    PathViolation {
        /// Violation classification.
        kind: PathViolationKind,
        /// Offending path as given by the caller.
        path: String,
    },

    /// The oracle could not be reached within the retry budget.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The oracle responded with bytes that could not be salvaged.
    #[error("oracle response malformed: {0}")]
    OracleMalformed(String),

    /// Dispatch to an agent failed or its heartbeat was lost.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Stored bytes failed schema validation on read.
    #[error("corrupt entity {id}: {detail}")]
    Corrupt {
        /// Identifier of the unreadable entity.
        id: String,
        /// What failed to decode.
        detail: String,
    },

    /// The operation was cooperatively cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Machine-readable discriminator for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::CycleDetected(_) => ErrorKind::CycleDetected,
            CoreError::ScaffoldingEpicRejected(_) => ErrorKind::ScaffoldingEpicRejected,
            CoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
            CoreError::Deadlock { .. } => ErrorKind::Deadlock,
            CoreError::PathViolation { .. } => ErrorKind::PathViolation,
            CoreError::OracleUnavailable(_) => ErrorKind::OracleUnavailable,
            CoreError::OracleMalformed(_) => ErrorKind::OracleMalformed,
            CoreError::TransportFailure(_) => ErrorKind::TransportFailure,
            CoreError::Corrupt { .. } => ErrorKind::Corrupt,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller can expect a retry or corrected input to succeed.
    ///
    /// `CycleDetected`, `ScaffoldingEpicRejected`, `Validation`, and
    /// `PathViolation` are recoverable by fixing the input but must never be
    /// blindly retried; `LockTimeout`, `OracleUnavailable`, and
    /// `TransportFailure` are transient; the rest are final for the
    /// operation.
    pub fn recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Validation
            | ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::CycleDetected
            | ErrorKind::ScaffoldingEpicRejected
            | ErrorKind::LockTimeout
            | ErrorKind::OracleUnavailable
            | ErrorKind::TransportFailure => true,
            ErrorKind::Deadlock
            | ErrorKind::PathViolation
            | ErrorKind::OracleMalformed
            | ErrorKind::Corrupt
            | ErrorKind::Cancelled
            | ErrorKind::Internal => false,
        }
    }

    /// Whether the scheduler/orchestrator retry layer may re-attempt the
    /// failed operation automatically.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransportFailure | ErrorKind::OracleUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = CoreError::CycleDetected("T1 -> T2 -> T1".into());
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert!(err.recoverable());
        assert!(!err.retryable());
    }

    #[test]
    fn cancelled_is_never_retried() {
        let err = CoreError::Cancelled;
        assert!(!err.recoverable());
        assert!(!err.retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        let err = CoreError::TransportFailure("dispatch timed out".into());
        assert!(err.retryable());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = CoreError::LockTimeout {
            resource: "task:T1".into(),
            holder: "worker-3".into(),
        };
        assert_eq!(err.to_string(), "lock timeout: worker-3 waiting for task:T1");
    }
}
