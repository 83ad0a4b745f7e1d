//! Typed configuration loaded once at startup.
//!
//! The environment variable names are preserved for compatibility with
//! existing deployments; nothing inside the core reads the environment
//! after [`CoreConfig::load`] returns.

use std::path::PathBuf;
use std::time::Duration;

use taskforge_store::SecurityMode;
use taskforge_types::{CoreError, CoreResult, MAX_DECOMPOSITION_DEPTH};

/// Read-root environment variable.
pub const ENV_READ_DIR: &str = "VIBE_TASK_MANAGER_READ_DIR";
/// Write-root environment variable.
pub const ENV_WRITE_DIR: &str = "VIBE_CODER_OUTPUT_DIR";
/// Security mode environment variable (`strict` or `permissive`).
pub const ENV_SECURITY_MODE: &str = "VIBE_TASK_MANAGER_SECURITY_MODE";
/// Performance threshold environment variable, in milliseconds (10–10000).
pub const ENV_PERFORMANCE_THRESHOLD: &str = "VIBE_SECURITY_PERFORMANCE_THRESHOLD";

/// Everything the core needs to know at startup.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root all reads are constrained to.
    pub read_root: PathBuf,
    /// Root all writes are constrained to.
    pub write_root: PathBuf,
    /// Path enforcement posture.
    pub security_mode: SecurityMode,
    /// Operation-duration alerting threshold in milliseconds.
    pub performance_threshold_ms: u64,
    /// Default lock acquire timeout.
    pub lock_timeout: Duration,
    /// Per-call oracle timeout.
    pub oracle_timeout: Duration,
    /// Oracle retry budget.
    pub oracle_max_retries: u32,
    /// Heartbeat cadence expected from agents.
    pub heartbeat_interval: Duration,
    /// Transport dispatch timeout.
    pub dispatch_timeout: Duration,
    /// Maximum decomposition recursion depth.
    pub max_decomposition_depth: u32,
}

impl CoreConfig {
    /// Loads configuration from the environment. Called once at startup;
    /// the result is passed explicitly everywhere else.
    pub fn load() -> CoreResult<Self> {
        let read_root = std::env::var(ENV_READ_DIR)
            .map(PathBuf::from)
            .map_err(|_| CoreError::Validation(format!("{ENV_READ_DIR} is not set")))?;
        let write_root = std::env::var(ENV_WRITE_DIR)
            .map(PathBuf::from)
            .map_err(|_| CoreError::Validation(format!("{ENV_WRITE_DIR} is not set")))?;

        let security_mode = match std::env::var(ENV_SECURITY_MODE).ok().as_deref() {
            None | Some("strict") => SecurityMode::Strict,
            Some("permissive") => SecurityMode::Permissive,
            Some(other) => {
                return Err(CoreError::Validation(format!(
                    "{ENV_SECURITY_MODE} must be strict or permissive, got {other:?}"
                )))
            }
        };

        let performance_threshold_ms = match std::env::var(ENV_PERFORMANCE_THRESHOLD).ok() {
            None => 1000,
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                CoreError::Validation(format!(
                    "{ENV_PERFORMANCE_THRESHOLD} must be an integer, got {raw:?}"
                ))
            })?,
        };

        let config = Self {
            read_root,
            write_root,
            security_mode,
            performance_threshold_ms,
            lock_timeout: Duration::from_secs(30),
            oracle_timeout: Duration::from_secs(30),
            oracle_max_retries: 3,
            heartbeat_interval: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            max_decomposition_depth: MAX_DECOMPOSITION_DEPTH,
        };
        config.validate()?;
        Ok(config)
    }

    /// Range-checks the configuration.
    pub fn validate(&self) -> CoreResult<()> {
        if !(10..=10_000).contains(&self.performance_threshold_ms) {
            return Err(CoreError::Validation(format!(
                "performance threshold must be within 10..=10000 ms, got {}",
                self.performance_threshold_ms
            )));
        }
        if self.read_root.as_os_str().is_empty() || self.write_root.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "read and write roots must be non-empty paths".into(),
            ));
        }
        if self.lock_timeout > Duration::from_secs(300) {
            return Err(CoreError::Validation(
                "lock timeout must not exceed 300 seconds".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CoreConfig {
        CoreConfig {
            read_root: PathBuf::from("/data/read"),
            write_root: PathBuf::from("/data/write"),
            security_mode: SecurityMode::Strict,
            performance_threshold_ms: 1000,
            lock_timeout: Duration::from_secs(30),
            oracle_timeout: Duration::from_secs(30),
            oracle_max_retries: 3,
            heartbeat_interval: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            max_decomposition_depth: 3,
        }
    }

    #[test]
    fn threshold_range_is_enforced() {
        let mut config = base();
        config.performance_threshold_ms = 9;
        assert!(config.validate().is_err());
        config.performance_threshold_ms = 10_001;
        assert!(config.validate().is_err());
        config.performance_threshold_ms = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lock_timeout_is_capped() {
        let mut config = base();
        config.lock_timeout = Duration::from_secs(301);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_the_compatibility_variables() {
        std::env::set_var(ENV_READ_DIR, "/tmp/tf-read");
        std::env::set_var(ENV_WRITE_DIR, "/tmp/tf-write");
        std::env::set_var(ENV_SECURITY_MODE, "permissive");
        std::env::set_var(ENV_PERFORMANCE_THRESHOLD, "250");

        let config = CoreConfig::load().unwrap();
        assert_eq!(config.read_root, PathBuf::from("/tmp/tf-read"));
        assert_eq!(config.security_mode, SecurityMode::Permissive);
        assert_eq!(config.performance_threshold_ms, 250);

        std::env::remove_var(ENV_READ_DIR);
        std::env::remove_var(ENV_WRITE_DIR);
        std::env::remove_var(ENV_SECURITY_MODE);
        std::env::remove_var(ENV_PERFORMANCE_THRESHOLD);
    }
}
