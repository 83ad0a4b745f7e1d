//! Filesystem path validation.
//!
//! Every storage operation resolves its target through [`PathValidator`]
//! before touching the filesystem. Reads must stay beneath the read root,
//! writes beneath the write root; the filesystem root itself and any path
//! that retains parent-directory segments after normalization are rejected.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use taskforge_types::{CoreError, CoreResult, PathViolationKind};

/// Whether a path is being resolved for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Path will be read.
    Read,
    /// Path will be created or replaced.
    Write,
}

/// Enforcement posture of the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Reject any path carrying parent-directory segments outright.
    #[default]
    Strict,
    /// Normalize lexically and only reject when the result escapes.
    Permissive,
}

/// Constrains all filesystem access to the configured roots.
#[derive(Debug, Clone)]
pub struct PathValidator {
    read_root: PathBuf,
    write_root: PathBuf,
    mode: SecurityMode,
}

impl PathValidator {
    /// Creates a validator over the given roots.
    pub fn new(
        read_root: impl Into<PathBuf>,
        write_root: impl Into<PathBuf>,
        mode: SecurityMode,
    ) -> Self {
        Self {
            read_root: read_root.into(),
            write_root: write_root.into(),
            mode,
        }
    }

    /// Read root this validator enforces.
    pub fn read_root(&self) -> &Path {
        &self.read_root
    }

    /// Write root this validator enforces.
    pub fn write_root(&self) -> &Path {
        &self.write_root
    }

    /// Resolves `path` against the root for `mode` and returns the absolute
    /// path when it is admissible.
    ///
    /// Relative paths resolve beneath the mode's root. Absolute paths must
    /// already lie beneath an admissible root: the write root for writes,
    /// the read root for reads. Entities the store wrote are always
    /// readable back, so reads also admit the write root. Violations
    /// surface as [`CoreError::PathViolation`] and are fatal for the
    /// operation, never for the process.
    pub fn validate(&self, path: &Path, mode: AccessMode) -> CoreResult<PathBuf> {
        let root = match mode {
            AccessMode::Read => &self.read_root,
            AccessMode::Write => &self.write_root,
        };

        if self.mode == SecurityMode::Strict
            && path.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(self.violation(path, PathViolationKind::Traversal));
        }

        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        let normalized = match normalize(&joined) {
            Some(p) => p,
            None => return Err(self.violation(path, PathViolationKind::Traversal)),
        };

        if normalized == Path::new("/") {
            return Err(self.violation(path, PathViolationKind::ReservedRoot));
        }
        let admissible = match mode {
            AccessMode::Write => normalized.starts_with(root),
            AccessMode::Read => {
                normalized.starts_with(root) || normalized.starts_with(&self.write_root)
            }
        };
        if !admissible {
            return Err(self.violation(path, PathViolationKind::Escape));
        }

        Ok(normalized)
    }

    fn violation(&self, path: &Path, kind: PathViolationKind) -> CoreError {
        warn!(path = %path.display(), ?kind, "rejected filesystem path");
        CoreError::PathViolation {
            kind,
            path: path.display().to_string(),
        }
    }
}

/// Lexically normalizes a path, resolving `.` and applying `..` segments.
/// Returns `None` when a `..` would climb past the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(seg) => {
                out.push(seg);
                depth += 1;
            }
        }
    }
    Some(out)
}
