//! Deterministic, collision-free identifier generation.
//!
//! Formats are stable across versions:
//!
//! - project: `PID-<NAME-SLUG>-<NNN>`
//! - epic: `<projectId>-E<NNN>` or `<projectId>-<area>-epic`
//! - task: `T<monotonic>` or `<projectId>-<epicId>-T<NNN>`
//! - dependency: `DEP-<fromTaskId>-<toTaskId>-<NNN>`
//!
//! Uniqueness is enforced against the file index before an ID is emitted;
//! generation is purely in-memory and never sleeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use regex::Regex;
use std::sync::OnceLock;

use taskforge_types::{CoreError, CoreResult};

use crate::index::FileIndex;

/// Highest ordinal tried before an ID family is declared exhausted.
const MAX_ORDINAL: u32 = 999;

/// Reserved scaffolding patterns an epic ID must never match.
const FORBIDDEN_EPIC_LITERALS: &[&str] = &[
    "default-epic",
    "temp-epic",
    "scaffolding",
    "setup",
    "basic",
    "generic",
];

fn scaffolding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^E0{0,2}[123]$").expect("static pattern"))
}

/// Whether an epic ID matches a reserved scaffolding pattern
/// (`E001`/`E002`/`E003`, `E1`–`E3`, `default-epic`, ...).
pub fn is_scaffolding_epic_id(id: &str) -> bool {
    scaffolding_pattern().is_match(id) || FORBIDDEN_EPIC_LITERALS.contains(&id)
}

/// Monotonic ID source for every entity kind.
#[derive(Debug)]
pub struct IdGenerator {
    task_counter: AtomicU64,
    slug_ordinals: Mutex<HashMap<String, u32>>,
}

impl IdGenerator {
    /// Creates a generator seeded from the index so restarts never re-issue
    /// a live task ID.
    pub fn new(index: &FileIndex) -> Self {
        let max_task = index
            .ids_of_kind(crate::index::EntityKind::Task)
            .iter()
            .filter_map(|id| id.strip_prefix('T').and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);
        Self {
            task_counter: AtomicU64::new(max_task),
            slug_ordinals: Mutex::new(HashMap::new()),
        }
    }

    /// Emits the next project ID for a display name: `PID-<SLUG>-<NNN>`.
    pub fn next_project_id(&self, name: &str, index: &FileIndex) -> CoreResult<String> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(CoreError::Validation(format!(
                "cannot derive a project slug from name {name:?}"
            )));
        }
        self.next_in_family(index, |n| format!("PID-{slug}-{n:03}"))
    }

    /// Emits the next ordinal epic ID for a project: `<projectId>-E<NNN>`.
    ///
    /// The result can never collide with the bare scaffolding patterns
    /// because it is always prefixed by the project ID; the check is still
    /// applied on emission.
    pub fn next_epic_id(&self, project_id: &str, index: &FileIndex) -> CoreResult<String> {
        let id = self.next_in_family(index, |n| format!("{project_id}-E{n:03}"))?;
        if is_scaffolding_epic_id(&id) {
            return Err(CoreError::ScaffoldingEpicRejected(id));
        }
        Ok(id)
    }

    /// Emits the next globally monotonic task ID: `T<n>`.
    pub fn next_task_id(&self, index: &FileIndex) -> CoreResult<String> {
        // The counter is seeded from the index; a collision here means an
        // external writer raced us, so keep advancing.
        for _ in 0..=MAX_ORDINAL {
            let n = self.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("T{n}");
            if !index.contains(&id) {
                return Ok(id);
            }
        }
        Err(CoreError::Conflict(
            "task id space exhausted after repeated collisions".into(),
        ))
    }

    /// Emits the next scoped task ID: `<projectId>-<epicId>-T<NNN>`.
    pub fn next_scoped_task_id(
        &self,
        project_id: &str,
        epic_id: &str,
        index: &FileIndex,
    ) -> CoreResult<String> {
        self.next_in_family(index, |n| format!("{project_id}-{epic_id}-T{n:03}"))
    }

    /// Emits the next dependency ID: `DEP-<from>-<to>-<NNN>`.
    pub fn next_dependency_id(
        &self,
        from_task_id: &str,
        to_task_id: &str,
        index: &FileIndex,
    ) -> CoreResult<String> {
        self.next_in_family(index, |n| format!("DEP-{from_task_id}-{to_task_id}-{n:03}"))
    }

    /// Walks a 3-digit ordinal family until a free slot is found, caching
    /// the last ordinal handed out per family.
    fn next_in_family(
        &self,
        index: &FileIndex,
        format: impl Fn(u32) -> String,
    ) -> CoreResult<String> {
        let family = format(0);
        let mut ordinals = self
            .slug_ordinals
            .lock()
            .map_err(|_| CoreError::Internal("id generator ordinal table poisoned".into()))?;
        let start = ordinals.get(&family).copied().unwrap_or(0);
        for n in (start + 1)..=MAX_ORDINAL {
            let id = format(n);
            if !index.contains(&id) {
                ordinals.insert(family, n);
                return Ok(id);
            }
        }
        Err(CoreError::Conflict(format!(
            "id family {family:?} exhausted at {MAX_ORDINAL} entries"
        )))
    }
}

/// Uppercase slug of a display name: alphanumerics kept, runs of anything
/// else collapsed to single hyphens.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_uppercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
