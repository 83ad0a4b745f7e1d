//! The entity file index.
//!
//! `.file-index.json` is the authoritative map from entity ID to on-disk
//! location. The ID generator consults it for uniqueness and the engine
//! uses it to find, list, and verify entities without scanning directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of entity an index entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A project (`projects/<id>.yaml`).
    Project,
    /// An epic (`epics/<id>.yaml`).
    Epic,
    /// A task (`tasks/<id>.json[.gz]`).
    Task,
    /// A dependency edge (`dependencies/<id>.json`).
    Dependency,
    /// A derived graph (`graphs/<projectId>.json`).
    Graph,
}

impl EntityKind {
    /// Directory the kind persists under, relative to the write root.
    pub fn directory(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Epic => "epics",
            EntityKind::Task => "tasks",
            EntityKind::Dependency => "dependencies",
            EntityKind::Graph => "graphs",
        }
    }
}

/// One entry in the file index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Entity kind.
    pub kind: EntityKind,
    /// Path relative to the write root.
    pub file_path: PathBuf,
    /// Stored size in bytes (after compression, when applied).
    pub size: u64,
    /// Last write timestamp.
    pub last_modified: DateTime<Utc>,
    /// Whether the stored bytes are gzip-compressed.
    pub compressed: bool,
    /// Hex blake3 digest of the stored bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// In-memory image of `.file-index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndex {
    entries: HashMap<String, IndexEntry>,
}

impl FileIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an ID is present.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Looks up an entry by ID.
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, id: impl Into<String>, entry: IndexEntry) {
        self.entries.insert(id.into(), entry);
    }

    /// Removes an entry, returning it when present.
    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(id, entry)` pairs of one kind.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = (&String, &IndexEntry)> {
        self.entries.iter().filter(move |(_, e)| e.kind == kind)
    }

    /// IDs of one kind, sorted for deterministic iteration.
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<String> {
        let mut ids: Vec<String> = self.of_kind(kind).map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }
}

/// Hex blake3 digest used as the index checksum.
pub(crate) fn checksum_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Builds the relative storage path for an entity.
pub(crate) fn relative_path(kind: EntityKind, id: &str, compressed: bool) -> PathBuf {
    let file = match kind {
        EntityKind::Project | EntityKind::Epic => format!("{id}.yaml"),
        EntityKind::Task if compressed => format!("{id}.json.gz"),
        _ => format!("{id}.json"),
    };
    Path::new(kind.directory()).join(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntityKind, path: &str) -> IndexEntry {
        IndexEntry {
            kind,
            file_path: PathBuf::from(path),
            size: 10,
            last_modified: Utc::now(),
            compressed: false,
            checksum: None,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let mut index = FileIndex::new();
        index.insert("T1", entry(EntityKind::Task, "tasks/T1.json"));
        index.insert("P1", entry(EntityKind::Project, "projects/P1.yaml"));

        let json = serde_json::to_string(&index).unwrap();
        let back: FileIndex = serde_json::from_str(&json).unwrap();
        assert!(back.contains("T1"));
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn filters_by_kind() {
        let mut index = FileIndex::new();
        index.insert("T2", entry(EntityKind::Task, "tasks/T2.json"));
        index.insert("T1", entry(EntityKind::Task, "tasks/T1.json"));
        index.insert("P1", entry(EntityKind::Project, "projects/P1.yaml"));

        assert_eq!(index.ids_of_kind(EntityKind::Task), vec!["T1", "T2"]);
        assert_eq!(index.ids_of_kind(EntityKind::Graph), Vec::<String>::new());
    }

    #[test]
    fn compressed_tasks_get_gz_suffix() {
        assert_eq!(
            relative_path(EntityKind::Task, "T1", true),
            PathBuf::from("tasks/T1.json.gz")
        );
        assert_eq!(
            relative_path(EntityKind::Epic, "E-auth", false),
            PathBuf::from("epics/E-auth.yaml")
        );
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(checksum_bytes(b"abc"), checksum_bytes(b"abc"));
        assert_ne!(checksum_bytes(b"abc"), checksum_bytes(b"abd"));
    }
}
