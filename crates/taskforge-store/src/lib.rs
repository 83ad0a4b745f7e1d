#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-store** – File-backed entity persistence for the Taskforge core.
//!
//! The store exclusively owns on-disk entity bytes. Projects and epics
//! persist as YAML, tasks and dependencies as JSON (tasks optionally
//! gzip-compressed), derived graphs as JSON, and an append-only
//! `.file-index.json` maps every entity ID to its file, size, and checksum.
//!
//! Writes are atomic (`<path>.tmp` → fsync → rename), every filesystem
//! touch goes through the [`PathValidator`] first, and a bounded LRU keeps
//! hot entities in memory.

pub mod engine;
pub mod idgen;
pub mod index;
pub mod path;

pub use engine::{StorageEngine, StoreConfig};
pub use idgen::{is_scaffolding_epic_id, IdGenerator};
pub use index::{EntityKind, FileIndex, IndexEntry};
pub use path::{AccessMode, PathValidator, SecurityMode};
