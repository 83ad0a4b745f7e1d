//! The file-backed entity store.
//!
//! Ownership: this engine exclusively owns on-disk entity bytes. Callers
//! serialize conflicting writes through the lock layer; the engine itself
//! only guarantees that individual writes are atomic (tmp + fsync + rename)
//! and that the index never references a partially written file.

use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use taskforge_types::{
    AtomicTask, CoreError, CoreResult, Dependency, DependencyGraph, Epic, Project, TaskPriority,
    TaskStatus,
};

use crate::index::{checksum_bytes, relative_path, EntityKind, FileIndex, IndexEntry};
use crate::path::{AccessMode, PathValidator, SecurityMode};

/// Name of the on-disk index file under the write root.
const INDEX_FILE: &str = ".file-index.json";

/// Default capacity of the hot-entity cache.
const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root all reads are constrained to.
    pub read_root: PathBuf,
    /// Root all writes are constrained to; entity directories live here.
    pub write_root: PathBuf,
    /// Path enforcement posture.
    pub security_mode: SecurityMode,
    /// Whether task payloads are gzip-compressed on disk.
    pub compress_tasks: bool,
    /// Hot-entity cache capacity.
    pub cache_capacity: usize,
}

impl StoreConfig {
    /// Config with defaults for the given roots.
    pub fn new(read_root: impl Into<PathBuf>, write_root: impl Into<PathBuf>) -> Self {
        Self {
            read_root: read_root.into(),
            write_root: write_root.into(),
            security_mode: SecurityMode::Strict,
            compress_tasks: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Enables gzip compression for task payloads.
    pub fn with_compression(mut self) -> Self {
        self.compress_tasks = true;
        self
    }
}

#[derive(Debug, Clone)]
enum CachedEntity {
    Project(Project),
    Epic(Epic),
    Task(AtomicTask),
    Dependency(Dependency),
}

/// File-backed store for projects, epics, tasks, dependencies, and derived
/// graphs.
pub struct StorageEngine {
    validator: PathValidator,
    write_root: PathBuf,
    compress: bool,
    index: RwLock<FileIndex>,
    cache: Mutex<LruCache<String, CachedEntity>>,
}

impl StorageEngine {
    /// Opens (or initializes) a store under the configured write root.
    pub async fn open(config: StoreConfig) -> CoreResult<Self> {
        let validator = PathValidator::new(
            config.read_root.clone(),
            config.write_root.clone(),
            config.security_mode,
        );

        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .expect("max(1) is non-zero");

        let index_path = config.write_root.join(INDEX_FILE);
        let index = if tokio::fs::try_exists(&index_path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&index_path)
                .await
                .map_err(|e| CoreError::Internal(format!("reading file index: {e}")))?;
            serde_json::from_slice(&bytes).map_err(|e| CoreError::Corrupt {
                id: INDEX_FILE.to_string(),
                detail: e.to_string(),
            })?
        } else {
            FileIndex::new()
        };

        info!(
            write_root = %config.write_root.display(),
            entities = index.len(),
            compress = config.compress_tasks,
            "storage engine opened"
        );

        Ok(Self {
            validator,
            write_root: config.write_root,
            compress: config.compress_tasks,
            index: RwLock::new(index),
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// The path validator guarding this store.
    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// A point-in-time copy of the file index, for ID generation and
    /// diagnostics.
    pub async fn index_snapshot(&self) -> FileIndex {
        self.index.read().await.clone()
    }

    /// Whether any entity with this ID exists.
    pub async fn exists(&self, id: &str) -> bool {
        self.index.read().await.contains(id)
    }

    //─────────────────────────────
    //  Projects
    //─────────────────────────────

    /// Persists a new project; rejects an existing ID with `Conflict`.
    pub async fn create_project(&self, project: Project) -> CoreResult<Project> {
        project.validate()?;
        self.put(EntityKind::Project, &project.project_id.clone(), &project, true)
            .await?;
        self.cache_put(&project.project_id.clone(), CachedEntity::Project(project.clone()));
        Ok(project)
    }

    /// Loads a project by ID.
    pub async fn get_project(&self, id: &str) -> CoreResult<Project> {
        if let Some(CachedEntity::Project(p)) = self.cache_get(id) {
            return Ok(p);
        }
        let project: Project = self.fetch(EntityKind::Project, id).await?;
        self.cache_put(id, CachedEntity::Project(project.clone()));
        Ok(project)
    }

    /// Replaces an existing project.
    pub async fn update_project(&self, project: Project) -> CoreResult<Project> {
        project.validate()?;
        self.put(EntityKind::Project, &project.project_id.clone(), &project, false)
            .await?;
        self.cache_put(&project.project_id.clone(), CachedEntity::Project(project.clone()));
        Ok(project)
    }

    /// Deletes a project record (not its epics or tasks).
    pub async fn delete_project(&self, id: &str) -> CoreResult<()> {
        self.delete(id).await
    }

    //─────────────────────────────
    //  Epics
    //─────────────────────────────

    /// Persists a new epic; rejects an existing ID with `Conflict` and
    /// scaffolding IDs outright.
    pub async fn create_epic(&self, epic: Epic) -> CoreResult<Epic> {
        epic.validate()?;
        if crate::idgen::is_scaffolding_epic_id(&epic.epic_id) {
            return Err(CoreError::ScaffoldingEpicRejected(epic.epic_id));
        }
        self.put(EntityKind::Epic, &epic.epic_id.clone(), &epic, true).await?;
        self.cache_put(&epic.epic_id.clone(), CachedEntity::Epic(epic.clone()));
        Ok(epic)
    }

    /// Loads an epic by ID.
    pub async fn get_epic(&self, id: &str) -> CoreResult<Epic> {
        if let Some(CachedEntity::Epic(e)) = self.cache_get(id) {
            return Ok(e);
        }
        let epic: Epic = self.fetch(EntityKind::Epic, id).await?;
        self.cache_put(id, CachedEntity::Epic(epic.clone()));
        Ok(epic)
    }

    /// Replaces an existing epic.
    pub async fn update_epic(&self, epic: Epic) -> CoreResult<Epic> {
        epic.validate()?;
        self.put(EntityKind::Epic, &epic.epic_id.clone(), &epic, false).await?;
        self.cache_put(&epic.epic_id.clone(), CachedEntity::Epic(epic.clone()));
        Ok(epic)
    }

    /// Deletes an epic record.
    pub async fn delete_epic(&self, id: &str) -> CoreResult<()> {
        self.delete(id).await
    }

    /// Lists epics, optionally filtered to one project.
    pub async fn list_epics(&self, project_id: Option<&str>) -> CoreResult<Vec<Epic>> {
        let ids = self.index.read().await.ids_of_kind(EntityKind::Epic);
        let mut epics = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_epic(&id).await {
                Ok(epic) => {
                    if project_id.map_or(true, |p| epic.project_id == p) {
                        epics.push(epic);
                    }
                }
                Err(CoreError::Corrupt { id, detail }) => {
                    warn!(%id, %detail, "skipping corrupt epic during list");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(epics)
    }

    //─────────────────────────────
    //  Tasks
    //─────────────────────────────

    /// Persists a new task; rejects an existing ID with `Conflict`.
    pub async fn create_task(&self, task: AtomicTask) -> CoreResult<AtomicTask> {
        task.validate()?;
        self.put(EntityKind::Task, &task.task_id.clone(), &task, true).await?;
        self.cache_put(&task.task_id.clone(), CachedEntity::Task(task.clone()));
        Ok(task)
    }

    /// Loads a task by ID.
    pub async fn get_task(&self, id: &str) -> CoreResult<AtomicTask> {
        if let Some(CachedEntity::Task(t)) = self.cache_get(id) {
            return Ok(t);
        }
        let task: AtomicTask = self.fetch(EntityKind::Task, id).await?;
        self.cache_put(id, CachedEntity::Task(task.clone()));
        Ok(task)
    }

    /// Replaces an existing task.
    pub async fn update_task(&self, task: AtomicTask) -> CoreResult<AtomicTask> {
        task.validate()?;
        self.put(EntityKind::Task, &task.task_id.clone(), &task, false).await?;
        self.cache_put(&task.task_id.clone(), CachedEntity::Task(task.clone()));
        Ok(task)
    }

    /// Deletes a task record.
    pub async fn delete_task(&self, id: &str) -> CoreResult<()> {
        self.delete(id).await
    }

    /// Lists tasks, optionally filtered by project and epic.
    ///
    /// Corrupt entries are logged and skipped so one bad file cannot hide
    /// the rest of the project.
    pub async fn list_tasks(
        &self,
        project_id: Option<&str>,
        epic_id: Option<&str>,
    ) -> CoreResult<Vec<AtomicTask>> {
        let ids = self.index.read().await.ids_of_kind(EntityKind::Task);
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_task(&id).await {
                Ok(task) => {
                    if project_id.map_or(true, |p| task.project_id == p)
                        && epic_id.map_or(true, |e| task.epic_id == e)
                    {
                        tasks.push(task);
                    }
                }
                Err(CoreError::Corrupt { id, detail }) => {
                    warn!(%id, %detail, "skipping corrupt task during list");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(tasks)
    }

    /// Case-insensitive substring search over title, description, and tags.
    pub async fn search_tasks(
        &self,
        query: &str,
        project_id: Option<&str>,
    ) -> CoreResult<Vec<AtomicTask>> {
        let needle = query.to_lowercase();
        let tasks = self.list_tasks(project_id, None).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.description.to_lowercase().contains(&needle)
                    || t.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Tasks in a given status, optionally scoped to a project.
    pub async fn tasks_by_status(
        &self,
        status: TaskStatus,
        project_id: Option<&str>,
    ) -> CoreResult<Vec<AtomicTask>> {
        let tasks = self.list_tasks(project_id, None).await?;
        Ok(tasks.into_iter().filter(|t| t.status == status).collect())
    }

    /// Tasks at a given priority, optionally scoped to a project.
    pub async fn tasks_by_priority(
        &self,
        priority: TaskPriority,
        project_id: Option<&str>,
    ) -> CoreResult<Vec<AtomicTask>> {
        let tasks = self.list_tasks(project_id, None).await?;
        Ok(tasks.into_iter().filter(|t| t.priority == priority).collect())
    }

    //─────────────────────────────
    //  Dependencies
    //─────────────────────────────

    /// Persists a new dependency edge; rejects an existing ID.
    pub async fn create_dependency(&self, dependency: Dependency) -> CoreResult<Dependency> {
        dependency.validate()?;
        self.put(
            EntityKind::Dependency,
            &dependency.dependency_id.clone(),
            &dependency,
            true,
        )
        .await?;
        self.cache_put(
            &dependency.dependency_id.clone(),
            CachedEntity::Dependency(dependency.clone()),
        );
        Ok(dependency)
    }

    /// Loads a dependency by ID.
    pub async fn get_dependency(&self, id: &str) -> CoreResult<Dependency> {
        if let Some(CachedEntity::Dependency(d)) = self.cache_get(id) {
            return Ok(d);
        }
        let dependency: Dependency = self.fetch(EntityKind::Dependency, id).await?;
        self.cache_put(id, CachedEntity::Dependency(dependency.clone()));
        Ok(dependency)
    }

    /// Deletes a dependency record.
    pub async fn delete_dependency(&self, id: &str) -> CoreResult<()> {
        self.delete(id).await
    }

    /// Lists all dependency edges.
    pub async fn list_dependencies(&self) -> CoreResult<Vec<Dependency>> {
        let ids = self.index.read().await.ids_of_kind(EntityKind::Dependency);
        let mut edges = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_dependency(&id).await {
                Ok(dep) => edges.push(dep),
                Err(CoreError::Corrupt { id, detail }) => {
                    warn!(%id, %detail, "skipping corrupt dependency during list");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(edges)
    }

    //─────────────────────────────
    //  Dependency graphs
    //─────────────────────────────

    /// Persists the derived graph for a project, replacing any prior one.
    pub async fn save_dependency_graph(
        &self,
        project_id: &str,
        graph: &DependencyGraph,
    ) -> CoreResult<()> {
        let key = graph_key(project_id);
        let bytes = serde_json::to_vec_pretty(graph)
            .map_err(|e| CoreError::Internal(format!("serializing graph: {e}")))?;
        self.write_indexed(EntityKind::Graph, &key, project_id, bytes, false)
            .await
    }

    /// Loads the derived graph for a project.
    pub async fn load_dependency_graph(&self, project_id: &str) -> CoreResult<DependencyGraph> {
        let key = graph_key(project_id);
        let bytes = self.read_indexed(&key).await?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::Corrupt {
            id: key,
            detail: e.to_string(),
        })
    }

    //─────────────────────────────
    //  Internal plumbing
    //─────────────────────────────

    /// Serializes and writes one entity, enforcing create-vs-update
    /// existence semantics.
    async fn put<T: Serialize>(
        &self,
        kind: EntityKind,
        id: &str,
        value: &T,
        create: bool,
    ) -> CoreResult<()> {
        {
            let index = self.index.read().await;
            if create && index.contains(id) {
                return Err(CoreError::Conflict(format!("id {id} already exists")));
            }
            if !create && !index.contains(id) {
                return Err(CoreError::NotFound(id.to_string()));
            }
        }

        let compressed = kind == EntityKind::Task && self.compress;
        let bytes = match kind {
            EntityKind::Project | EntityKind::Epic => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| CoreError::Internal(format!("serializing {id}: {e}")))?,
            _ => serde_json::to_vec_pretty(value)
                .map_err(|e| CoreError::Internal(format!("serializing {id}: {e}")))?,
        };

        self.write_indexed(kind, id, id, bytes, compressed).await
    }

    /// Writes bytes for `id` at the canonical location of `file_id` and
    /// records the result in the index.
    async fn write_indexed(
        &self,
        kind: EntityKind,
        id: &str,
        file_id: &str,
        bytes: Vec<u8>,
        compressed: bool,
    ) -> CoreResult<()> {
        let rel = relative_path(kind, file_id, compressed);
        let abs = self
            .validator
            .validate(&self.write_root.join(&rel), AccessMode::Write)?;

        let stored = if compressed { gzip(&bytes)? } else { bytes };
        let checksum = checksum_bytes(&stored);
        write_atomic(&abs, &stored).await?;

        {
            let mut index = self.index.write().await;
            index.insert(
                id,
                IndexEntry {
                    kind,
                    file_path: rel,
                    size: stored.len() as u64,
                    last_modified: chrono::Utc::now(),
                    compressed,
                    checksum: Some(checksum),
                },
            );
            self.persist_index(&index).await?;
        }

        debug!(%id, ?kind, compressed, "entity persisted");
        Ok(())
    }

    /// Reads, verifies, and decompresses the bytes behind an indexed ID.
    async fn read_indexed(&self, id: &str) -> CoreResult<Vec<u8>> {
        let entry = self
            .index
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        let abs = self
            .validator
            .validate(&self.write_root.join(&entry.file_path), AccessMode::Read)?;
        let stored = tokio::fs::read(&abs).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(id.to_string())
            } else {
                CoreError::Internal(format!("reading {id}: {e}"))
            }
        })?;

        if let Some(expected) = &entry.checksum {
            let actual = checksum_bytes(&stored);
            if &actual != expected {
                warn!(%id, "checksum mismatch on read");
                return Err(CoreError::Corrupt {
                    id: id.to_string(),
                    detail: "checksum mismatch".into(),
                });
            }
        }

        if entry.compressed {
            gunzip(&stored).map_err(|_| CoreError::Corrupt {
                id: id.to_string(),
                detail: "gzip stream damaged".into(),
            })
        } else {
            Ok(stored)
        }
    }

    /// Loads and decodes one entity.
    async fn fetch<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> CoreResult<T> {
        let bytes = self.read_indexed(id).await?;
        let decoded = match kind {
            EntityKind::Project | EntityKind::Epic => serde_yaml::from_slice(&bytes)
                .map_err(|e| e.to_string()),
            _ => serde_json::from_slice(&bytes).map_err(|e| e.to_string()),
        };
        decoded.map_err(|detail| {
            warn!(%id, %detail, "entity failed schema validation");
            CoreError::Corrupt {
                id: id.to_string(),
                detail,
            }
        })
    }

    /// Removes an entity's file, index entry, and cache slot.
    async fn delete(&self, id: &str) -> CoreResult<()> {
        let entry = {
            let mut index = self.index.write().await;
            let entry = index
                .remove(id)
                .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
            self.persist_index(&index).await?;
            entry
        };

        let abs = self
            .validator
            .validate(&self.write_root.join(&entry.file_path), AccessMode::Write)?;
        match tokio::fs::remove_file(&abs).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::Internal(format!("deleting {id}: {e}"))),
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(id);
        }
        debug!(%id, "entity deleted");
        Ok(())
    }

    async fn persist_index(&self, index: &FileIndex) -> CoreResult<()> {
        let path = self.write_root.join(INDEX_FILE);
        let bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| CoreError::Internal(format!("serializing file index: {e}")))?;
        write_atomic(&path, &bytes).await
    }

    fn cache_get(&self, id: &str) -> Option<CachedEntity> {
        self.cache.lock().ok()?.get(id).cloned()
    }

    fn cache_put(&self, id: &str, entity: CachedEntity) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(id.to_string(), entity);
        }
    }
}

/// Index key for a project's derived graph; prefixed so it can never
/// collide with the project's own entry.
fn graph_key(project_id: &str) -> String {
    format!("graph:{project_id}")
}

/// Writes bytes atomically: temp file, fsync, rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::Internal(format!("creating {}: {e}", parent.display())))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| CoreError::Internal(format!("creating {}: {e}", tmp.display())))?;
    file.write_all(bytes)
        .await
        .map_err(|e| CoreError::Internal(format!("writing {}: {e}", tmp.display())))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::Internal(format!("syncing {}: {e}", tmp.display())))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CoreError::Internal(format!("renaming into {}: {e}", path.display())))
}

fn gzip(bytes: &[u8]) -> CoreResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| CoreError::Internal(format!("gzip: {e}")))
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_types::ErrorKind;
    use tempfile::TempDir;

    async fn engine(compress: bool) -> (TempDir, StorageEngine) {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path(), dir.path());
        config.compress_tasks = compress;
        let engine = StorageEngine::open(config).await.unwrap();
        (dir, engine)
    }

    fn task(id: &str) -> AtomicTask {
        let mut t = AtomicTask::new(id, "Wire login route", "Route POST /login", "P1", "P1-auth-epic");
        t.estimated_hours = 0.1;
        t.acceptance_criteria = vec!["route returns 200".into()];
        t
    }

    #[tokio::test]
    async fn task_round_trip() {
        let (_dir, engine) = engine(false).await;
        let t = task("T1");
        engine.create_task(t.clone()).await.unwrap();
        let loaded = engine.get_task("T1").await.unwrap();
        assert_eq!(t, loaded);
    }

    #[tokio::test]
    async fn compressed_task_round_trip() {
        let (dir, engine) = engine(true).await;
        let t = task("T1");
        engine.create_task(t.clone()).await.unwrap();
        assert!(dir.path().join("tasks/T1.json.gz").exists());
        let loaded = engine.get_task("T1").await.unwrap();
        assert_eq!(t, loaded);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let (_dir, engine) = engine(false).await;
        engine.create_task(task("T1")).await.unwrap();
        let err = engine.create_task(task("T1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let (_dir, engine) = engine(false).await;
        let err = engine.get_task("T404").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_requires_existing_entity() {
        let (_dir, engine) = engine(false).await;
        let err = engine.update_task(task("T9")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_file_and_index_entry() {
        let (dir, engine) = engine(false).await;
        engine.create_task(task("T1")).await.unwrap();
        engine.delete_task("T1").await.unwrap();
        assert!(!dir.path().join("tasks/T1.json").exists());
        assert!(!engine.exists("T1").await);
    }

    #[tokio::test]
    async fn corrupt_bytes_surface_as_corrupt() {
        let (dir, engine) = engine(false).await;
        engine.create_task(task("T1")).await.unwrap();
        // Rewrite the file behind the engine's back; the checksum trips.
        std::fs::write(dir.path().join("tasks/T1.json"), b"{ not json").unwrap();

        // Drop the hot cache by reopening.
        let engine = StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
            .await
            .unwrap();
        let err = engine.get_task("T1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let engine = StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
                .await
                .unwrap();
            engine.create_task(task("T1")).await.unwrap();
        }
        let engine = StorageEngine::open(StoreConfig::new(dir.path(), dir.path()))
            .await
            .unwrap();
        assert!(engine.exists("T1").await);
        assert_eq!(engine.get_task("T1").await.unwrap().task_id, "T1");
    }

    #[tokio::test]
    async fn list_filters_by_project_and_epic() {
        let (_dir, engine) = engine(false).await;
        engine.create_task(task("T1")).await.unwrap();
        let mut other = task("T2");
        other.project_id = "P2".into();
        other.epic_id = "P2-api-epic".into();
        engine.create_task(other).await.unwrap();

        let p1 = engine.list_tasks(Some("P1"), None).await.unwrap();
        assert_eq!(p1.len(), 1);
        let scoped = engine
            .list_tasks(Some("P2"), Some("P2-api-epic"))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        let all = engine.list_tasks(None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn search_matches_title_description_and_tags() {
        let (_dir, engine) = engine(false).await;
        let mut t = task("T1");
        t.tags = vec!["oauth".into()];
        engine.create_task(t).await.unwrap();

        assert_eq!(engine.search_tasks("LOGIN", None).await.unwrap().len(), 1);
        assert_eq!(engine.search_tasks("oauth", None).await.unwrap().len(), 1);
        assert_eq!(engine.search_tasks("billing", None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn graph_round_trip() {
        let (_dir, engine) = engine(false).await;
        let graph = DependencyGraph::empty("P1");
        engine.save_dependency_graph("P1", &graph).await.unwrap();
        let loaded = engine.load_dependency_graph("P1").await.unwrap();
        assert_eq!(graph, loaded);
    }

    #[tokio::test]
    async fn graph_key_never_shadows_project() {
        let (_dir, engine) = engine(false).await;
        let project = Project::new("P1", "One", "tester");
        engine.create_project(project).await.unwrap();
        let graph = DependencyGraph::empty("P1");
        engine.save_dependency_graph("P1", &graph).await.unwrap();

        assert!(engine.get_project("P1").await.is_ok());
        assert!(engine.load_dependency_graph("P1").await.is_ok());
    }

    #[tokio::test]
    async fn project_persists_as_yaml() {
        let (dir, engine) = engine(false).await;
        engine
            .create_project(Project::new("PID-WEB-001", "Web", "tester"))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("projects/PID-WEB-001.yaml")).unwrap();
        assert!(raw.contains("projectId: PID-WEB-001"));
    }
}
