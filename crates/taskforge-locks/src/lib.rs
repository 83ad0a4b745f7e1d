#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-locks** – Per-resource read/write locks for the Taskforge core.
//!
//! The lock table is keyed by resource strings (`project:<id>`,
//! `epic:<id>`, `task:<id>`, `dependency:<id>`, `agent:<id>`). Read locks
//! compose; write locks are exclusive; waiters queue FIFO with per-acquire
//! timeouts. A wait-for graph over blocked acquirers is walked on demand or
//! on a detector interval, and a detected cycle fails the most-recently-
//! blocked acquirer with `Deadlock`.
//!
//! Composite acquisitions go through [`LockManager::acquire_many`], which
//! enforces the fixed global order `project → epic → task → dependency →
//! agent` and releases in reverse order on every exit path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskforge_types::{CoreError, CoreResult};

/// Default acquire timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard ceiling on any acquire timeout.
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Sharing mode of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared; composes with other read locks.
    Read,
    /// Exclusive.
    Write,
}

/// A granted lock. Releasing it exactly once is the caller's obligation;
/// [`LockGuard`] does it on drop.
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// Unique lock identifier.
    pub id: String,
    /// Resource string the lock covers.
    pub resource: String,
    /// Identity of the holder.
    pub holder: String,
    /// Sharing mode.
    pub mode: LockMode,
    /// Grant timestamp.
    pub acquired_at: DateTime<Utc>,
}

/// What happened in an audited lock-table event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Lock granted.
    Acquired,
    /// Lock released.
    Released,
    /// Acquire failed (timeout or deadlock).
    Denied,
}

/// One entry in the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Lock identifier, when one was granted.
    pub lock_id: Option<String>,
    /// Resource string.
    pub resource: String,
    /// Holder identity.
    pub holder: String,
    /// Sharing mode requested.
    pub mode: LockMode,
    /// What happened.
    pub action: AuditAction,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Lock manager configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Timeout applied when an acquire does not specify one.
    pub default_timeout: Duration,
    /// Whether acquire/release events are appended to the audit trail.
    pub audit_enabled: bool,
    /// Cadence of the background deadlock detector and reaper.
    pub cleanup_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_LOCK_TIMEOUT,
            audit_enabled: true,
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

struct Waiter {
    holder: String,
    mode: LockMode,
    seq: u64,
    tx: oneshot::Sender<CoreResult<LockHandle>>,
}

#[derive(Default)]
struct Held {
    mode: Option<LockMode>,
    // (lock_id, holder) pairs; a write entry holds exactly one.
    holders: Vec<(String, String)>,
}

#[derive(Default)]
struct TableState {
    held: HashMap<String, Held>,
    waiters: HashMap<String, VecDeque<Waiter>>,
    records: HashMap<String, LockHandle>,
    live_holders: HashSet<String>,
    audit: Vec<AuditRecord>,
    next_seq: u64,
}

/// The per-resource lock table.
///
/// All table operations run under one internal mutex and are constant time
/// in the number of resources; waiting happens outside the mutex on a
/// oneshot channel.
pub struct LockManager {
    state: Mutex<TableState>,
    config: LockConfig,
}

impl LockManager {
    /// Creates a lock manager with the given configuration.
    pub fn new(config: LockConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TableState::default()),
            config,
        })
    }

    /// Acquires a lock, waiting up to `timeout` (clamped to the ceiling;
    /// the configured default when `None`).
    pub async fn acquire(
        self: &Arc<Self>,
        resource: &str,
        holder: &str,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> CoreResult<LockHandle> {
        let timeout = timeout
            .unwrap_or(self.config.default_timeout)
            .min(MAX_LOCK_TIMEOUT);

        let rx = {
            let mut state = self.lock_state()?;
            state.live_holders.insert(holder.to_string());

            if Self::grantable(&state, resource, mode) {
                let handle = Self::grant(&mut state, resource, holder, mode, self.config.audit_enabled);
                return Ok(handle);
            }

            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .waiters
                .entry(resource.to_string())
                .or_default()
                .push_back(Waiter {
                    holder: holder.to_string(),
                    mode,
                    seq,
                    tx,
                });
            debug!(resource, holder, ?mode, "lock contended; queued");
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Internal(format!(
                "lock table dropped waiter for {resource}"
            ))),
            Err(_) => {
                self.remove_waiter(resource, holder)?;
                self.audit(None, resource, holder, mode, AuditAction::Denied);
                Err(CoreError::LockTimeout {
                    resource: resource.to_string(),
                    holder: holder.to_string(),
                })
            }
        }
    }

    /// Acquires a write lock wrapped in a guard that releases on drop.
    pub async fn write_guard(
        self: &Arc<Self>,
        resource: &str,
        holder: &str,
        timeout: Option<Duration>,
    ) -> CoreResult<LockGuard> {
        let handle = self
            .acquire(resource, holder, LockMode::Write, timeout)
            .await?;
        Ok(LockGuard::new(self.clone(), handle))
    }

    /// Acquires several locks in the fixed global resource order, releasing
    /// everything already held if any acquisition fails.
    pub async fn acquire_many(
        self: &Arc<Self>,
        resources: &[(&str, LockMode)],
        holder: &str,
        timeout: Option<Duration>,
    ) -> CoreResult<LockSet> {
        let mut ordered: Vec<(&str, LockMode)> = resources.to_vec();
        ordered.sort_by_key(|(resource, _)| (resource_class(resource), resource.to_string()));

        let mut guards = Vec::with_capacity(ordered.len());
        for (resource, mode) in ordered {
            match self.acquire(resource, holder, mode, timeout).await {
                Ok(handle) => guards.push(LockGuard::new(self.clone(), handle)),
                Err(e) => {
                    // Guards drop in reverse push order when the Vec unwinds.
                    while let Some(guard) = guards.pop() {
                        guard.release();
                    }
                    return Err(e);
                }
            }
        }
        Ok(LockSet { guards })
    }

    /// Releases a previously granted lock. Exactly one release per acquire;
    /// a second release of the same ID is `NotFound`.
    pub fn release(&self, lock_id: &str) -> CoreResult<()> {
        let mut state = self.lock_state()?;
        let handle = state
            .records
            .remove(lock_id)
            .ok_or_else(|| CoreError::NotFound(format!("lock {lock_id}")))?;

        if let Some(held) = state.held.get_mut(&handle.resource) {
            held.holders.retain(|(id, _)| id != lock_id);
            if held.holders.is_empty() {
                state.held.remove(&handle.resource);
            }
        }
        if self.config.audit_enabled {
            let record = AuditRecord {
                lock_id: Some(handle.id.clone()),
                resource: handle.resource.clone(),
                holder: handle.holder.clone(),
                mode: handle.mode,
                action: AuditAction::Released,
                at: Utc::now(),
            };
            state.audit.push(record);
        }
        Self::promote_waiters(&mut state, &handle.resource, self.config.audit_enabled);
        debug!(resource = %handle.resource, holder = %handle.holder, "lock released");
        Ok(())
    }

    /// Walks the wait-for graph once; when a cycle is found, the most
    /// recently blocked acquirer in it fails with `Deadlock`.
    ///
    /// Returns the number of waits aborted.
    pub fn detect_deadlocks(&self) -> CoreResult<usize> {
        let mut state = self.lock_state()?;

        // holder -> holders it waits on, via the resources they hold.
        let mut edges: HashMap<String, HashSet<String>> = HashMap::new();
        for (resource, queue) in &state.waiters {
            if let Some(held) = state.held.get(resource) {
                for waiter in queue {
                    let entry = edges.entry(waiter.holder.clone()).or_default();
                    for (_, owner) in &held.holders {
                        if owner != &waiter.holder {
                            entry.insert(owner.clone());
                        }
                    }
                }
            }
        }

        let cycle_members = find_cycle_members(&edges);
        if cycle_members.is_empty() {
            return Ok(0);
        }

        // Abort the most recently blocked waiter among cycle members.
        let mut victim: Option<(String, u64)> = None;
        for (resource, queue) in &state.waiters {
            for waiter in queue {
                if cycle_members.contains(&waiter.holder) {
                    if victim.as_ref().map_or(true, |(_, seq)| waiter.seq > *seq) {
                        victim = Some((resource.clone(), waiter.seq));
                    }
                }
            }
        }

        let Some((resource, seq)) = victim else {
            return Ok(0);
        };
        let queue = state.waiters.get_mut(&resource).expect("victim resource queue");
        let pos = queue
            .iter()
            .position(|w| w.seq == seq)
            .expect("victim still queued");
        let waiter = queue.remove(pos).expect("position valid");
        if queue.is_empty() {
            state.waiters.remove(&resource);
        }

        warn!(
            resource,
            holder = %waiter.holder,
            "deadlock detected; aborting most recently blocked acquirer"
        );
        if self.config.audit_enabled {
            let record = AuditRecord {
                lock_id: None,
                resource: resource.clone(),
                holder: waiter.holder.clone(),
                mode: waiter.mode,
                action: AuditAction::Denied,
                at: Utc::now(),
            };
            state.audit.push(record);
        }
        let _ = waiter.tx.send(Err(CoreError::Deadlock {
            resource,
            holder: waiter.holder.clone(),
        }));
        Ok(1)
    }

    /// Marks a holder as gone; its locks become reapable.
    pub fn mark_holder_gone(&self, holder: &str) -> CoreResult<()> {
        self.lock_state()?.live_holders.remove(holder);
        Ok(())
    }

    /// Releases every lock whose holder has disappeared. Returns the number
    /// of locks reaped.
    pub fn reap_orphaned(&self) -> CoreResult<usize> {
        let orphaned: Vec<String> = {
            let state = self.lock_state()?;
            state
                .records
                .values()
                .filter(|h| !state.live_holders.contains(&h.holder))
                .map(|h| h.id.clone())
                .collect()
        };
        let count = orphaned.len();
        for lock_id in orphaned {
            if let Err(e) = self.release(&lock_id) {
                warn!(%lock_id, error = %e, "failed to reap orphaned lock");
            }
        }
        if count > 0 {
            info!(count, "reaped orphaned locks");
        }
        Ok(count)
    }

    /// Spawns the periodic detector + reaper. The returned handle aborts
    /// the loop when dropped into the disposable registry.
    pub fn start_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = manager.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let _ = manager.detect_deadlocks();
                let _ = manager.reap_orphaned();
            }
        })
    }

    /// A copy of the audit trail.
    pub fn audit_trail(&self) -> CoreResult<Vec<AuditRecord>> {
        Ok(self.lock_state()?.audit.clone())
    }

    /// Number of currently held locks.
    pub fn held_count(&self) -> CoreResult<usize> {
        Ok(self.lock_state()?.records.len())
    }

    fn grantable(state: &TableState, resource: &str, mode: LockMode) -> bool {
        let queued = state.waiters.get(resource).map_or(false, |q| !q.is_empty());
        if queued {
            // FIFO fairness: never jump an existing queue.
            return false;
        }
        match state.held.get(resource) {
            None => true,
            Some(held) => mode == LockMode::Read && held.mode == Some(LockMode::Read),
        }
    }

    fn grant(
        state: &mut TableState,
        resource: &str,
        holder: &str,
        mode: LockMode,
        audit: bool,
    ) -> LockHandle {
        let handle = LockHandle {
            id: Uuid::new_v4().to_string(),
            resource: resource.to_string(),
            holder: holder.to_string(),
            mode,
            acquired_at: Utc::now(),
        };
        let held = state.held.entry(resource.to_string()).or_default();
        held.mode = Some(mode);
        held.holders.push((handle.id.clone(), holder.to_string()));
        state.records.insert(handle.id.clone(), handle.clone());
        if audit {
            state.audit.push(AuditRecord {
                lock_id: Some(handle.id.clone()),
                resource: resource.to_string(),
                holder: holder.to_string(),
                mode,
                action: AuditAction::Acquired,
                at: handle.acquired_at,
            });
        }
        handle
    }

    /// Hands the resource to the next waiter(s): one writer, or every
    /// leading reader.
    fn promote_waiters(state: &mut TableState, resource: &str, audit: bool) {
        loop {
            let Some(queue) = state.waiters.get_mut(resource) else {
                return;
            };
            let Some(front_mode) = queue.front().map(|w| w.mode) else {
                state.waiters.remove(resource);
                return;
            };

            let can_grant = match state.held.get(resource) {
                None => true,
                Some(held) => {
                    front_mode == LockMode::Read && held.mode == Some(LockMode::Read)
                }
            };
            if !can_grant {
                return;
            }

            let waiter = state
                .waiters
                .get_mut(resource)
                .and_then(|q| q.pop_front())
                .expect("front checked above");
            let handle = Self::grant(state, resource, &waiter.holder, waiter.mode, audit);
            if let Err(unsent) = waiter.tx.send(Ok(handle)) {
                // The waiter timed out while being granted; undo so the
                // lock is not stranded, then keep promoting.
                if let Ok(handle) = unsent {
                    state.records.remove(&handle.id);
                    if let Some(held) = state.held.get_mut(&handle.resource) {
                        held.holders.retain(|(id, _)| id != &handle.id);
                        if held.holders.is_empty() {
                            state.held.remove(&handle.resource);
                        }
                    }
                }
                continue;
            }

            if front_mode == LockMode::Write {
                return;
            }
        }
    }

    fn remove_waiter(&self, resource: &str, holder: &str) -> CoreResult<()> {
        let mut state = self.lock_state()?;
        if let Some(queue) = state.waiters.get_mut(resource) {
            if let Some(pos) = queue.iter().position(|w| w.holder == holder) {
                queue.remove(pos);
            }
            if queue.is_empty() {
                state.waiters.remove(resource);
            }
        }
        Ok(())
    }

    fn audit(
        &self,
        lock_id: Option<String>,
        resource: &str,
        holder: &str,
        mode: LockMode,
        action: AuditAction,
    ) {
        if !self.config.audit_enabled {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.audit.push(AuditRecord {
                lock_id,
                resource: resource.to_string(),
                holder: holder.to_string(),
                mode,
                action,
                at: Utc::now(),
            });
        }
    }

    fn lock_state(&self) -> CoreResult<std::sync::MutexGuard<'_, TableState>> {
        self.state
            .lock()
            .map_err(|_| CoreError::Internal("lock table mutex poisoned".into()))
    }
}

/// RAII wrapper guaranteeing exactly one release per acquire.
pub struct LockGuard {
    manager: Arc<LockManager>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    fn new(manager: Arc<LockManager>, handle: LockHandle) -> Self {
        Self {
            manager,
            handle: Some(handle),
        }
    }

    /// The wrapped handle.
    pub fn handle(&self) -> &LockHandle {
        self.handle.as_ref().expect("guard not yet released")
    }

    /// Releases the lock now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.manager.release(&handle.id) {
                warn!(lock_id = %handle.id, error = %e, "guard release failed");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// A composite acquisition; releases in reverse acquisition order on drop.
pub struct LockSet {
    guards: Vec<LockGuard>,
}

impl std::fmt::Debug for LockSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockSet")
            .field("len", &self.guards.len())
            .finish()
    }
}

impl LockSet {
    /// Handles of all held locks, in acquisition order.
    pub fn handles(&self) -> Vec<&LockHandle> {
        self.guards.iter().map(|g| g.handle()).collect()
    }

    /// Releases all locks now, in reverse acquisition order.
    pub fn release_all(mut self) {
        while let Some(guard) = self.guards.pop() {
            guard.release();
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Position of a resource class in the global acquisition order.
fn resource_class(resource: &str) -> u8 {
    match resource.split(':').next().unwrap_or("") {
        "project" => 0,
        "epic" => 1,
        "task" => 2,
        "dependency" => 3,
        "agent" => 4,
        _ => 5,
    }
}

/// Holders that participate in at least one wait-for cycle.
fn find_cycle_members(edges: &HashMap<String, HashSet<String>>) -> HashSet<String> {
    let mut members = HashSet::new();
    let mut visited = HashSet::new();

    fn dfs(
        node: &str,
        edges: &HashMap<String, HashSet<String>>,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
        members: &mut HashSet<String>,
    ) {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            for member in &stack[pos..] {
                members.insert(member.clone());
            }
            return;
        }
        if visited.contains(node) {
            return;
        }
        stack.push(node.to_string());
        if let Some(next) = edges.get(node) {
            for n in next {
                dfs(n, edges, visited, stack, members);
            }
        }
        stack.pop();
        visited.insert(node.to_string());
    }

    for node in edges.keys() {
        let mut stack = Vec::new();
        dfs(node, edges, &mut visited, &mut stack, &mut members);
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_types::ErrorKind;

    fn manager() -> Arc<LockManager> {
        LockManager::new(LockConfig::default())
    }

    #[tokio::test]
    async fn read_locks_compose() {
        let m = manager();
        let a = m.acquire("task:T1", "alpha", LockMode::Read, None).await.unwrap();
        let b = m.acquire("task:T1", "beta", LockMode::Read, None).await.unwrap();
        assert_eq!(m.held_count().unwrap(), 2);
        m.release(&a.id).unwrap();
        m.release(&b.id).unwrap();
        assert_eq!(m.held_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn write_lock_excludes_and_promotes() {
        let m = manager();
        let a = m.acquire("task:T1", "alpha", LockMode::Write, None).await.unwrap();

        let m2 = m.clone();
        let waiter = tokio::spawn(async move {
            m2.acquire("task:T1", "beta", LockMode::Write, None).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        m.release(&a.id).unwrap();
        let b = waiter.await.unwrap().unwrap();
        assert_eq!(b.holder, "beta");
        m.release(&b.id).unwrap();
    }

    #[tokio::test]
    async fn contended_acquire_times_out() {
        let m = manager();
        let _a = m.acquire("task:T1", "alpha", LockMode::Write, None).await.unwrap();
        let err = m
            .acquire("task:T1", "beta", LockMode::Write, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
    }

    #[tokio::test]
    async fn double_release_is_not_found() {
        let m = manager();
        let a = m.acquire("task:T1", "alpha", LockMode::Write, None).await.unwrap();
        m.release(&a.id).unwrap();
        assert_eq!(m.release(&a.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deadlock_aborts_most_recently_blocked() {
        let m = manager();
        let _a = m.acquire("task:T1", "alpha", LockMode::Write, None).await.unwrap();
        let _b = m.acquire("task:T2", "beta", LockMode::Write, None).await.unwrap();

        // alpha blocks on T2, then beta blocks on T1: classic cross wait.
        let m1 = m.clone();
        let first = tokio::spawn(async move {
            m1.acquire("task:T2", "alpha", LockMode::Write, Some(Duration::from_secs(5))).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let m2 = m.clone();
        let second = tokio::spawn(async move {
            m2.acquire("task:T1", "beta", LockMode::Write, Some(Duration::from_secs(5))).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let aborted = m.detect_deadlocks().unwrap();
        assert_eq!(aborted, 1);

        // beta blocked last, so beta's wait fails.
        let err = second.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deadlock);

        // alpha's wait completes once beta's write lock on T2... is still
        // held; release beta's original lock to unblock alpha.
        m.release(&_b.id).unwrap();
        let granted = first.await.unwrap().unwrap();
        assert_eq!(granted.holder, "alpha");
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let m = manager();
        {
            let _guard = m.write_guard("task:T1", "alpha", None).await.unwrap();
            assert_eq!(m.held_count().unwrap(), 1);
        }
        assert_eq!(m.held_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn acquire_many_follows_global_order() {
        let m = manager();
        let set = m
            .acquire_many(
                &[
                    ("agent:A1", LockMode::Write),
                    ("project:P1", LockMode::Read),
                    ("task:T1", LockMode::Write),
                ],
                "alpha",
                None,
            )
            .await
            .unwrap();

        let order: Vec<&str> = set.handles().iter().map(|h| h.resource.as_str()).collect();
        assert_eq!(order, vec!["project:P1", "task:T1", "agent:A1"]);
        set.release_all();
        assert_eq!(m.held_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn acquire_many_rolls_back_on_failure() {
        let m = manager();
        let _held = m.acquire("task:T1", "other", LockMode::Write, None).await.unwrap();

        let err = m
            .acquire_many(
                &[("project:P1", LockMode::Write), ("task:T1", LockMode::Write)],
                "alpha",
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        // The project lock taken first was rolled back.
        assert_eq!(m.held_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn reaper_releases_orphaned_locks() {
        let m = manager();
        let _a = m.acquire("task:T1", "ghost", LockMode::Write, None).await.unwrap();
        m.mark_holder_gone("ghost").unwrap();
        assert_eq!(m.reap_orphaned().unwrap(), 1);
        assert_eq!(m.held_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn audit_trail_records_lifecycle() {
        let m = manager();
        let a = m.acquire("task:T1", "alpha", LockMode::Write, None).await.unwrap();
        m.release(&a.id).unwrap();
        let trail = m.audit_trail().unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::Acquired);
        assert_eq!(trail[1].action, AuditAction::Released);
    }
}
