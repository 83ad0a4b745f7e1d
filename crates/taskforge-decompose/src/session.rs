//! Decomposition session ownership.
//!
//! Each session is owned by the worker that started it; other workers
//! observe or cancel it through this manager. Leaves persist in oracle
//! order, and cancellation reverts every task the session already wrote.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use taskforge_oracle::ProjectContext;
use taskforge_store::StorageEngine;
use taskforge_types::{
    AtomicTask, CoreError, CoreResult, DecompositionSession, SessionStatus,
};

use crate::engine::RddEngine;

struct SessionSlot {
    session: DecompositionSession,
    cancelled: Arc<AtomicBool>,
}

/// Owns every live [`DecompositionSession`].
pub struct SessionManager {
    engine: Arc<RddEngine>,
    store: Arc<StorageEngine>,
    sessions: DashMap<String, SessionSlot>,
}

impl SessionManager {
    /// Creates a session manager over the engine and store.
    pub fn new(engine: Arc<RddEngine>, store: Arc<StorageEngine>) -> Self {
        Self {
            engine,
            store,
            sessions: DashMap::new(),
        }
    }

    /// Runs a full decomposition session over a root task: decompose,
    /// persist leaves in order, record outcomes.
    ///
    /// A root that is already atomic completes with an empty
    /// `persisted_tasks` list. On failure or cancellation every task this
    /// session wrote is deleted again.
    pub async fn run_decomposition(
        &self,
        root_task: AtomicTask,
        context: &ProjectContext,
    ) -> CoreResult<DecompositionSession> {
        let session_id = Uuid::new_v4().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut session = DecompositionSession::new(session_id.clone(), root_task.clone());
        session.status = SessionStatus::Running;
        self.sessions.insert(
            session_id.clone(),
            SessionSlot {
                session: session.clone(),
                cancelled: cancelled.clone(),
            },
        );
        info!(session = %session_id, root = %root_task.task_id, "decomposition session started");

        let outcome = self
            .drive(&mut session, &root_task, context, &cancelled)
            .await;

        match outcome {
            Ok(()) => {
                session.finish(SessionStatus::Completed);
            }
            Err(ref e) => {
                warn!(session = %session_id, error = %e, "session failed; reverting persisted tasks");
                self.revert(&mut session).await;
                session.finish(SessionStatus::Failed);
            }
        }

        self.sessions.insert(
            session_id.clone(),
            SessionSlot {
                session: session.clone(),
                cancelled,
            },
        );
        outcome.map(|()| session)
    }

    async fn drive(
        &self,
        session: &mut DecompositionSession,
        root_task: &AtomicTask,
        context: &ProjectContext,
        cancelled: &AtomicBool,
    ) -> CoreResult<()> {
        let result = self.engine.decompose_task(root_task, context).await?;
        if cancelled.load(Ordering::SeqCst) {
            return Err(CoreError::Cancelled);
        }

        if result.is_atomic {
            // An atomic root yields no leaves; the session closes empty.
            session.progress = 100;
            session.rich_results = result.outcomes;
            return Ok(());
        }

        let total = result.sub_tasks.len();
        for (i, leaf) in result.sub_tasks.into_iter().enumerate() {
            if cancelled.load(Ordering::SeqCst) {
                return Err(CoreError::Cancelled);
            }
            let leaf = self.store.create_task(leaf).await?;
            session.persisted_tasks.push(leaf.task_id.clone());
            session.progress = (((i + 1) * 100) / total.max(1)) as u8;
            self.publish(session);
        }
        session.rich_results = result.outcomes;
        Ok(())
    }

    /// Deletes everything the session persisted, in reverse order.
    async fn revert(&self, session: &mut DecompositionSession) {
        while let Some(task_id) = session.persisted_tasks.pop() {
            if let Err(e) = self.store.delete_task(&task_id).await {
                warn!(%task_id, error = %e, "failed to revert persisted task");
            }
        }
    }

    fn publish(&self, session: &DecompositionSession) {
        if let Some(mut slot) = self.sessions.get_mut(&session.id) {
            slot.session = session.clone();
        }
    }

    /// A snapshot of a session.
    pub fn get_session(&self, session_id: &str) -> Option<DecompositionSession> {
        self.sessions.get(session_id).map(|s| s.session.clone())
    }

    /// Requests cooperative cancellation of a running session. In-flight
    /// oracle calls run to completion; their results are discarded.
    pub fn cancel(&self, session_id: &str) -> CoreResult<()> {
        let slot = self
            .sessions
            .get(session_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;
        slot.cancelled.store(true, Ordering::SeqCst);
        info!(session = %session_id, "cancellation requested");
        Ok(())
    }

    /// IDs of all sessions the manager knows about.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}
