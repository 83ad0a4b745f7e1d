//! Deterministic resource teardown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use taskforge_types::CoreResult;

/// A resource that can be released exactly once, idempotently.
#[async_trait]
pub trait Disposable: Send + Sync {
    /// Human-readable name for shutdown logs.
    fn name(&self) -> &str;

    /// Releases the resource. Must be safe to call more than once; errors
    /// are logged by the registry and never rethrown.
    async fn dispose(&self) -> CoreResult<()>;
}

/// Global shutdown order: disposables release in reverse registration
/// order.
#[derive(Default)]
pub struct DisposableRegistry {
    items: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl DisposableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a disposable; later registrations dispose first.
    pub async fn register(&self, disposable: Arc<dyn Disposable>) {
        debug!(name = disposable.name(), "disposable registered");
        self.items.lock().await.push(disposable);
    }

    /// Number of registered disposables.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Releases everything in reverse registration order. Errors are
    /// logged and swallowed so one bad teardown cannot block the rest.
    pub async fn dispose_all(&self) {
        let mut items = self.items.lock().await;
        info!(count = items.len(), "disposing registered resources");
        while let Some(disposable) = items.pop() {
            if let Err(e) = disposable.dispose().await {
                warn!(name = disposable.name(), error = %e, "dispose failed");
            }
        }
    }
}

/// Whether a timer fires once or repeatedly; the registry cancels each
/// kind accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once; cancelled only if it has not fired yet.
    OneShot,
    /// Fires until aborted.
    Interval,
}

/// A spawned timer task wrapped as a disposable.
pub struct TimerResource {
    name: String,
    kind: TimerKind,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerResource {
    /// Wraps a spawned timer task.
    pub fn new(name: impl Into<String>, kind: TimerKind, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            kind,
            handle: Mutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl Disposable for TimerResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispose(&self) -> CoreResult<()> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(()); // Already disposed.
        };
        match self.kind {
            TimerKind::Interval => {
                handle.abort();
                debug!(name = %self.name, "interval timer aborted");
            }
            TimerKind::OneShot => {
                if handle.is_finished() {
                    debug!(name = %self.name, "one-shot timer already fired");
                } else {
                    handle.abort();
                    debug!(name = %self.name, "pending one-shot timer cancelled");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use taskforge_types::CoreError;

    struct Tracker {
        name: String,
        order: Arc<Mutex<Vec<String>>>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Disposable for Tracker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn dispose(&self) -> CoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().await.push(self.name.clone());
            if self.fail {
                Err(CoreError::Internal("teardown exploded".into()))
            } else {
                Ok(())
            }
        }
    }

    fn tracker(name: &str, order: Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Tracker> {
        Arc::new(Tracker {
            name: name.to_string(),
            order,
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn disposes_in_reverse_registration_order() {
        let registry = DisposableRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        registry.register(tracker("first", order.clone(), false)).await;
        registry.register(tracker("second", order.clone(), false)).await;
        registry.register(tracker("third", order.clone(), false)).await;

        registry.dispose_all().await;
        assert_eq!(*order.lock().await, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn errors_do_not_stop_the_sweep() {
        let registry = DisposableRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        registry.register(tracker("a", order.clone(), false)).await;
        registry.register(tracker("b", order.clone(), true)).await;

        registry.dispose_all().await;
        assert_eq!(*order.lock().await, vec!["b", "a"]);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn timer_dispose_is_idempotent() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
        });
        let timer = TimerResource::new("reaper", TimerKind::Interval, handle);
        timer.dispose().await.unwrap();
        timer.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn finished_one_shot_is_left_alone() {
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        let timer = TimerResource::new("once", TimerKind::OneShot, handle);
        timer.dispose().await.unwrap();
    }
}
