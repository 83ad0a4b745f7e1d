//! Token-keyed service container.
//!
//! Services declare their dependencies at registration, which is where
//! cycles are caught: a dependency cycle is a wiring bug, not something
//! to branch around at runtime with fallback stubs. Lifecycles are
//! explicit: one shared instance (`Singleton`), a fresh instance per
//! resolution (`Transient`), or one instance per [`Scope`] (`Scoped`).

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use taskforge_types::{CoreError, CoreResult};

/// Instance sharing policy for a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// One instance for the container's lifetime.
    Singleton,
    /// A fresh instance on every resolution.
    Transient,
    /// One instance per scope.
    Scoped,
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> CoreResult<Instance> + Send + Sync>;

struct Registration {
    lifecycle: Lifecycle,
    dependencies: Vec<String>,
    factory: Factory,
}

/// The service container.
#[derive(Default)]
pub struct Container {
    registrations: Mutex<HashMap<String, Registration>>,
    singletons: Mutex<HashMap<String, Instance>>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under a token with declared dependencies.
    ///
    /// Fails with `Conflict` when the token is taken or when the declared
    /// edges close a dependency cycle; a failed registration leaves the
    /// container unchanged.
    pub fn register<T, F>(
        &self,
        token: &str,
        lifecycle: Lifecycle,
        dependencies: &[&str],
        factory: F,
    ) -> CoreResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> CoreResult<T> + Send + Sync + 'static,
    {
        let mut registrations = self.lock_registrations()?;
        if registrations.contains_key(token) {
            return Err(CoreError::Conflict(format!(
                "service token {token:?} is already registered"
            )));
        }

        registrations.insert(
            token.to_string(),
            Registration {
                lifecycle,
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                factory: Arc::new(move |container| {
                    factory(container).map(|value| Arc::new(value) as Instance)
                }),
            },
        );

        if let Some(cycle) = find_cycle(&registrations, token) {
            registrations.remove(token);
            return Err(CoreError::Conflict(format!(
                "registering {token:?} closes a dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }

        debug!(token, ?lifecycle, "service registered");
        Ok(())
    }

    /// Resolves a service by token.
    ///
    /// Singletons are constructed once and shared; transients are built on
    /// every call. Scoped services cannot be resolved from the root
    /// container; use a [`Scope`].
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &str) -> CoreResult<Arc<T>> {
        let (lifecycle, factory) = self.registration_of(token)?;
        match lifecycle {
            Lifecycle::Singleton => {
                if let Some(existing) = self.lock_singletons()?.get(token).cloned() {
                    return downcast(token, existing);
                }
                let instance = factory(self)?;
                self.lock_singletons()?
                    .insert(token.to_string(), instance.clone());
                downcast(token, instance)
            }
            Lifecycle::Transient => downcast(token, factory(self)?),
            Lifecycle::Scoped => Err(CoreError::Validation(format!(
                "service {token:?} is scoped; resolve it through a scope"
            ))),
        }
    }

    /// Opens a resolution scope: scoped services resolved through it are
    /// shared within the scope and dropped with it.
    pub fn create_scope(&self) -> Scope<'_> {
        Scope {
            container: self,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn registration_of(&self, token: &str) -> CoreResult<(Lifecycle, Factory)> {
        let registrations = self.lock_registrations()?;
        let registration = registrations
            .get(token)
            .ok_or_else(|| CoreError::NotFound(format!("service token {token:?}")))?;
        Ok((registration.lifecycle, registration.factory.clone()))
    }

    fn lock_registrations(
        &self,
    ) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, Registration>>> {
        self.registrations
            .lock()
            .map_err(|_| CoreError::Internal("container registration table poisoned".into()))
    }

    fn lock_singletons(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, Instance>>> {
        self.singletons
            .lock()
            .map_err(|_| CoreError::Internal("container singleton table poisoned".into()))
    }
}

/// A resolution scope over a container.
pub struct Scope<'c> {
    container: &'c Container,
    cache: Mutex<HashMap<String, Instance>>,
}

impl Scope<'_> {
    /// Resolves a service; scoped instances are cached per scope, other
    /// lifecycles defer to the container.
    pub fn resolve<T: Send + Sync + 'static>(&self, token: &str) -> CoreResult<Arc<T>> {
        let (lifecycle, factory) = self.container.registration_of(token)?;
        if lifecycle != Lifecycle::Scoped {
            return self.container.resolve(token);
        }

        if let Some(existing) = self
            .cache
            .lock()
            .map_err(|_| CoreError::Internal("scope cache poisoned".into()))?
            .get(token)
            .cloned()
        {
            return downcast(token, existing);
        }
        let instance = factory(self.container)?;
        self.cache
            .lock()
            .map_err(|_| CoreError::Internal("scope cache poisoned".into()))?
            .insert(token.to_string(), instance.clone());
        downcast(token, instance)
    }
}

fn downcast<T: Send + Sync + 'static>(token: &str, instance: Instance) -> CoreResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        CoreError::Internal(format!(
            "service {token:?} resolved to an unexpected concrete type"
        ))
    })
}

/// Finds a dependency cycle reachable from `start` among registered
/// tokens, returning the token path when one exists.
fn find_cycle(
    registrations: &HashMap<String, Registration>,
    start: &str,
) -> Option<Vec<String>> {
    fn dfs(
        node: &str,
        registrations: &HashMap<String, Registration>,
        stack: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }
        stack.push(node.to_string());
        if let Some(registration) = registrations.get(node) {
            for dep in &registration.dependencies {
                if let Some(cycle) = dfs(dep, registrations, stack, visited) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        visited.insert(node.to_string());
        None
    }

    dfs(start, registrations, &mut Vec::new(), &mut HashSet::new())
}
