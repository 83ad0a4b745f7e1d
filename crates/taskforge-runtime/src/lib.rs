#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-runtime** – Wiring and teardown for the Taskforge core.
//!
//! Services resolve through a token-keyed [`Container`] instead of
//! process-global singletons: lifecycles are explicit
//! (singleton/transient/scoped), dependency cycles are a registration
//! error rather than a runtime branch, and every long-lived object lands
//! in the [`DisposableRegistry`] for reverse-order shutdown.
//! Configuration is read from the environment exactly once into
//! [`CoreConfig`] and passed explicitly from there on.

pub mod config;
pub mod container;
pub mod disposable;

pub use config::CoreConfig;
pub use container::{Container, Lifecycle, Scope};
pub use disposable::{Disposable, DisposableRegistry, TimerKind, TimerResource};
