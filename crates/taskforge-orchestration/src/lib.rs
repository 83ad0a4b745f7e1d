#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **taskforge-orchestration** – Matching ready tasks to a heterogeneous
//! agent fleet.
//!
//! ## Architecture
//!
//! - [`AgentRegistry`]: the authoritative agent list: identity,
//!   capabilities, transports, heartbeats.
//! - [`AgentOrchestrator`]: the dispatch view: task load, assignment,
//!   heartbeat-timeout requeue. Mutations to task and agent state happen
//!   under ordered write locks.
//! - [`IntegrationBridge`]: the only component allowed to write across
//!   both views; registration, reconciliation, and delta propagation are
//!   idempotent and guarded against re-entry.
//! - [`transport`]: four wire shapes (stdio, SSE, WebSocket, HTTP) behind
//!   one dispatch contract.

pub mod bridge;
pub mod orchestrator;
pub mod registry;
pub mod transport;

pub use bridge::{IntegrationBridge, SyncSource};
pub use orchestrator::{AgentOrchestrator, OrchestratorConfig};
pub use registry::AgentRegistry;
pub use transport::{
    AgentTransport, DispatchPayload, Envelope, EnvelopeType, HttpTransport, SseTransport,
    StdioTransport, TransportEvent, TransportRouter, WebSocketTransport,
};
