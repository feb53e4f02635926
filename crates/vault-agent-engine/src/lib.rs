//! Sync engine and process lifecycle orchestration (component C6): owns
//! the target registry, fans channel events out to the other subsystems,
//! runs the initial-sync/poll-fallback loop, drives graceful shutdown, and
//! hosts the optional health HTTP surface.

mod engine;
mod health;
mod hooks;
mod registry;
mod state;

pub use engine::{SyncEngine, DEFAULT_POLL_INTERVAL};
pub use health::{router, HealthState};
pub use hooks::CompositeHooks;
pub use registry::TargetRegistry;
pub use state::{EngineState, StateMachine, StateTransition};
