//! Managed-key rotation controller (component C7).

mod controller;
mod schedule;
mod state;

pub use controller::{ManagedKeyController, RotationTracking};
pub use schedule::{grace_poll_delay, next_refresh_delay, retry_delay, MAX_RETRY_ATTEMPTS};
pub use state::{RefreshSource, RotationState, StateMachine};
