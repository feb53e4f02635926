//! Health check response types.
//!
//! The HTTP surface (axum router) lives in `vault-agent-engine`; this module
//! only defines the payload shape so every crate can report into it without
//! depending on the web framework.

use serde::Serialize;

/// Overall liveness/readiness snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub vault_reachable: bool,
    pub websocket_state: String,
    pub last_sync_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthResponse {
    pub fn new(vault_reachable: bool, websocket_state: impl Into<String>, uptime_secs: u64) -> Self {
        let websocket_state = websocket_state.into();
        let status = if vault_reachable && websocket_state == "open" {
            HealthStatus::Healthy
        } else if vault_reachable {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            vault_reachable,
            websocket_state,
            last_sync_at: None,
        }
    }

    pub fn with_last_sync(mut self, ts: impl Into<String>) -> Self {
        self.last_sync_at = Some(ts.into());
        self
    }
}
