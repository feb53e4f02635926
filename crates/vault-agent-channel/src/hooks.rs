//! Callbacks the Managed-Key Controller (C7) and Sync Engine (C6) register
//! against the channel.

use async_trait::async_trait;

use crate::dto::Topic;

#[async_trait]
pub trait ChannelHooks: Send + Sync {
    /// Fired once per successful WS open, after the attempt counter resets.
    async fn on_reconnected(&self);

    /// Fired when the WS upgrade itself fails with HTTP 401 — a stale
    /// stored key, not a transient network problem.
    async fn on_auth_failure(&self);

    /// Fired for every `event{topic, data}` message.
    async fn on_event(&self, topic: Topic, data: serde_json::Value);
}

/// A hook set that does nothing; useful for tests and for running the
/// channel with no managed-key subsystem configured.
pub struct NullHooks;

#[async_trait]
impl ChannelHooks for NullHooks {
    async fn on_reconnected(&self) {}
    async fn on_auth_failure(&self) {}
    async fn on_event(&self, _topic: Topic, _data: serde_json::Value) {}
}
