//! Persistent WebSocket event channel to the vault control-plane (component C5).

mod backoff;
mod channel;
mod dto;
mod hooks;
mod subscription;

pub use backoff::{
    reconnect_delay, HEARTBEAT_INTERVAL, PONG_TIMEOUT, RECONNECT_SETTLE, STALENESS_POLL_INTERVAL,
    STALE_THRESHOLD,
};
pub use channel::{ChannelConfig, ChannelState, EventChannel};
pub use dto::{ClientMessage, ServerMessage, Topic};
pub use hooks::{ChannelHooks, NullHooks};
pub use subscription::{build_ws_url, ConnectParams};
