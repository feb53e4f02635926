//! Reconnect backoff. Deliberately a different shape from `vault-agent-client`'s
//! request retry (cap applied before jitter, not after) — it matches the
//! literal spec §4.5 formula rather than reusing C1's.

use rand::Rng;

pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
pub const PONG_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(45);
/// `pongTimeout + heartbeatInterval`, the overall staleness threshold.
pub const STALE_THRESHOLD: std::time::Duration =
    std::time::Duration::from_secs(PONG_TIMEOUT.as_secs() + HEARTBEAT_INTERVAL.as_secs());
pub const STALENESS_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);
/// Settle time before the Managed-Key Controller's post-reconnect refresh.
pub const RECONNECT_SETTLE: std::time::Duration = std::time::Duration::from_secs(2);

/// `min(1s * 2^attempt, 60s) + U(0, 1s)`.
pub fn reconnect_delay(attempt: u32) -> std::time::Duration {
    let base = std::time::Duration::from_secs(1)
        .saturating_mul(1u32.checked_shl(attempt.min(6)).unwrap_or(u32::MAX))
        .min(std::time::Duration::from_secs(60));
    let jitter = std::time::Duration::from_millis(rand::thread_rng().gen_range(0..1000));
    base + jitter
}
