//! Next-refresh scheduling arithmetic (spec §4.7 priority rules 1-3).

use chrono::{DateTime, Utc};

const MIN_SCHEDULE_DELAY: std::time::Duration = std::time::Duration::from_secs(60);
const ROTATION_SAFETY_MARGIN: chrono::Duration = chrono::Duration::seconds(30);
const FIXED_FALLBACK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);
const MIN_GRACE_POLL_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

/// Clamp a `DateTime<Utc>` target into a non-negative `Duration` from `now`,
/// the way `Timestamp::duration_since` treats a past target as zero.
fn duration_until(now: DateTime<Utc>, target: DateTime<Utc>) -> std::time::Duration {
    (target - now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Delay until the next scheduled refresh, per priority rules 1-3.
pub fn next_refresh_delay(
    now: DateTime<Utc>,
    next_rotation_at: Option<DateTime<Utc>>,
    grace_expires_at: Option<DateTime<Utc>>,
) -> std::time::Duration {
    if let Some(rotation_at) = next_rotation_at {
        let target = rotation_at - ROTATION_SAFETY_MARGIN;
        return duration_until(now, target).max(MIN_SCHEDULE_DELAY);
    }

    if let Some(grace_at) = grace_expires_at {
        let remaining = duration_until(now, grace_at);
        let midpoint = remaining / 2;
        return midpoint.max(MIN_SCHEDULE_DELAY);
    }

    FIXED_FALLBACK_INTERVAL
}

/// Delay until the grace-period safety poll fires, `max(0.5 * remaining, 10s)`.
pub fn grace_poll_delay(now: DateTime<Utc>, grace_expires_at: DateTime<Utc>) -> std::time::Duration {
    let remaining = duration_until(now, grace_expires_at);
    (remaining / 2).max(MIN_GRACE_POLL_DELAY)
}

/// Retry delay for a failed WS-triggered refresh: `min(2^attempt * 1s, 60s)`.
pub fn retry_delay(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_secs(1)
        .saturating_mul(1u32.checked_shl(attempt.min(6)).unwrap_or(u32::MAX))
        .min(std::time::Duration::from_secs(60))
}

pub const MAX_RETRY_ATTEMPTS: u32 = 5;
