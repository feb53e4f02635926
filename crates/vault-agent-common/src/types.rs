//! Small value types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Millisecond-precision timestamp, wrapping `chrono::DateTime<Utc>` for
/// consistent serialization across HTTP/WS payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.0).unwrap_or_else(chrono::Utc::now)
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Duration since an earlier timestamp, clamped to zero if `other` is
    /// actually later (never panics or goes negative).
    pub fn duration_since(&self, other: &Timestamp) -> std::time::Duration {
        let diff = (self.0 - other.0).max(0) as u64;
        std::time::Duration::from_millis(diff)
    }

    /// Add a duration, saturating rather than overflowing.
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as i64))
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Timestamp {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt.timestamp_millis())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_clamps_negative() {
        let earlier = Timestamp::from_millis(2000);
        let later = Timestamp::from_millis(1000);
        // `earlier` is actually after `later`; asking for duration of
        // `later` since `earlier` must not underflow.
        assert_eq!(later.duration_since(&earlier), std::time::Duration::ZERO);
    }

    #[test]
    fn ordering() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(2000);
        assert!(t1.is_before(&t2));
        assert!(!t2.is_before(&t1));
    }
}
