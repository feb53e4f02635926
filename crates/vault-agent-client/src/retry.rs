//! Retry policy and transient-failure classification for vault HTTP calls.

use rand::Rng;
use vault_agent_common::ErrorClass;

/// Per-call retry policy. `max_attempts` counts the first attempt, so `3`
/// means up to two retries after an initial failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Default policy used by most calls: up to 3 attempts.
    pub const DEFAULT: RetryPolicy = RetryPolicy { max_attempts: 3 };

    /// Used by `login` and `ack_delivery`: a single attempt, no retry.
    pub const NO_RETRY: RetryPolicy = RetryPolicy { max_attempts: 1 };

    /// `min(1s * 2^attempt + U(0, 1s), 10s)`, `attempt` is zero-based
    /// (the delay before the *next* attempt, counted from the first retry).
    pub fn backoff(&self, attempt: u32) -> std::time::Duration {
        let base_ms = 1000u64.saturating_mul(1u64 << attempt.min(10));
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        std::time::Duration::from_millis((base_ms + jitter_ms).min(10_000))
    }
}

/// Classify a network-level failure message against the retryable set.
pub fn classify_network_error(message: &str) -> ErrorClass {
    let lowered = message.to_ascii_lowercase();
    const TRANSIENT_PATTERNS: &[&str] = &[
        "connection refused",
        "host not found",
        "timed out",
        "socket hang up",
    ];
    if TRANSIENT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        401 | 403 => ErrorClass::Auth,
        429 => ErrorClass::Transient,
        500..=599 => ErrorClass::Transient,
        400..=499 => ErrorClass::Validation,
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_ten_seconds() {
        let policy = RetryPolicy::DEFAULT;
        for attempt in 0..20 {
            assert!(policy.backoff(attempt) <= std::time::Duration::from_secs(10));
        }
    }

    #[test]
    fn status_classification_never_retries_auth_failures() {
        assert_eq!(classify_status(401), ErrorClass::Auth);
        assert_eq!(classify_status(403), ErrorClass::Auth);
        assert_eq!(classify_status(429), ErrorClass::Transient);
        assert_eq!(classify_status(503), ErrorClass::Transient);
        assert_eq!(classify_status(404), ErrorClass::Validation);
    }

    #[test]
    fn network_error_classification_matches_known_patterns() {
        assert_eq!(classify_network_error("Connection refused"), ErrorClass::Transient);
        assert_eq!(classify_network_error("host not found: vault.internal"), ErrorClass::Transient);
        assert_eq!(classify_network_error("socket hang up"), ErrorClass::Transient);
        assert_eq!(classify_network_error("invalid certificate"), ErrorClass::Fatal);
    }
}
