//! Cached bearer token with expiry skew.

use secrecy::{ExposeSecret, SecretString};

/// A bearer token obtained from `login`, with the skew the client applies
/// when deciding whether it is still usable.
#[derive(Clone)]
pub struct CachedToken {
    value: SecretString,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl CachedToken {
    pub fn new(value: String, expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            value: SecretString::new(value),
            expires_at,
        }
    }

    /// Valid iff `now < expiry - 60s`.
    pub fn is_valid(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now < self.expires_at - chrono::Duration::seconds(60)
    }

    pub fn value(&self) -> &str {
        self.value.expose_secret()
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
