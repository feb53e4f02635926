//! Caches open database connection pools by connection id, evicting and
//! closing pools that have sat idle for too long.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::db::DbClient;

const DEFAULT_CAPACITY: usize = 64;
pub const IDLE_TTL: Duration = Duration::from_secs(300);

struct Entry {
    client: Arc<dyn DbClient>,
    last_used: Instant,
}

/// An LRU cache of open `DbClient` pools, one per connection id.
///
/// Capacity-based eviction (the `lru` crate's normal behaviour) and
/// idle-based eviction (`sweep_idle`) both close the evicted pool so a
/// stale connection never lingers against the database.
pub struct PoolCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl PoolCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
        }
    }

    /// Returns the cached client for `connection_id`, refreshing its
    /// last-used timestamp, or `None` if it isn't cached.
    pub async fn get(&self, connection_id: &str) -> Option<Arc<dyn DbClient>> {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.get_mut(connection_id) {
            entry.last_used = Instant::now();
            Some(entry.client.clone())
        } else {
            None
        }
    }

    /// Inserts or replaces the cached client for `connection_id`. If this
    /// eviction bumps an older entry out, that entry's pool is closed.
    pub async fn put(&self, connection_id: String, client: Arc<dyn DbClient>) {
        let mut guard = self.inner.lock().await;
        let evicted = guard.put(
            connection_id,
            Entry {
                client,
                last_used: Instant::now(),
            },
        );
        drop(guard);
        if let Some(entry) = evicted {
            entry.client.close().await;
        }
    }

    pub async fn remove(&self, connection_id: &str) {
        let evicted = self.inner.lock().await.pop(connection_id);
        if let Some(entry) = evicted {
            entry.client.close().await;
        }
    }

    /// Closes and removes every pool that has been idle longer than
    /// [`IDLE_TTL`]. Intended to be called periodically from a background
    /// task.
    pub async fn sweep_idle(&self) {
        let stale: Vec<String> = {
            let guard = self.inner.lock().await;
            guard
                .iter()
                .filter(|(_, entry)| entry.last_used.elapsed() >= IDLE_TTL)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in stale {
            self.remove(&id).await;
        }
    }

    /// Closes every cached pool concurrently. Called during shutdown.
    pub async fn close_all(&self) {
        let entries: Vec<Entry> = {
            let mut guard = self.inner.lock().await;
            let ids: Vec<String> = guard.iter().map(|(id, _)| id.clone()).collect();
            ids.into_iter().filter_map(|id| guard.pop(&id)).collect()
        };
        let closes = entries.iter().map(|entry| entry.client.close());
        futures_util::future::join_all(closes).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for PoolCache {
    fn default() -> Self {
        Self::new()
    }
}
