//! Per-caller rate limiting and idempotency caching for batch requests.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

// ============================================================================
// Rate Limiter
// ============================================================================

/// Sliding-window request counter keyed by caller.
///
/// Each key keeps the instants of its admitted requests inside the window.
/// Check-and-record happens under the key's map entry, so concurrent callers
/// for the same key cannot both take the last slot.
#[derive(Clone)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    windows: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Admit one request for `key` at `now`.
    ///
    /// Returns the time until the oldest request leaves the window when the
    /// key is at its limit.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let mut entry = self.windows.entry(key.to_string()).or_default();
        let hits = entry.value_mut();

        while hits
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.limit {
            let retry_after = hits
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        hits.push_back(now);
        Ok(())
    }

    /// Forget keys whose windows have fully drained.
    pub fn purge_idle(&self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, hits| {
            hits.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < window)
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

// ============================================================================
// Idempotency Cache
// ============================================================================

/// Time-bounded result cache keyed by caller-supplied request identity.
pub struct IdempotencyCache<K, V> {
    ttl: Duration,
    entries: Arc<DashMap<K, (Instant, Arc<V>)>>,
}

impl<K, V> Clone for IdempotencyCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> IdempotencyCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Return the cached value if it has not expired.
    pub fn get(&self, key: &K, now: Instant) -> Option<Arc<V>> {
        let entry = self.entries.get(key)?;
        let (stored_at, value) = entry.value();
        (now.saturating_duration_since(*stored_at) < self.ttl).then(|| value.clone())
    }

    pub fn insert(&self, key: K, value: Arc<V>, now: Instant) {
        self.entries.insert(key, (now, value));
    }

    pub fn purge_expired(&self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (stored_at, _)| now.saturating_duration_since(*stored_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
