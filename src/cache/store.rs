// In-memory response cache.
// Time-bounded, size-bounded key/value store with stale reads and periodic sweeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CacheConfig;

/// Shortest sweep period; a zero interval would never yield.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// A cached value with its freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    /// When the value was stored.
    pub stored_at: Instant,
    /// How long the value counts as fresh.
    pub stale_after: Duration,
}

impl<T> CacheEntry<T> {
    fn new(key: String, data: T, stale_after: Duration) -> Self {
        Self {
            key,
            data,
            stored_at: Instant::now(),
            stale_after,
        }
    }

    /// Check if the entry has outlived its freshness window.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.stale_after
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Fresh(T),
    /// Past its freshness window but still usable for optimistic display.
    Stale(T),
}

impl<T> CacheLookup<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, CacheLookup::Stale(_))
    }

    /// The value only if it is still fresh.
    pub fn into_fresh(self) -> Option<T> {
        match self {
            CacheLookup::Fresh(data) => Some(data),
            CacheLookup::Stale(_) => None,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            CacheLookup::Fresh(data) | CacheLookup::Stale(data) => data,
        }
    }
}

/// Shared response cache, generic over the cached value.
///
/// Misses are never errors. Reads and writes are atomic with respect to each
/// other; no lock is held across an await point.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    config: CacheConfig,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a key, tagging the value stale once its window has passed.
    pub fn get(&self, key: &str) -> Option<CacheLookup<T>> {
        let entries = self.entries();
        let entry = entries.get(key)?;

        if entry.is_expired(Instant::now()) {
            Some(CacheLookup::Stale(entry.data.clone()))
        } else {
            Some(CacheLookup::Fresh(entry.data.clone()))
        }
    }

    /// Fresh value for a key, ignoring stale entries.
    pub fn get_fresh(&self, key: &str) -> Option<T> {
        self.get(key).and_then(CacheLookup::into_fresh)
    }

    /// Store a value with the configured default freshness window.
    pub fn set(&self, key: impl Into<String>, data: T) {
        self.set_with_ttl(key, data, self.config.stale_after);
    }

    /// Store or overwrite a value, evicting entries if over budget.
    pub fn set_with_ttl(&self, key: impl Into<String>, data: T, stale_after: Duration) {
        let key = key.into();
        let mut entries = self.entries();
        entries.insert(key.clone(), CacheEntry::new(key, data, stale_after));

        if entries.len() > self.config.max_entries {
            Self::evict(&mut entries, self.config.max_entries);
        }
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries().remove(key).map(|entry| entry.data)
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.len(), "cache sweep");
        }
        removed
    }

    /// Reclaim expired entries first, then drop the oldest until within budget.
    fn evict(entries: &mut HashMap<String, CacheEntry<T>>, max_entries: usize) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));

        if entries.len() <= max_entries {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = entries
            .values()
            .map(|entry| (entry.stored_at, entry.key.clone()))
            .collect();
        by_age.sort();

        let excess = entries.len() - max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }
        tracing::debug!(evicted = excess, "cache over budget, evicted oldest entries");
    }
}

impl<T: Clone + Send + 'static> ResponseCache<T> {
    /// Start the background sweep on the configured interval.
    ///
    /// The task holds only a weak reference and stops once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize) -> CacheConfig {
        CacheConfig {
            stale_after: Duration::from_secs(60),
            max_entries,
            sweep_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_stale() {
        let cache = ResponseCache::new(config(10));
        cache.set_with_ttl("users?page=1", vec![1, 2, 3], Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            cache.get("users?page=1"),
            Some(CacheLookup::Fresh(vec![1, 2, 3]))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        let lookup = cache.get("users?page=1").unwrap();
        assert!(lookup.is_stale());
        assert_eq!(lookup.into_inner(), vec![1, 2, 3]);
        assert_eq!(cache.get_fresh("users?page=1"), None);
    }

    #[test]
    fn test_miss_is_none() {
        let cache: ResponseCache<String> = ResponseCache::new(config(10));
        assert!(cache.get("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_keeps_single_entry() {
        let cache = ResponseCache::new(config(10));
        cache.set("k", 1);
        cache.set("k", 2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_fresh("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_expired_before_oldest() {
        let cache = ResponseCache::new(config(2));
        cache.set_with_ttl("short", 1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("old", 2);
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set("new", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("short").is_none());
        assert_eq!(cache.get_fresh("old"), Some(2));
        assert_eq!(cache.get_fresh("new"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_oldest_when_nothing_expired() {
        let cache = ResponseCache::new(config(2));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("b", 2);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set("c", 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_clear() {
        let cache = ResponseCache::new(config(10));
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.remove("a"), Some(1));
        assert!(cache.get("a").is_none());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_prefix() {
        let cache = ResponseCache::new(config(10));
        cache.set("favorites?q=a", 1);
        cache.set("favorites?q=b", 2);
        cache.set("users?q=a", 3);

        assert_eq!(cache.invalidate_prefix("favorites"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_fresh("users?q=a"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_removes_expired() {
        let cache = Arc::new(ResponseCache::new(config(10)));
        cache.set_with_ttl("a", 1, Duration::from_secs(5));
        cache.set_with_ttl("b", 2, Duration::from_secs(120));
        let handle = cache.spawn_sweeper();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sweep_interval_is_clamped() {
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            sweep_interval: Duration::ZERO,
            ..config(10)
        }));
        cache.set_with_ttl("a", 1, Duration::from_millis(5));
        let handle = cache.spawn_sweeper();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.get("a").is_none());
        assert!(!handle.is_finished());
        handle.abort();
    }
}
