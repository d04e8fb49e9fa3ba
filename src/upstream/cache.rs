//! TTL cache for upstream GET responses
//!
//! Entries are keyed by the fully-qualified request URL. Expired entries are
//! evicted lazily on read, or in bulk when the cache reaches capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::client::UpstreamResponse;

/// A cached upstream response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: UpstreamResponse,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

/// Snapshot of cache statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Concurrent response cache
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Look up a live entry, evicting it if it has expired
    pub fn get(&self, key: &str) -> Option<UpstreamResponse> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.response.clone()),
            Some(_) => None,
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match hit {
            Some(response) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            None => {
                // The read guard above is released before removal
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a response for `ttl`; a zero TTL is a no-op
    pub fn insert(&self, key: String, response: UpstreamResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.make_room();
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    fn make_room(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let mut evicted = before.saturating_sub(self.entries.len());

        if self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted_at)
                .map(|entry| entry.key().clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
                evicted += 1;
            }
        }
        self.stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStatsResponse {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsResponse {
            entries: self.entries.len(),
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(price: f64) -> UpstreamResponse {
        UpstreamResponse {
            status: 200,
            ok: true,
            data: json!([{ "symbol": "AAPL", "price": price }]),
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new(10);
        cache.insert("k".into(), response(1.0), Duration::from_secs(60));
        assert_eq!(cache.get("k").unwrap().data[0]["price"], 1.0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = ResponseCache::new(10);
        cache.insert("k".into(), response(1.0), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = ResponseCache::new(10);
        cache.insert("k".into(), response(1.0), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResponseCache::new(2);
        cache.insert("a".into(), response(1.0), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b".into(), response(2.0), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c".into(), response(3.0), Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
