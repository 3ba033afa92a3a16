//! Thread-safe LRU+TTL query cache with over-eager table invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

/// A cached query result. Cheaply clonable since `Get` hands back a copy.
pub type QueryResult = Arc<Vec<serde_json::Value>>;

pub const DEFAULT_MAX_ENTRIES: usize = 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueryCacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    #[serde(rename = "default_ttl_secs", with = "ttl_secs")]
    pub default_ttl: Duration,
    pub max_value_size_bytes: usize,
}

mod ttl_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        QueryCacheConfig {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: DEFAULT_TTL,
            max_value_size_bytes: 1024 * 1024,
        }
    }
}

struct CacheEntry {
    result: QueryResult,
    expires_at: Instant,
}

struct Inner {
    lru: LruCache<String, CacheEntry>,
    default_ttl: Duration,
}

/// LRU-ordered query-result cache with lazy TTL expiration and a
/// deliberately over-eager case-insensitive substring table invalidation
/// (§4.11 / §9): it must never miss a table reference, and false positives
/// only cost a recomputation.
pub struct QueryCache {
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(config: &QueryCacheConfig) -> Self {
        QueryCache {
            inner: Mutex::new(Inner {
                lru: LruCache::new(config.max_entries),
                default_ttl: config.default_ttl,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, sql: &str) -> Option<QueryResult> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired = match inner.lru.peek(sql) {
            Some(entry) => entry.expires_at <= now,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.lru.pop(sql);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.lru.get(sql).map(|e| e.result.clone())
    }

    pub fn put(&self, sql: String, result: QueryResult) {
        let mut inner = self.inner.lock().unwrap();
        let ttl = inner.default_ttl;
        self.put_with_ttl_locked(&mut inner, sql, result, ttl);
    }

    pub fn put_with_ttl(&self, sql: String, result: QueryResult, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        self.put_with_ttl_locked(&mut inner, sql, result, ttl);
    }

    fn put_with_ttl_locked(&self, inner: &mut Inner, sql: String, result: QueryResult, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        inner.lru.put(sql, CacheEntry { result, expires_at });
    }

    pub fn invalidate(&self, sql: &str) {
        self.inner.lock().unwrap().lru.pop(sql);
    }

    /// Removes every cached key whose SQL text contains `table_name` as a
    /// case-insensitive substring. Returns the number removed.
    pub fn invalidate_by_table(&self, table_name: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let needle = table_name.to_lowercase();
        let matches: Vec<String> = inner
            .lru
            .iter()
            .filter(|(key, _)| key.to_lowercase().contains(&needle))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matches {
            inner.lru.pop(key);
        }
        matches.len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().lru.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().lru.len()
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count() as f64;
        let misses = self.miss_count() as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}
