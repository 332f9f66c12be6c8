//! Translation cache: blake3-fingerprint keys, in-memory LRU (L1) with
//! per-entry TTL, optional SQLite tier (L2) for cross-process reuse.
//! Expired entries are treated as absent and lazily purged. Entries are
//! replaced, never mutated; concurrent puts for one key are
//! last-write-wins. Caching is an optimization: every tier failure
//! degrades to a miss.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::TranslationResult;

mod sqlite;

pub use sqlite::SqliteCache;

/// Deterministic request fingerprint.
pub type CacheKey = [u8; 32];

/// Engine scope used for engine-transparent entries.
pub const ENGINE_SCOPE_ANY: &str = "any";

/// Compute the cache key from normalized translation parameters.
/// `engine_scope` is the serving engine's id, or [`ENGINE_SCOPE_ANY`] for
/// engine-agnostic entries (the orchestrator always writes those).
pub fn compute_key(
    normalized_text: &str,
    source_lang: &str,
    target_lang: &str,
    engine_scope: &str,
) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update(b"|");
    hasher.update(source_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(engine_scope.as_bytes());
    *hasher.finalize().as_bytes()
}

struct CacheEntry {
    result: TranslationResult,
    expires_at: Instant,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// The cache store. L1 is always present; L2 is optional write-through.
pub struct TranslationCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
    l2: Option<Arc<SqliteCache>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1"),
            )),
            l2: None,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Attach a persistent L2 tier. Writes go through; L1 misses consult it.
    pub fn with_l2(mut self, l2: Arc<SqliteCache>) -> Self {
        self.l2 = Some(l2);
        self
    }

    /// Look up a cached result. Returns None if absent or expired.
    pub fn get(&self, key: &CacheKey) -> Option<TranslationResult> {
        {
            let mut cache = self.inner.lock();
            if let Some(entry) = cache.get(key) {
                if Instant::now() < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.result.clone());
                }
                // Expired entries behave as absent.
                cache.pop(key);
            }
        }

        if let Some(l2) = &self.l2 {
            if let Some(result) = l2.get(key) {
                debug!("l2_cache_hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(result);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or replace. The TTL is decided by the caller (high-confidence
    /// results live long, degraded ones expire quickly).
    pub fn put(&self, key: CacheKey, result: &TranslationResult, ttl: Duration) {
        let entry = CacheEntry {
            result: result.clone(),
            expires_at: Instant::now() + ttl,
        };
        {
            let mut cache = self.inner.lock();
            if let Some((evicted_key, _)) = cache.push(key, entry) {
                if evicted_key != key {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if let Some(l2) = &self.l2 {
            l2.insert(&key, result, ttl);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}
