//! L2 persistent cache backed by SQLite.
//! Stores the full serialized result keyed by the same blake3 fingerprint
//! as L1. Every row carries its own expiry so the caller's TTL policy
//! (long-lived high-confidence entries, short-lived degraded ones) holds
//! across tiers; `max_ttl` is a ceiling on top of that. Every failure is
//! logged and reported as a miss: the store being unreachable must never
//! fail a translation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::types::TranslationResult;

use super::CacheKey;

/// Default ceiling on L2 entry lifetime: 7 days.
pub const DEFAULT_L2_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// SQLite-backed result cache (L2).
pub struct SqliteCache {
    conn: Mutex<Connection>,
    max_ttl: Duration,
}

impl SqliteCache {
    /// Open (or create) the cache database at the given path. `max_ttl`
    /// caps how long any entry may live regardless of the TTL it was
    /// inserted with.
    pub fn open(db_path: &Path, max_ttl: Duration) -> Result<Self, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("failed to open SQLite cache: {e}"))?;
        let cache = Self::init(conn, max_ttl)?;
        info!(path = %db_path.display(), "sqlite L2 cache opened");
        Ok(cache)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory(max_ttl: Duration) -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("failed to open in-memory SQLite cache: {e}"))?;
        Self::init(conn, max_ttl)
    }

    fn init(conn: Connection, max_ttl: Duration) -> Result<Self, String> {
        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| format!("PRAGMA failed: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS result_cache (
                cache_key BLOB PRIMARY KEY,
                result_json TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_result_cache_expires
                ON result_cache(expires_at);",
        )
        .map_err(|e| format!("create table failed: {e}"))?;

        Ok(Self {
            conn: Mutex::new(conn),
            max_ttl,
        })
    }

    /// Look up a cached result. Returns None if absent, expired, or on any
    /// store error.
    pub fn get(&self, key: &CacheKey) -> Option<TranslationResult> {
        let conn = self.conn.lock();

        let json: Option<String> = match conn
            .query_row(
                "SELECT result_json FROM result_cache
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key.as_slice(), now_unix_ms()],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "L2 cache read failed, treating as miss");
                return None;
            }
        };

        match json {
            Some(json) => match serde_json::from_str(&json) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "L2 cache entry unparsable, treating as miss");
                    None
                }
            },
            None => None,
        }
    }

    /// Insert or replace a result with the caller's TTL (capped at
    /// `max_ttl`). Errors are logged and swallowed.
    pub fn insert(&self, key: &CacheKey, result: &TranslationResult, ttl: Duration) {
        let json = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "L2 cache serialize failed");
                return;
            }
        };
        let expires_at = now_unix_ms() + ttl.min(self.max_ttl).as_millis() as i64;
        let conn = self.conn.lock();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO result_cache (cache_key, result_json, expires_at)
             VALUES (?1, ?2, ?3)",
            params![key.as_slice(), json, expires_at],
        ) {
            warn!(error = %e, "L2 cache insert failed");
        }
    }

    /// Remove expired entries. Called periodically from a background task.
    pub fn cleanup_expired(&self) -> usize {
        let conn = self.conn.lock();
        match conn.execute(
            "DELETE FROM result_cache WHERE expires_at <= ?1",
            params![now_unix_ms()],
        ) {
            Ok(count) => {
                if count > 0 {
                    debug!(removed = count, "L2 cache cleanup");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "L2 cache cleanup failed");
                0
            }
        }
    }

    /// Start a background cleanup loop (runs every hour).
    pub fn start_cleanup_loop(cache: Arc<Self>) {
        std::thread::Builder::new()
            .name("l2-cache-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(Duration::from_secs(3600));
                cache.cleanup_expired();
            })
            .expect("failed to spawn L2 cache cleanup thread");
    }
}

/// Current time as Unix timestamp (milliseconds).
fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
