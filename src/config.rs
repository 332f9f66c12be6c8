//! Core configuration: confidence gate, cache TTLs, batch fan-out, engine
//! timeouts, circuit-breaker thresholds. Defaults match deployment policy;
//! every value can be overridden from the environment.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Results below this confidence are soft failures and trigger fallback.
    pub min_acceptable_confidence: f32,
    /// L1 cache entry ceiling; LRU eviction beyond it.
    pub cache_capacity: usize,
    /// TTL for results at or above the confidence gate.
    pub cache_ttl_ok: Duration,
    /// TTL for degraded (below-gate) results. Short: a healthier engine is
    /// likely to supersede them.
    pub cache_ttl_degraded: Duration,
    /// Concurrent in-flight items per batch.
    pub batch_concurrency: usize,
    /// Items accepted per batch request.
    pub max_batch_items: usize,
    /// Per-call engine timeout. Exceeding it is a hard failure.
    pub engine_timeout: Duration,
    /// Maximum request text length, in characters.
    pub max_text_length: usize,
    /// Consecutive failures within the window that open the breaker.
    pub breaker_failure_threshold: u32,
    /// Rolling window for counting consecutive failures.
    pub breaker_failure_window: Duration,
    /// Minimum spacing between half-open probe trials.
    pub breaker_probe_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            min_acceptable_confidence: 0.5,
            cache_capacity: 1000,
            cache_ttl_ok: Duration::from_secs(24 * 3600),
            cache_ttl_degraded: Duration::from_secs(300),
            batch_concurrency: 10,
            max_batch_items: 100,
            engine_timeout: Duration::from_secs(5),
            max_text_length: 1000,
            breaker_failure_threshold: 3,
            breaker_failure_window: Duration::from_secs(60),
            breaker_probe_interval: Duration::from_secs(30),
        }
    }
}

impl CoreConfig {
    /// Load defaults, then apply `ANUVAD_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<f32>("ANUVAD_MIN_CONFIDENCE") {
            cfg.min_acceptable_confidence = v;
        }
        if let Some(v) = env_parse::<usize>("ANUVAD_CACHE_MAX_SIZE") {
            cfg.cache_capacity = v;
        }
        if let Some(v) = env_parse::<u64>("ANUVAD_CACHE_TTL_SECS") {
            cfg.cache_ttl_ok = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("ANUVAD_CACHE_DEGRADED_TTL_SECS") {
            cfg.cache_ttl_degraded = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("ANUVAD_BATCH_CONCURRENCY") {
            cfg.batch_concurrency = v;
        }
        if let Some(v) = env_parse::<usize>("ANUVAD_MAX_BATCH_ITEMS") {
            cfg.max_batch_items = v;
        }
        if let Some(v) = env_parse::<u64>("ANUVAD_ENGINE_TIMEOUT_MS") {
            cfg.engine_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("ANUVAD_MAX_TEXT_LENGTH") {
            cfg.max_text_length = v;
        }
        if let Some(v) = env_parse::<u32>("ANUVAD_BREAKER_FAILURES") {
            cfg.breaker_failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("ANUVAD_BREAKER_WINDOW_SECS") {
            cfg.breaker_failure_window = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("ANUVAD_BREAKER_PROBE_SECS") {
            cfg.breaker_probe_interval = Duration::from_secs(v);
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}
