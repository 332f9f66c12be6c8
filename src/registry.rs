//! Engine registry: the authoritative list of engines with language-pair
//! coverage, priority ordering and per-engine health. Health tracking is a
//! circuit breaker with half-open probing: an engine goes unhealthy after
//! N consecutive failures inside a rolling window and is re-probed at most
//! once per probe interval rather than excluded permanently.
//! Registry state mutation is the only side effect here — no I/O.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::engine::Engine;

/// EMA smoothing factor for per-engine latency.
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Static description of one engine: identity, coverage, rank.
#[derive(Debug, Clone)]
pub struct EngineDescriptor {
    pub id: String,
    pub supported_pairs: HashSet<(String, String)>,
    /// Lower is preferred.
    pub priority: u32,
}

impl EngineDescriptor {
    pub fn new(id: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            supported_pairs: HashSet::new(),
            priority,
        }
    }

    pub fn with_pair(mut self, source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        self.supported_pairs
            .insert((source_lang.into(), target_lang.into()));
        self
    }

    fn supports(&self, source_lang: &str, target_lang: &str) -> bool {
        self.supported_pairs
            .contains(&(source_lang.to_string(), target_lang.to_string()))
    }
}

/// Breaker thresholds, split out so the registry can be built without the
/// full core config.
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub probe_interval: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(60),
            probe_interval: Duration::from_secs(30),
        }
    }
}

/// Mutable health fields, guarded per descriptor. A lost EMA update under
/// contention would only bias the average slightly; the per-descriptor lock
/// makes each read-modify-write atomic without a global transaction.
#[derive(Debug)]
struct HealthState {
    healthy: bool,
    average_latency_ms: f64,
    consecutive_failures: u32,
    window_started_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    last_probe_at: Option<Instant>,
}

impl HealthState {
    fn new() -> Self {
        Self {
            healthy: true,
            average_latency_ms: 0.0,
            consecutive_failures: 0,
            window_started_at: None,
            last_failure_at: None,
            last_probe_at: None,
        }
    }
}

struct RegisteredEngine {
    descriptor: EngineDescriptor,
    engine: Arc<dyn Engine>,
    health: Mutex<HealthState>,
}

/// One entry of an ordered candidate list returned by `select`.
#[derive(Clone)]
pub struct Candidate {
    pub id: String,
    pub priority: u32,
    pub average_latency_ms: f64,
    /// Set when this admission spent the engine's half-open probe budget.
    /// A caller that never attempts the candidate should return it via
    /// [`EngineRegistry::refund_probe`].
    pub probe: bool,
    pub engine: Arc<dyn Engine>,
}

/// Read-only view of one engine's health, for stats endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineSnapshot {
    pub id: String,
    pub priority: u32,
    pub healthy: bool,
    pub average_latency_ms: f64,
}

/// Owns all engine handles. Built once at startup from static
/// configuration; health fields mutate continuously; the set of engines is
/// replaced wholesale on reconfiguration, never edited in place.
pub struct EngineRegistry {
    engines: Vec<Arc<RegisteredEngine>>,
    policy: BreakerPolicy,
}

impl EngineRegistry {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            engines: Vec::new(),
            policy,
        }
    }

    /// Register an engine. Called during startup, before the registry is
    /// shared.
    pub fn register(&mut self, descriptor: EngineDescriptor, engine: Arc<dyn Engine>) {
        info!(
            engine = %descriptor.id,
            priority = descriptor.priority,
            pairs = descriptor.supported_pairs.len(),
            "engine_registered"
        );
        self.engines.push(Arc::new(RegisteredEngine {
            descriptor,
            engine,
            health: Mutex::new(HealthState::new()),
        }));
    }

    /// Ordered candidates for a language pair: healthy (or due a half-open
    /// probe), covering the pair, not excluded, sorted by
    /// `(priority asc, average_latency_ms asc)`. An empty result is not an
    /// error by itself; the caller decides what it means.
    pub fn select(
        &self,
        source_lang: &str,
        target_lang: &str,
        excluding: &HashSet<String>,
    ) -> Vec<Candidate> {
        let now = Instant::now();
        let mut candidates: Vec<Candidate> = Vec::new();

        for entry in &self.engines {
            if excluding.contains(&entry.descriptor.id)
                || !entry.descriptor.supports(source_lang, target_lang)
            {
                continue;
            }

            let mut health = entry.health.lock();
            let mut probe = false;
            if !health.healthy {
                // Half-open: admit one probe trial per probe interval.
                let due = match health.last_probe_at {
                    Some(at) => now.duration_since(at) >= self.policy.probe_interval,
                    None => true,
                };
                if !due {
                    continue;
                }
                health.last_probe_at = Some(now);
                probe = true;
                debug!(engine = %entry.descriptor.id, "breaker_half_open_probe");
            }

            candidates.push(Candidate {
                id: entry.descriptor.id.clone(),
                priority: entry.descriptor.priority,
                average_latency_ms: health.average_latency_ms,
                probe,
                engine: Arc::clone(&entry.engine),
            });
        }

        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(
                    a.average_latency_ms
                        .partial_cmp(&b.average_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.id.cmp(&b.id))
        });
        candidates
    }

    /// Record one invocation outcome: EMA latency update plus breaker
    /// bookkeeping. Returns true when this outcome opened the breaker, so
    /// the caller can emit its unhealthy event (the registry itself does no
    /// I/O).
    pub fn report_outcome(&self, engine_id: &str, success: bool, latency_ms: f64) -> bool {
        let Some(entry) = self
            .engines
            .iter()
            .find(|e| e.descriptor.id == engine_id)
        else {
            warn!(engine = engine_id, "outcome reported for unknown engine");
            return false;
        };

        let now = Instant::now();
        let mut health = entry.health.lock();

        if health.average_latency_ms == 0.0 {
            health.average_latency_ms = latency_ms;
        } else {
            health.average_latency_ms = LATENCY_EMA_ALPHA * latency_ms
                + (1.0 - LATENCY_EMA_ALPHA) * health.average_latency_ms;
        }

        if success {
            health.consecutive_failures = 0;
            health.window_started_at = None;
            if !health.healthy {
                health.healthy = true;
                health.last_probe_at = None;
                info!(engine = engine_id, "breaker_closed");
            }
            return false;
        }

        // Consecutive-failure count is scoped to the rolling window.
        match health.window_started_at {
            Some(started) if now.duration_since(started) <= self.policy.failure_window => {}
            _ => {
                health.window_started_at = Some(now);
                health.consecutive_failures = 0;
            }
        }
        health.consecutive_failures += 1;
        health.last_failure_at = Some(now);

        if health.healthy && health.consecutive_failures >= self.policy.failure_threshold {
            health.healthy = false;
            health.last_probe_at = Some(now);
            warn!(
                engine = engine_id,
                failures = health.consecutive_failures,
                "breaker_opened"
            );
            return true;
        }
        false
    }

    /// Return an unspent half-open probe admission. `select` stamps the
    /// probe timestamp when it admits an unhealthy engine; if the caller's
    /// fallback chain ends before that candidate is attempted, the stamp
    /// would leave the engine unprobed for a full interval. Clearing it
    /// makes the engine due again on the next `select`.
    pub fn refund_probe(&self, engine_id: &str) {
        let Some(entry) = self
            .engines
            .iter()
            .find(|e| e.descriptor.id == engine_id)
        else {
            return;
        };
        let mut health = entry.health.lock();
        if !health.healthy {
            health.last_probe_at = None;
        }
    }

    /// Health snapshot of every registered engine.
    pub fn snapshot(&self) -> Vec<EngineSnapshot> {
        self.engines
            .iter()
            .map(|entry| {
                let health = entry.health.lock();
                EngineSnapshot {
                    id: entry.descriptor.id.clone(),
                    priority: entry.descriptor.priority,
                    healthy: health.healthy,
                    average_latency_ms: health.average_latency_ms,
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
