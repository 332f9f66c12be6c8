//! Fire-and-forget observability: histogram timings plus event counters.
//! Failure to deliver a metric never fails a translation — the sink is
//! in-process and infallible by construction.
//! Histograms track p50/p95/p99 over a fixed sample window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: String,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// End the span, recording elapsed duration in microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(&self.name, elapsed_us);
        elapsed_us
    }

    /// Elapsed so far without finishing.
    pub fn elapsed_us(&self) -> f64 {
        self.start.elapsed().as_micros() as f64
    }
}

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        let idx = idx.min(self.count - 1);
        sorted[idx]
    }
}

/// Stores histograms and counters for all named metrics.
/// Names may carry a label suffix (e.g. `engine_latency_ms.m2m100`).
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<String, SampleRing>>,
    counters: Mutex<HashMap<String, u64>>,
    ring_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
        }
    }

    /// Record a histogram sample. The unit is the caller's; spans record
    /// microseconds, engine latency records milliseconds.
    pub fn record(&self, name: &str, value: f64) {
        let mut hists = self.histograms.lock();
        match hists.get_mut(name) {
            Some(ring) => ring.push(value),
            None => {
                let mut ring = SampleRing::new(self.ring_capacity);
                ring.push(value);
                hists.insert(name.to_string(), ring);
            }
        }
        tracing::trace!(metric = name, value = value, "metric_recorded");
    }

    /// Increment a monotonic event counter.
    pub fn incr(&self, name: &str) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Current value of a counter (0 if never incremented).
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: impl Into<String>) -> TimingSpan {
        TimingSpan {
            name: name.into(),
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Get percentile for a metric (p value 0-100).
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    /// Summary of all histograms at p50/p95/p99 plus all counters.
    pub fn summary(&self) -> MetricsSummary {
        let hists = self.histograms.lock();
        let mut timings = HashMap::new();
        for (name, ring) in hists.iter() {
            timings.insert(
                name.clone(),
                TimingSummary {
                    p50_us: ring.percentile(50.0),
                    p95_us: ring.percentile(95.0),
                    p99_us: ring.percentile(99.0),
                    count: ring.count,
                },
            );
        }
        MetricsSummary {
            timings,
            counters: self.counters.lock().clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TimingSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub timings: HashMap<String, TimingSummary>,
    pub counters: HashMap<String, u64>,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const CACHE_HIT: &str = "cache_hit";
    pub const CACHE_MISS: &str = "cache_miss";
    pub const FALLBACK_TRIGGERED: &str = "fallback_triggered";
    pub const ENGINE_UNHEALTHY: &str = "engine_unhealthy";
    /// Histogram prefix; the engine id is appended as `engine_latency_ms.<id>`.
    pub const ENGINE_LATENCY_PREFIX: &str = "engine_latency_ms";
    pub const TRANSLATE_DONE: &str = "t_translate_done";
    pub const BATCH_DONE: &str = "t_batch_done";

    pub fn engine_latency(engine_id: &str) -> String {
        format!("{ENGINE_LATENCY_PREFIX}.{engine_id}")
    }
}
