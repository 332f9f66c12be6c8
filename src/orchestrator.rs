//! Request-level controller: cache consult, ordered engine fallback with a
//! confidence gate, outcome reporting, cache populate.
//!
//! Attempts within one request are strictly sequential — attempt N+1 only
//! starts after attempt N resolves — so earlier confidence/failure signals
//! decide whether a later attempt is needed at all. A result below the
//! confidence gate is a soft failure: the next candidate is tried, but the
//! best such result is kept and returned if nothing better appears (a
//! low-confidence answer beats no answer). Hard failures (timeout, crash,
//! transport error) never count toward the best result.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{compute_key, TranslationCache, ENGINE_SCOPE_ANY};
use crate::config::CoreConfig;
use crate::error::{EngineError, TranslateError};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::normalize::normalize_for_key;
use crate::registry::{Candidate, EngineRegistry};
use crate::types::{TranslationRequest, TranslationResult};

pub struct Orchestrator {
    registry: Arc<EngineRegistry>,
    cache: Arc<TranslationCache>,
    metrics: Arc<MetricsRegistry>,
    config: CoreConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<EngineRegistry>,
        cache: Arc<TranslationCache>,
        metrics: Arc<MetricsRegistry>,
        config: CoreConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Resolve a single request to a result. Uncancellable variant of
    /// [`translate_with_cancel`](Self::translate_with_cancel).
    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResult, TranslateError> {
        self.translate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Resolve a single request to a result. Cancellation is honored at
    /// every suspension point: a cancelled request never writes to the
    /// cache and reports no outcome for an in-flight engine call.
    pub async fn translate_with_cancel(
        &self,
        request: &TranslationRequest,
        cancel: &CancellationToken,
    ) -> Result<TranslationResult, TranslateError> {
        self.validate(request)?;

        let span = self.metrics.span(metric_names::TRANSLATE_DONE);

        let normalized = normalize_for_key(&request.text);
        let key = compute_key(
            &normalized,
            &request.source_lang,
            &request.target_lang,
            ENGINE_SCOPE_ANY,
        );

        if request.allow_cache {
            if let Some(mut result) = self.cache.get(&key) {
                self.metrics.incr(metric_names::CACHE_HIT);
                debug!(
                    request_id = %request.request_id,
                    engine = %result.engine_used,
                    "cache_hit"
                );
                result.from_cache = true;
                span.finish();
                return Ok(result);
            }
            self.metrics.incr(metric_names::CACHE_MISS);
            debug!(request_id = %request.request_id, "cache_miss");
        }

        let mut candidates = self.registry.select(
            &request.source_lang,
            &request.target_lang,
            &Default::default(),
        );
        if candidates.is_empty() {
            return Err(TranslateError::NoEngineAvailable {
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
            });
        }
        reorder_for_hint(&mut candidates, request.engine_hint.as_deref());

        let mut best_soft: Option<TranslationResult> = None;
        let mut attempts = 0usize;
        let mut previous_engine: Option<&str> = None;

        for pos in 0..candidates.len() {
            let candidate = &candidates[pos];
            if cancel.is_cancelled() {
                self.refund_unused_probes(&candidates[pos..]);
                return Err(TranslateError::Cancelled);
            }
            attempts += 1;

            if let Some(from) = previous_engine {
                self.metrics.incr(metric_names::FALLBACK_TRIGGERED);
                debug!(
                    request_id = %request.request_id,
                    from = %from,
                    to = %candidate.id,
                    "fallback_triggered"
                );
            }

            match self.attempt(request, candidate, cancel).await {
                Err(e) => {
                    self.refund_unused_probes(&candidates[pos + 1..]);
                    return Err(e);
                }
                Ok(Attempt::Accepted(result)) => {
                    self.refund_unused_probes(&candidates[pos + 1..]);
                    self.populate_cache(request, key, &result, self.config.cache_ttl_ok);
                    span.finish();
                    return Ok(result);
                }
                Ok(Attempt::LowConfidence(result)) => {
                    let keep = match &best_soft {
                        Some(best) => result.confidence > best.confidence,
                        None => true,
                    };
                    if keep {
                        best_soft = Some(result);
                    }
                }
                Ok(Attempt::HardFailure) => {}
            }

            previous_engine = Some(&candidate.id);
        }

        if let Some(result) = best_soft {
            // Degraded success: every candidate was below the gate.
            info!(
                request_id = %request.request_id,
                engine = %result.engine_used,
                confidence = result.confidence,
                "degraded_success"
            );
            self.populate_cache(request, key, &result, self.config.cache_ttl_degraded);
            span.finish();
            return Ok(result);
        }

        Err(TranslateError::AllEnginesFailed { attempts })
    }

    /// One engine invocation under the per-call timeout, with health
    /// reporting. Only cancellation propagates as an error.
    async fn attempt(
        &self,
        request: &TranslationRequest,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> Result<Attempt, TranslateError> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.engine_timeout,
            candidate.engine.translate(
                &request.text,
                &request.source_lang,
                &request.target_lang,
                cancel,
            ),
        )
        .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Err(_) => {
                // Per-call timeout: a hard failure, same as an engine crash.
                warn!(
                    request_id = %request.request_id,
                    engine = %candidate.id,
                    timeout_ms = self.config.engine_timeout.as_millis() as u64,
                    "engine_timeout"
                );
                self.record_failure(&candidate.id, latency_ms);
                Ok(Attempt::HardFailure)
            }
            Ok(Err(EngineError::Cancelled)) => {
                // A cancelled in-flight call reports no outcome at all.
                Err(TranslateError::Cancelled)
            }
            Ok(Err(e)) => {
                warn!(
                    request_id = %request.request_id,
                    engine = %candidate.id,
                    error = %e,
                    "engine_failed"
                );
                self.record_failure(&candidate.id, latency_ms);
                Ok(Attempt::HardFailure)
            }
            Ok(Ok(output)) => {
                if cancel.is_cancelled() {
                    return Err(TranslateError::Cancelled);
                }
                self.registry.report_outcome(&candidate.id, true, latency_ms);
                self.metrics
                    .record(&metric_names::engine_latency(&candidate.id), latency_ms);

                let result = TranslationResult {
                    translated_text: output.translated_text,
                    engine_used: candidate.id.clone(),
                    confidence: output.confidence,
                    latency_ms,
                    from_cache: false,
                    alternatives: output.alternatives,
                };

                if result.confidence < self.config.min_acceptable_confidence {
                    debug!(
                        request_id = %request.request_id,
                        engine = %candidate.id,
                        confidence = result.confidence,
                        threshold = self.config.min_acceptable_confidence,
                        "confidence_below_threshold"
                    );
                    Ok(Attempt::LowConfidence(result))
                } else {
                    Ok(Attempt::Accepted(result))
                }
            }
        }
    }

    /// Probe admissions stamped by `select` but never attempted would
    /// otherwise leave their engine unprobed for a full interval.
    fn refund_unused_probes(&self, unused: &[Candidate]) {
        for candidate in unused {
            if candidate.probe {
                self.registry.refund_probe(&candidate.id);
            }
        }
    }

    fn record_failure(&self, engine_id: &str, latency_ms: f64) {
        if self.registry.report_outcome(engine_id, false, latency_ms) {
            self.metrics.incr(metric_names::ENGINE_UNHEALTHY);
            warn!(engine = engine_id, "engine_unhealthy");
        }
    }

    /// Cache writes are keyed engine-agnostically: hits are transparent to
    /// the caller regardless of which engine produced the entry.
    fn populate_cache(
        &self,
        request: &TranslationRequest,
        key: crate::cache::CacheKey,
        result: &TranslationResult,
        ttl: std::time::Duration,
    ) {
        if request.allow_cache {
            self.cache.put(key, result, ttl);
        }
    }

    fn validate(&self, request: &TranslationRequest) -> Result<(), TranslateError> {
        if request.text.trim().is_empty() {
            return Err(TranslateError::InvalidRequest(
                "text must not be empty".to_string(),
            ));
        }
        if request.text.chars().count() > self.config.max_text_length {
            return Err(TranslateError::InvalidRequest(format!(
                "text exceeds maximum length of {} characters",
                self.config.max_text_length
            )));
        }
        // The language-pair validator runs upstream; only the equal-pair
        // invariant is re-checked here.
        if request.source_lang == request.target_lang {
            return Err(TranslateError::InvalidRequest(
                "source and target languages must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Typed outcome of one attempt in the fallback chain.
enum Attempt {
    Accepted(TranslationResult),
    LowConfidence(TranslationResult),
    HardFailure,
}

/// The hint reorders candidates, it never filters: the hinted engine moves
/// to the front if present, everything else keeps its order.
fn reorder_for_hint(candidates: &mut Vec<Candidate>, hint: Option<&str>) {
    if let Some(hint) = hint {
        if let Some(pos) = candidates.iter().position(|c| c.id == hint) {
            let hinted = candidates.remove(pos);
            candidates.insert(0, hinted);
        }
    }
}
