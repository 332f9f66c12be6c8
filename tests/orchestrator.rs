//! End-to-end scenarios across orchestrator, registry, cache and batch
//! coordinator, driven by scripted engines with deterministic outcomes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use anuvad::batch::BatchCoordinator;
use anuvad::cache::TranslationCache;
use anuvad::config::CoreConfig;
use anuvad::engine::{Engine, EngineOutput};
use anuvad::error::{EngineError, TranslateError};
use anuvad::metrics::{metric_names, MetricsRegistry};
use anuvad::orchestrator::Orchestrator;
use anuvad::registry::{BreakerPolicy, EngineDescriptor, EngineRegistry};
use anuvad::types::{BatchRequest, TranslationRequest};

#[derive(Clone)]
enum Behavior {
    /// Succeed with the given confidence.
    Succeed { confidence: f32 },
    /// Always hard-fail.
    Fail,
    /// Never respond; the per-call timeout fires.
    Hang,
    /// Never respond and ignore the cancellation token.
    Stall,
    /// Hard-fail only for texts containing the marker, otherwise succeed.
    FailOn { marker: &'static str, confidence: f32 },
}

struct ScriptedEngine {
    label: &'static str,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicU64,
}

impl ScriptedEngine {
    fn new(label: &'static str, behavior: Behavior) -> Arc<Self> {
        Self::with_delay(label, behavior, Duration::ZERO)
    }

    fn with_delay(label: &'static str, behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            label,
            behavior,
            delay,
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn translate(
        &self,
        text: &str,
        _source_lang: &str,
        _target_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Behavior::Stall = self.behavior {
            tokio::time::sleep(Duration::from_secs(300)).await;
            return Err(EngineError::Api("stalled".to_string()));
        }

        let delay = match self.behavior {
            Behavior::Hang => Duration::from_secs(300),
            _ => self.delay,
        };
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }

        let confidence = match self.behavior {
            Behavior::Succeed { confidence } => confidence,
            Behavior::Fail | Behavior::Hang | Behavior::Stall => {
                return Err(EngineError::Api("scripted failure".to_string()))
            }
            Behavior::FailOn { marker, confidence } => {
                if text.contains(marker) {
                    return Err(EngineError::Api("scripted failure".to_string()));
                }
                confidence
            }
        };

        Ok(EngineOutput {
            translated_text: format!("{}:{}", self.label, text),
            confidence,
            alternatives: Vec::new(),
        })
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    metrics: Arc<MetricsRegistry>,
    cache: Arc<TranslationCache>,
}

impl Harness {
    /// Registry of en->hi engines ordered by the given priorities.
    fn new(engines: &[(u32, &Arc<ScriptedEngine>)], config: CoreConfig) -> Self {
        let mut registry = EngineRegistry::new(BreakerPolicy {
            failure_threshold: config.breaker_failure_threshold,
            failure_window: config.breaker_failure_window,
            probe_interval: config.breaker_probe_interval,
        });
        for (priority, engine) in engines {
            registry.register(
                EngineDescriptor::new(engine.label, *priority).with_pair("en", "hi"),
                Arc::clone(*engine) as Arc<dyn Engine>,
            );
        }
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = Arc::new(TranslationCache::new(config.cache_capacity));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(registry),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config,
        ));
        Self {
            orchestrator,
            metrics,
            cache,
        }
    }
}

fn fast_config() -> CoreConfig {
    CoreConfig {
        engine_timeout: Duration::from_millis(100),
        ..CoreConfig::default()
    }
}

#[tokio::test]
async fn cold_cache_uses_priority_one_then_serves_from_cache() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let e2 = ScriptedEngine::new("e2", Behavior::Succeed { confidence: 0.95 });
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    let cold = h
        .orchestrator
        .translate(&TranslationRequest::new("Hello", "en", "hi"))
        .await
        .unwrap();
    assert_eq!(cold.engine_used, "e1");
    assert_eq!(cold.translated_text, "e1:Hello");
    assert!(!cold.from_cache);

    let warm = h
        .orchestrator
        .translate(&TranslationRequest::new("Hello", "en", "hi"))
        .await
        .unwrap();
    assert!(warm.from_cache);
    assert_eq!(warm.translated_text, cold.translated_text);
    assert_eq!(warm.engine_used, "e1");

    assert_eq!(e1.calls(), 1);
    assert_eq!(e2.calls(), 0);
    assert_eq!(h.metrics.counter(metric_names::CACHE_MISS), 1);
    assert_eq!(h.metrics.counter(metric_names::CACHE_HIT), 1);
}

#[tokio::test]
async fn cache_hits_are_normalization_and_engine_transparent() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1)], fast_config());

    let first = h
        .orchestrator
        .translate(&TranslationRequest::new("  Hello   World ", "en", "hi"))
        .await
        .unwrap();
    // Same normalized fingerprint: whitespace collapsed, Latin case-folded.
    let second = h
        .orchestrator
        .translate(&TranslationRequest::new("hello world", "en", "hi"))
        .await
        .unwrap();

    assert!(second.from_cache);
    assert_eq!(second.translated_text, first.translated_text);
    assert_eq!(e1.calls(), 1);
}

#[tokio::test]
async fn timeout_falls_back_and_marks_engine_unhealthy_after_three() {
    let e1 = ScriptedEngine::new("e1", Behavior::Hang);
    let e2 = ScriptedEngine::new("e2", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    for i in 0..3 {
        let request =
            TranslationRequest::new(format!("text {i}"), "en", "hi").without_cache();
        let result = h.orchestrator.translate(&request).await.unwrap();
        assert_eq!(result.engine_used, "e2");
    }

    let snapshot = h.orchestrator.registry().snapshot();
    let e1_snap = snapshot.iter().find(|s| s.id == "e1").unwrap();
    assert!(!e1_snap.healthy);
    assert_eq!(h.metrics.counter(metric_names::ENGINE_UNHEALTHY), 1);
    assert_eq!(h.metrics.counter(metric_names::FALLBACK_TRIGGERED), 3);

    // With the breaker open, requests route straight to e2.
    let calls_before = e1.calls();
    let result = h
        .orchestrator
        .translate(&TranslationRequest::new("after breaker", "en", "hi").without_cache())
        .await
        .unwrap();
    assert_eq!(result.engine_used, "e2");
    assert_eq!(e1.calls(), calls_before);
}

#[tokio::test]
async fn degraded_success_prefers_best_confidence() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.2 });
    let e2 = ScriptedEngine::new("e2", Behavior::Succeed { confidence: 0.45 });
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    let result = h
        .orchestrator
        .translate(&TranslationRequest::new("Hello", "en", "hi").without_cache())
        .await
        .unwrap();

    // Both below the 0.5 gate: the best of the attempts wins.
    assert_eq!(result.engine_used, "e2");
    assert_eq!(result.confidence, 0.45);
    assert_eq!(e1.calls(), 1);
    assert_eq!(e2.calls(), 1);
}

#[tokio::test]
async fn degraded_results_expire_quickly() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.3 });
    let config = CoreConfig {
        cache_ttl_degraded: Duration::from_millis(40),
        ..fast_config()
    };
    let h = Harness::new(&[(1, &e1)], config);

    let request = TranslationRequest::new("Hello", "en", "hi");
    let first = h.orchestrator.translate(&request).await.unwrap();
    assert!(!first.from_cache);

    let warm = h.orchestrator.translate(&request).await.unwrap();
    assert!(warm.from_cache);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let expired = h.orchestrator.translate(&request).await.unwrap();
    assert!(!expired.from_cache);
    assert_eq!(e1.calls(), 2);
}

#[tokio::test]
async fn hard_failures_do_not_count_toward_best_result() {
    let e1 = ScriptedEngine::new("e1", Behavior::Fail);
    let e2 = ScriptedEngine::new("e2", Behavior::Succeed { confidence: 0.3 });
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    let result = h
        .orchestrator
        .translate(&TranslationRequest::new("Hello", "en", "hi").without_cache())
        .await
        .unwrap();
    assert_eq!(result.engine_used, "e2");
    assert_eq!(result.confidence, 0.3);
}

#[tokio::test]
async fn all_hard_failures_yield_all_engines_failed() {
    let e1 = ScriptedEngine::new("e1", Behavior::Fail);
    let e2 = ScriptedEngine::new("e2", Behavior::Fail);
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    let err = h
        .orchestrator
        .translate(&TranslationRequest::new("Hello", "en", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err, TranslateError::AllEnginesFailed { attempts: 2 });
}

#[tokio::test]
async fn uncovered_pair_yields_no_engine_available() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1)], fast_config());

    let err = h
        .orchestrator
        .translate(&TranslationRequest::new("Bonjour", "fr", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::NoEngineAvailable { .. }));
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_engine_call() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1)], fast_config());

    let same_pair = TranslationRequest::new("Hello", "en", "en");
    assert!(matches!(
        h.orchestrator.translate(&same_pair).await,
        Err(TranslateError::InvalidRequest(_))
    ));

    let empty = TranslationRequest::new("   ", "en", "hi");
    assert!(matches!(
        h.orchestrator.translate(&empty).await,
        Err(TranslateError::InvalidRequest(_))
    ));

    assert_eq!(e1.calls(), 0);
}

#[tokio::test]
async fn engine_hint_reorders_but_does_not_filter() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let e2 = ScriptedEngine::new("e2", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1), (2, &e2)], fast_config());

    let hinted = TranslationRequest::new("Hello", "en", "hi")
        .without_cache()
        .with_engine_hint("e2");
    assert_eq!(
        h.orchestrator.translate(&hinted).await.unwrap().engine_used,
        "e2"
    );

    // An unknown hint falls back to the normal order.
    let unknown = TranslationRequest::new("Hello", "en", "hi")
        .without_cache()
        .with_engine_hint("nonexistent");
    assert_eq!(
        h.orchestrator.translate(&unknown).await.unwrap().engine_used,
        "e1"
    );
}

#[tokio::test]
async fn repeated_uncached_requests_are_idempotent() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &e1)], fast_config());

    let request = TranslationRequest::new("Hello", "en", "hi").without_cache();
    let first = h.orchestrator.translate(&request).await.unwrap();
    let second = h.orchestrator.translate(&request).await.unwrap();

    assert_eq!(first.translated_text, second.translated_text);
    assert!(!first.from_cache && !second.from_cache);
    assert_eq!(e1.calls(), 2);
}

#[tokio::test]
async fn cancelled_request_reports_cancelled_and_writes_nothing() {
    let e1 = ScriptedEngine::with_delay(
        "e1",
        Behavior::Succeed { confidence: 0.9 },
        Duration::from_secs(60),
    );
    let config = CoreConfig {
        engine_timeout: Duration::from_secs(120),
        ..CoreConfig::default()
    };
    let h = Harness::new(&[(1, &e1)], config);

    let token = CancellationToken::new();
    let request = TranslationRequest::new("Hello", "en", "hi");
    let orchestrator = Arc::clone(&h.orchestrator);
    let child = token.child_token();
    let task = tokio::spawn(async move {
        orchestrator.translate_with_cancel(&request, &child).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    assert_eq!(task.await.unwrap(), Err(TranslateError::Cancelled));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn batch_isolates_item_failures() {
    let engine = ScriptedEngine::new(
        "e1",
        Behavior::FailOn {
            marker: "boom",
            confidence: 0.9,
        },
    );
    let h = Harness::new(&[(1, &engine)], fast_config());
    let batches = BatchCoordinator::new(Arc::clone(&h.orchestrator));

    let texts: Vec<String> = ["one", "two", "boom three", "four", "five"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let result = batches
        .translate_batch(&BatchRequest::new("en", "hi", texts, 5_000))
        .await;

    assert_eq!(result.outcomes.len(), 5);
    assert!(result.any_succeeded());
    assert_eq!(result.succeeded(), 4);
    for (i, outcome) in result.outcomes.iter().enumerate() {
        if i == 2 {
            assert_eq!(
                outcome.as_ref().unwrap_err(),
                &TranslateError::AllEnginesFailed { attempts: 1 }
            );
        } else {
            let translation = outcome.as_ref().unwrap();
            assert!(translation.translated_text.ends_with(&format!(
                ":{}",
                ["one", "two", "", "four", "five"][i]
            )));
        }
    }
}

#[tokio::test]
async fn batch_deadline_cancels_unfinished_items_only() {
    let engine = ScriptedEngine::with_delay(
        "e1",
        Behavior::Succeed { confidence: 0.9 },
        Duration::from_millis(200),
    );
    let config = CoreConfig {
        batch_concurrency: 1,
        engine_timeout: Duration::from_secs(5),
        ..CoreConfig::default()
    };
    let h = Harness::new(&[(1, &engine)], config);
    let batches = BatchCoordinator::new(Arc::clone(&h.orchestrator));

    let texts: Vec<String> = ["first", "second", "third"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let result = batches
        .translate_batch(&BatchRequest::new("en", "hi", texts, 320))
        .await;

    assert_eq!(result.outcomes.len(), 3);
    // The first item finishes inside the budget and keeps its result.
    assert_eq!(
        result.outcomes[0].as_ref().unwrap().translated_text,
        "e1:first"
    );
    assert_eq!(
        result.outcomes[1].as_ref().unwrap_err(),
        &TranslateError::DeadlineExceeded
    );
    assert_eq!(
        result.outcomes[2].as_ref().unwrap_err(),
        &TranslateError::DeadlineExceeded
    );
}

#[tokio::test]
async fn duplicate_batch_texts_are_independent_lookups() {
    let engine = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &engine)], fast_config());
    let batches = BatchCoordinator::new(Arc::clone(&h.orchestrator));

    let texts = vec!["Hello".to_string(), "Hello".to_string()];
    let result = batches
        .translate_batch(&BatchRequest::new("en", "hi", texts, 5_000))
        .await;

    assert_eq!(result.succeeded(), 2);
    let a = result.outcomes[0].as_ref().unwrap();
    let b = result.outcomes[1].as_ref().unwrap();
    assert_eq!(a.translated_text, b.translated_text);
}

#[tokio::test]
async fn unattempted_probe_admission_is_returned() {
    let e1 = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let e2 = ScriptedEngine::new("e2", Behavior::Fail);
    let config = CoreConfig {
        breaker_failure_threshold: 1,
        breaker_probe_interval: Duration::from_millis(200),
        ..fast_config()
    };
    let h = Harness::new(&[(1, &e1), (2, &e2)], config);

    // Open e2's breaker by hinting it to the front.
    let hinted = TranslationRequest::new("Hello", "en", "hi")
        .without_cache()
        .with_engine_hint("e2");
    assert_eq!(h.orchestrator.translate(&hinted).await.unwrap().engine_used, "e1");
    let snapshot = h.orchestrator.registry().snapshot();
    assert!(!snapshot.iter().find(|s| s.id == "e2").unwrap().healthy);

    tokio::time::sleep(Duration::from_millis(250)).await;

    // e1 answers first, so e2's probe admission goes unused; it must be
    // returned rather than consumed for a full probe interval.
    let request = TranslationRequest::new("World", "en", "hi").without_cache();
    assert_eq!(h.orchestrator.translate(&request).await.unwrap().engine_used, "e1");
    assert_eq!(e2.calls(), 1);

    let ids: Vec<String> = h
        .orchestrator
        .registry()
        .select("en", "hi", &HashSet::new())
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert!(ids.contains(&"e2".to_string()));
}

#[tokio::test]
async fn batch_reply_is_not_held_up_by_engines_ignoring_cancellation() {
    let engine = ScriptedEngine::new("e1", Behavior::Stall);
    let config = CoreConfig {
        engine_timeout: Duration::from_secs(30),
        ..CoreConfig::default()
    };
    let h = Harness::new(&[(1, &engine)], config);
    let batches = BatchCoordinator::new(Arc::clone(&h.orchestrator));

    let texts = vec!["first".to_string(), "second".to_string()];
    let started = std::time::Instant::now();
    let result = batches
        .translate_batch(&BatchRequest::new("en", "hi", texts, 100))
        .await;

    // Deadline plus the abort grace, not the engine timeout.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.outcomes.len(), 2);
    for outcome in &result.outcomes {
        assert_eq!(
            outcome.as_ref().unwrap_err(),
            &TranslateError::DeadlineExceeded
        );
    }
}

#[tokio::test]
async fn batch_envelope_never_raises_for_invalid_pair() {
    let engine = ScriptedEngine::new("e1", Behavior::Succeed { confidence: 0.9 });
    let h = Harness::new(&[(1, &engine)], fast_config());
    let batches = BatchCoordinator::new(Arc::clone(&h.orchestrator));

    let texts = vec!["Hello".to_string(), "World".to_string()];
    let result = batches
        .translate_batch(&BatchRequest::new("en", "en", texts, 5_000))
        .await;

    assert_eq!(result.outcomes.len(), 2);
    for outcome in &result.outcomes {
        assert!(matches!(outcome, Err(TranslateError::InvalidRequest(_))));
    }
}
