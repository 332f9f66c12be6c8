//! Request and result types shared across the orchestration core.
//! Requests and results are immutable once constructed; cache entries hold
//! results by value and are replaced, never mutated.

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// A single translation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Correlation id carried through logs and metrics.
    pub request_id: String,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Preferred engine. Reorders the candidate list, never filters it.
    pub engine_hint: Option<String>,
    pub allow_cache: bool,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            engine_hint: None,
            allow_cache: true,
        }
    }

    pub fn with_engine_hint(mut self, engine_id: impl Into<String>) -> Self {
        self.engine_hint = Some(engine_id.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.allow_cache = false;
        self
    }
}

/// A completed translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translated_text: String,
    pub engine_used: String,
    /// Engine-reported confidence in [0, 1].
    pub confidence: f32,
    pub latency_ms: f64,
    pub from_cache: bool,
    /// Lower-ranked candidate translations, best first. Often empty.
    pub alternatives: Vec<String>,
}

/// A multi-text request sharing one language pair and one overall deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub source_lang: String,
    pub target_lang: String,
    pub texts: Vec<String>,
    /// Overall time budget for the whole batch, in milliseconds.
    pub deadline_ms: u64,
    pub allow_cache: bool,
}

impl BatchRequest {
    pub fn new(
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        texts: Vec<String>,
        deadline_ms: u64,
    ) -> Self {
        Self {
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            texts,
            deadline_ms,
            allow_cache: true,
        }
    }
}

/// Batch outcome: one entry per input text, same order. The envelope itself
/// never fails; per-item errors are embedded.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<Result<TranslationResult, TranslateError>>,
}

impl BatchResult {
    /// Number of items that produced a translation.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// The batch as a whole succeeds if at least one item succeeded.
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.is_ok())
    }
}
