//! Error taxonomy: request-level errors surfaced to the API layer vs
//! per-attempt engine errors that drive fallback. A per-attempt failure only
//! becomes a request error once the candidate list is exhausted.

use serde::Serialize;

/// Request-level error. This is the complete set of failures a caller can
/// observe; engine internals never leak through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TranslateError {
    /// Malformed input: empty or oversize text, equal source/target.
    InvalidRequest(String),
    /// No registered engine covers the language pair.
    NoEngineAvailable {
        source_lang: String,
        target_lang: String,
    },
    /// Every candidate engine hard-failed.
    AllEnginesFailed { attempts: usize },
    /// The batch deadline elapsed before this item finished.
    DeadlineExceeded,
    /// The caller cancelled the request.
    Cancelled,
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            TranslateError::NoEngineAvailable {
                source_lang,
                target_lang,
            } => write!(f, "no engine available for {source_lang}->{target_lang}"),
            TranslateError::AllEnginesFailed { attempts } => {
                write!(f, "all engines failed after {attempts} attempts")
            }
            TranslateError::DeadlineExceeded => write!(f, "deadline exceeded"),
            TranslateError::Cancelled => write!(f, "translation cancelled"),
        }
    }
}

impl std::error::Error for TranslateError {}

/// Per-attempt error returned by a single engine invocation.
/// Recorded against that engine's health and consumed by the fallback loop.
#[derive(Debug, Clone)]
pub enum EngineError {
    Api(String),
    RateLimited { retry_after_ms: u64 },
    Timeout,
    Cancelled,
    InvalidInput(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Api(msg) => write!(f, "API error: {msg}"),
            EngineError::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            EngineError::Timeout => write!(f, "engine timeout"),
            EngineError::Cancelled => write!(f, "engine call cancelled"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
