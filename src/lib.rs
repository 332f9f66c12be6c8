//! Anuvad: translation orchestration and caching core.
//!
//! Sits between an API layer and a pool of heterogeneous translation
//! engines. Given a request it picks an engine by priority and health,
//! falls back when an engine is unavailable or below the confidence gate,
//! memoizes results behind a fingerprint-keyed cache, and fans multi-text
//! batches out under a shared deadline with per-item isolation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use anuvad::batch::BatchCoordinator;
//! use anuvad::cache::TranslationCache;
//! use anuvad::config::CoreConfig;
//! use anuvad::engine::MockEngine;
//! use anuvad::metrics::MetricsRegistry;
//! use anuvad::orchestrator::Orchestrator;
//! use anuvad::registry::{BreakerPolicy, EngineDescriptor, EngineRegistry};
//! use anuvad::types::TranslationRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::from_env();
//!
//! let mut registry = EngineRegistry::new(BreakerPolicy::default());
//! registry.register(
//!     EngineDescriptor::new("mock", 1).with_pair("en", "hi"),
//!     Arc::new(MockEngine::new(Duration::from_millis(10))),
//! );
//!
//! let orchestrator = Arc::new(Orchestrator::new(
//!     Arc::new(registry),
//!     Arc::new(TranslationCache::new(config.cache_capacity)),
//!     Arc::new(MetricsRegistry::new()),
//!     config,
//! ));
//! let batches = BatchCoordinator::new(Arc::clone(&orchestrator));
//!
//! let result = orchestrator
//!     .translate(&TranslationRequest::new("Hello", "en", "hi"))
//!     .await?;
//! println!("{} (from {})", result.translated_text, result.engine_used);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod registry;
pub mod types;

pub use batch::BatchCoordinator;
pub use cache::{SqliteCache, TranslationCache};
pub use config::CoreConfig;
pub use engine::{Engine, EngineOutput, MockEngine, RemoteHttpEngine};
pub use error::{EngineError, TranslateError};
pub use metrics::MetricsRegistry;
pub use orchestrator::Orchestrator;
pub use registry::{BreakerPolicy, EngineDescriptor, EngineRegistry};
pub use types::{BatchRequest, BatchResult, TranslationRequest, TranslationResult};
