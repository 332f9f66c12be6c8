//! Engine capability: a pluggable translation backend.
//! Backends are polymorphic over a single `translate` operation and
//! dispatched through trait objects — no inheritance hierarchy. The
//! registry owns all engine handles; nothing is looked up ambiently.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

mod mock;
mod remote;

pub use mock::MockEngine;
pub use remote::RemoteHttpEngine;

/// Raw output of one engine invocation. Latency is measured by the caller,
/// not self-reported.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub translated_text: String,
    /// Engine-reported confidence in [0, 1].
    pub confidence: f32,
    /// Lower-ranked candidate translations, best first.
    pub alternatives: Vec<String>,
}

/// A translation backend. Implementations must honor the cancellation token
/// at their suspension points and return `EngineError::Cancelled` rather
/// than a fabricated failure.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<EngineOutput, EngineError>;
}
