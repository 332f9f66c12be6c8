//! Remote translation backend over HTTP.
//! Connection pooling via reqwest, simple token-bucket rate limiting,
//! bounded retries: 429 honors Retry-After (max 3), 5xx backs off
//! exponentially (max 2), a transport timeout is retried once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Engine, EngineOutput};
use crate::error::EngineError;

/// Transport backstop for standalone use. Hosts driving this engine
/// through a shorter per-call budget should lower it via
/// [`RemoteHttpEngine::with_request_timeout`].
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON client for an out-of-process translation service exposing
/// `POST /translate`.
pub struct RemoteHttpEngine {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    request_timeout: Duration,
    /// Tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    /// Minimum interval between requests (100ms = 10 req/s).
    min_interval: Duration,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    translated_text: String,
    confidence: f32,
    #[serde(default)]
    alternatives: Vec<String>,
}

impl RemoteHttpEngine {
    /// Create a client for the given endpoint, e.g.
    /// `http://localhost:8100/translate`, with the default transport
    /// timeout.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, EngineError> {
        Self::with_request_timeout(endpoint, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with an explicit per-request transport timeout.
    /// Set it below the caller's per-call budget, otherwise the caller's
    /// timeout fires first and the one-shot timeout retry never runs.
    pub fn with_request_timeout(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::Api(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            request_timeout,
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: Duration::from_millis(100),
        })
    }

    /// The per-request transport timeout this client was built with.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, EngineError> {
        let mut attempt: u32 = 0;
        let max_429_retries: u32 = 3;
        let max_5xx_retries: u32 = 2;
        let mut timeout_retried = false;

        loop {
            let mut request = self.http.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }

            let result = tokio::select! {
                r = request.send() => r,
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            };

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp);
                }
                Ok(resp) if resp.status().as_u16() == 429 => {
                    if attempt >= max_429_retries {
                        return Err(EngineError::RateLimited { retry_after_ms: 0 });
                    }
                    let wait = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Duration::from_secs(1 << attempt));
                    warn!(attempt, wait_ms = wait.as_millis() as u64, "429 rate limited, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= max_5xx_retries {
                        return Err(EngineError::Api(format!("server error: {}", resp.status())));
                    }
                    let wait = Duration::from_millis(500 * (1 << attempt));
                    warn!(
                        attempt,
                        status = resp.status().as_u16(),
                        wait_ms = wait.as_millis() as u64,
                        "5xx error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(EngineError::Api(format!(
                        "unexpected status {}: {}",
                        status,
                        body_text.chars().take(200).collect::<String>()
                    )));
                }
                Err(e) if e.is_timeout() => {
                    if timeout_retried {
                        return Err(EngineError::Timeout);
                    }
                    warn!("request timeout, retrying once");
                    timeout_retried = true;
                }
                Err(e) => {
                    return Err(EngineError::Api(e.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl Engine for RemoteHttpEngine {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        self.rate_limit_wait().await;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let body = serde_json::to_value(WireRequest {
            text,
            source_lang,
            target_lang,
        })
        .map_err(|e| EngineError::Api(e.to_string()))?;

        let response = self.send_with_retry(&body, cancel).await?;

        let parsed: WireResponse = tokio::select! {
            r = response.json() => r.map_err(|e| EngineError::Api(format!("malformed response: {e}")))?,
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        Ok(EngineOutput {
            translated_text: parsed.translated_text,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            alternatives: parsed.alternatives,
        })
    }
}
