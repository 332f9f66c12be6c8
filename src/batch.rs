//! Batch coordinator: fans a multi-text request out across the
//! orchestrator under one overall deadline and a concurrency ceiling.
//! Items are isolated — one item's failure never aborts its siblings — and
//! the response is positional: same length, same order as the input. The
//! envelope never fails; per-item errors are embedded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::TranslateError;
use crate::metrics::metric_names;
use crate::orchestrator::Orchestrator;
use crate::types::{BatchRequest, BatchResult, TranslationRequest, TranslationResult};

/// How long after the deadline cancelled items may keep unwinding before
/// their tasks are aborted outright. Bounds the reply delay when an engine
/// ignores its cancellation token.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

pub struct BatchCoordinator {
    orchestrator: Arc<Orchestrator>,
    concurrency: usize,
    max_items: usize,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let concurrency = orchestrator.config().batch_concurrency.max(1);
        let max_items = orchestrator.config().max_batch_items;
        Self {
            orchestrator,
            concurrency,
            max_items,
        }
    }

    /// Translate every text in the batch. When the deadline elapses,
    /// in-flight items are cancelled and unfinished slots report
    /// `DeadlineExceeded`; completed items keep their results. Items still
    /// running `DEADLINE_GRACE` after the deadline are aborted.
    pub async fn translate_batch(&self, batch: &BatchRequest) -> BatchResult {
        let item_count = batch.texts.len();
        if item_count == 0 {
            return BatchResult { outcomes: Vec::new() };
        }
        if item_count > self.max_items {
            let err = TranslateError::InvalidRequest(format!(
                "batch exceeds maximum of {} items",
                self.max_items
            ));
            return BatchResult {
                outcomes: (0..item_count).map(|_| Err(err.clone())).collect(),
            };
        }

        let span = self.orchestrator.metrics().span(metric_names::BATCH_DONE);

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(batch.deadline_ms);
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<(usize, Result<TranslationResult, TranslateError>)> =
            JoinSet::new();

        for (index, text) in batch.texts.iter().enumerate() {
            let mut request =
                TranslationRequest::new(text.clone(), &batch.source_lang, &batch.target_lang);
            request.allow_cache = batch.allow_cache;

            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.child_token();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(TranslateError::Cancelled)),
                };
                if token.is_cancelled() {
                    return (index, Err(TranslateError::DeadlineExceeded));
                }
                let outcome = orchestrator.translate_with_cancel(&request, &token).await;
                // An item cancelled by the deadline reports DeadlineExceeded.
                let outcome = match outcome {
                    Err(TranslateError::Cancelled) if token.is_cancelled() => {
                        Err(TranslateError::DeadlineExceeded)
                    }
                    other => other,
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<TranslationResult, TranslateError>>> =
            (0..item_count).map(|_| None).collect();
        let grace = deadline + DEADLINE_GRACE;
        let mut deadline_fired = false;
        let mut aborted = false;

        while !join_set.is_empty() {
            tokio::select! {
                joined = join_set.join_next() => match joined {
                    Some(Ok((index, outcome))) => outcomes[index] = Some(outcome),
                    // Aborted tasks surface as cancelled join errors; their
                    // slots fall through to DeadlineExceeded below.
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => error!(error = %e, "batch item task failed"),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline), if !deadline_fired => {
                    debug!(deadline_ms = batch.deadline_ms, "batch_deadline_elapsed");
                    deadline_fired = true;
                    cancel.cancel();
                }
                _ = tokio::time::sleep_until(grace), if deadline_fired && !aborted => {
                    warn!("batch items ignored cancellation, aborting");
                    aborted = true;
                    join_set.abort_all();
                }
            }
        }

        span.finish();

        BatchResult {
            outcomes: outcomes
                .into_iter()
                .map(|slot| slot.unwrap_or(Err(TranslateError::DeadlineExceeded)))
                .collect(),
        }
    }
}
