//! Batch execution
//!
//! Sends one batch through the `$batch` endpoint and drives every item to a
//! final state: rate-limited items go back out as a smaller batch, transient
//! failures are retried one at a time with exponential backoff.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::remote::{assignment_request, AssignmentService, SubResponse, SYNTHETIC_STATUS};
use crate::submit::batch::BatchEnvelope;
use crate::submit::classify::{classify, permanent_kind, Outcome};
use crate::submit::progress::{Phase, ProgressReporter};
use crate::submit::rate_limit::RateLimitCoordinator;
use crate::types::{FailureKind, ItemStatus, WorkItem};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Note recorded on items the server reported as already assigned
pub const ALREADY_EXISTS: &str = "already exists";

/// Items of one batch, all in a final state, in input order
#[derive(Debug)]
pub struct BatchRun {
    /// The batch's items
    pub items: Vec<WorkItem>,
    /// Envelope-level transport failure, if the batch could not be delivered
    pub fault: Option<Error>,
}

impl BatchRun {
    /// Whether any item reached `completed` through the wire
    pub fn any_completed(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.status == ItemStatus::Completed)
    }
}

/// Backoff before retry number `attempt` (1-based): 2, 4, 8... seconds
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Executes batches against an [`AssignmentService`]
///
/// Cheap to clone; clones share the service, the rate-limit gate and the
/// progress reporter.
#[derive(Clone)]
pub struct BatchExecutor {
    service: Arc<dyn AssignmentService>,
    limiter: Arc<RateLimitCoordinator>,
    clock: Arc<dyn Clock>,
    reporter: Arc<ProgressReporter>,
    cancel: CancellationToken,
    retry_limit: u32,
}

type Slot = (usize, WorkItem);

impl BatchExecutor {
    /// Create an executor
    pub fn new(
        service: Arc<dyn AssignmentService>,
        limiter: Arc<RateLimitCoordinator>,
        clock: Arc<dyn Clock>,
        reporter: Arc<ProgressReporter>,
        cancel: CancellationToken,
        retry_limit: u32,
    ) -> Self {
        Self {
            service,
            limiter,
            clock,
            reporter,
            cancel,
            retry_limit,
        }
    }

    /// Execute one batch
    ///
    /// Never fails: per-item outcomes live on the items, and an
    /// undeliverable envelope is reported through [`BatchRun::fault`].
    pub async fn execute(&self, batch: Vec<WorkItem>) -> BatchRun {
        let total = batch.len();
        let mut pending: Vec<Slot> = batch.into_iter().enumerate().collect();
        let mut finished: Vec<Slot> = Vec::with_capacity(total);
        let mut fault = None;

        while !pending.is_empty() {
            if let Err(e) = self.wait_for_window(pending.len()).await {
                debug!(error = %e, "batch stopped before send");
                self.cancel_all(&mut pending, &mut finished).await;
                break;
            }

            let envelope = BatchEnvelope::new(pending.iter().map(|(_, item)| item));
            for (_, item) in &mut pending {
                item.mark_submitted();
            }
            debug!(size = envelope.len(), "sending batch");

            let responses = match self.send_envelope(&envelope).await {
                Ok(responses) => envelope.correlate(responses),
                Err(Error::Cancelled) => {
                    self.cancel_all(&mut pending, &mut finished).await;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, size = pending.len(), "batch could not be delivered");
                    for (pos, mut item) in pending.drain(..) {
                        item.mark_failed(FailureKind::Transport, e.to_string());
                        self.reporter.item_finished(&item).await;
                        finished.push((pos, item));
                    }
                    fault = Some(e);
                    break;
                }
            };

            let mut rate_limited = Vec::new();
            let mut transient = Vec::new();

            for ((pos, mut item), response) in pending.drain(..).zip(responses) {
                match classify(&response) {
                    Outcome::RateLimited { retry_after } => {
                        self.limiter.on_rate_limited(retry_after);
                        item.mark_retrying();
                        rate_limited.push((pos, item));
                    }
                    Outcome::TransientFailure { code, message } => {
                        transient.push((pos, item, describe(code, &message)));
                    }
                    outcome => {
                        settle(&mut item, outcome);
                        self.reporter.item_finished(&item).await;
                        finished.push((pos, item));
                    }
                }
            }

            for (pos, item, last_error) in transient {
                let item = self.retry_single(item, last_error).await;
                self.reporter.item_finished(&item).await;
                finished.push((pos, item));
            }

            if !rate_limited.is_empty() {
                debug!(count = rate_limited.len(), "resubmitting rate-limited items");
            }
            pending = rate_limited;
        }

        finished.sort_by_key(|(pos, _)| *pos);
        BatchRun {
            items: finished.into_iter().map(|(_, item)| item).collect(),
            fault,
        }
    }

    /// Wait for the rate-limit window on behalf of `count` items
    ///
    /// The coordinator's turn is held across the sleep so concurrent
    /// batches queue behind one wait instead of each sleeping on its own.
    async fn wait_for_window(&self, count: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _turn = self.limiter.turn().await;
        let wait = self.limiter.before_send();
        if wait.is_zero() {
            return Ok(());
        }

        self.reporter.waiting_started(count);
        self.reporter.phase(Phase::RateLimited { wait }).await;
        let slept = self.clock.sleep(wait, &self.cancel).await;
        self.reporter.waiting_finished(count);
        if slept.is_ok() {
            self.reporter.resume_submitting().await;
        }
        slept
    }

    /// Send an envelope, re-sending it whole on transport failure
    async fn send_envelope(&self, envelope: &BatchEnvelope) -> Result<Vec<SubResponse>> {
        let mut attempt = 0;
        loop {
            match self.service.submit_batch(envelope.requests()).await {
                Ok(responses) => return Ok(responses),
                Err(e) if attempt < self.retry_limit => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "batch transport failure, retrying"
                    );
                    self.clock.sleep(delay, &self.cancel).await?;
                    self.wait_for_window(envelope.len()).await?;
                }
                Err(e) => return Err(Error::Transport(e.to_string())),
            }
        }
    }

    /// Retry one transiently failed item on its own until it settles
    ///
    /// Each attempt sleeps `2^attempt` seconds first. A 429 during a retry
    /// waits out the rate-limit window without spending an attempt.
    async fn retry_single(&self, mut item: WorkItem, mut last_error: String) -> WorkItem {
        loop {
            if item.attempt_count >= self.retry_limit {
                item.mark_failed(
                    FailureKind::ExhaustedRetries,
                    format!("{last_error} (after {} retries)", item.attempt_count),
                );
                return item;
            }

            item.attempt_count += 1;
            item.mark_retrying();
            let delay = backoff(item.attempt_count);
            warn!(
                item = %item.label(),
                attempt = item.attempt_count,
                delay_secs = delay.as_secs(),
                "retrying after transient failure"
            );

            self.reporter.waiting_started(1);
            let slept = self.clock.sleep(delay, &self.cancel).await;
            self.reporter.waiting_finished(1);
            if slept.is_err() {
                item.mark_cancelled();
                return item;
            }

            loop {
                if self.wait_for_window(1).await.is_err() {
                    item.mark_cancelled();
                    return item;
                }

                item.mark_submitted();
                let request = assignment_request(&item, "1");
                let response = match self.service.submit_one(&request).await {
                    Ok(response) => response,
                    Err(e) => {
                        last_error = e.to_string();
                        break;
                    }
                };

                match classify(&response) {
                    Outcome::RateLimited { retry_after } => {
                        self.limiter.on_rate_limited(retry_after);
                        item.mark_retrying();
                    }
                    Outcome::TransientFailure { code, message } => {
                        last_error = describe(code, &message);
                        break;
                    }
                    outcome => {
                        settle(&mut item, outcome);
                        return item;
                    }
                }
            }
        }
    }

    async fn cancel_all(&self, pending: &mut Vec<Slot>, finished: &mut Vec<Slot>) {
        for (pos, mut item) in pending.drain(..) {
            item.mark_cancelled();
            self.reporter.item_finished(&item).await;
            finished.push((pos, item));
        }
    }
}

/// Record a success or permanent outcome on `item`
///
/// Rate-limited and transient outcomes leave the item untouched.
fn settle(item: &mut WorkItem, outcome: Outcome) {
    match outcome {
        Outcome::Success => item.mark_completed(None),
        Outcome::AlreadyExists => item.mark_completed(Some(ALREADY_EXISTS)),
        Outcome::PermanentFailure { code, message } => {
            let kind = permanent_kind(code).unwrap_or(FailureKind::InvalidRequest);
            item.mark_failed(kind, describe(code, &message));
        }
        Outcome::RateLimited { .. } | Outcome::TransientFailure { .. } => {}
    }
}

fn describe(code: u16, message: &str) -> String {
    if code == SYNTHETIC_STATUS {
        message.to_string()
    } else {
        format!("HTTP {code}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let delays: Vec<u64> = (1..=3).map(|a| backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8]);
    }

    #[test]
    fn test_settle_leaves_retryable_outcomes_pending() {
        use crate::types::{ArtifactKind, ArtifactRef, AssignmentTarget, Intent};

        let artifact = ArtifactRef::new("a", "A", ArtifactKind::App);
        let mut item = WorkItem::new(&artifact, AssignmentTarget::AllUsers, Intent::Required);

        settle(&mut item, Outcome::RateLimited { retry_after: None });
        assert_eq!(item.status, ItemStatus::Pending);

        settle(
            &mut item,
            Outcome::PermanentFailure {
                code: 403,
                message: "Forbidden".into(),
            },
        );
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.failure_kind, Some(FailureKind::Forbidden));
        assert_eq!(item.last_error.as_deref(), Some("HTTP 403: Forbidden"));
    }

    #[test]
    fn test_describe_skips_code_for_local_failures() {
        assert_eq!(describe(503, "Service unavailable"), "HTTP 503: Service unavailable");
        assert_eq!(describe(0, "missing from batch response"), "missing from batch response");
    }
}
