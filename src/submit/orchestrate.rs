//! Run orchestration
//!
//! Validate, chunk, execute batches under the concurrency bound, then settle
//! and refresh remote state. The orchestrator owns the progress snapshot and
//! decides what a transport fault means for the run as a whole.

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, MAX_CONCURRENT_BATCHES};
use crate::error::{Error, Result};
use crate::remote::AssignmentService;
use crate::submit::execute::BatchExecutor;
use crate::submit::plan::{create_submission_plan, SubmissionPlan};
use crate::submit::progress::{
    NoopProgress, Phase, ProgressCallback, ProgressReporter, ProgressSnapshot,
};
use crate::submit::rate_limit::RateLimitCoordinator;
use crate::submit::validate::AssignmentIndex;
use crate::types::{ArtifactRef, ItemStatus, WorkItem};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Refreshes the caller's view of remote state after a run
#[async_trait]
pub trait StateRefresher: Send + Sync {
    /// Reload assignments of the given artifacts
    async fn refresh(&self, artifacts: &[ArtifactRef]) -> Result<()>;
}

/// Final outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Items that reached `completed`, skipped ones included
    pub successful: Vec<WorkItem>,
    /// Items that reached `failed`
    pub failed: Vec<WorkItem>,
    /// Items that reached `cancelled`
    pub cancelled: Vec<WorkItem>,
    /// Items skipped because the assignment already existed
    pub skipped_count: usize,
    /// Why the post-run refresh failed, if it did
    pub refresh_error: Option<String>,
}

impl RunResult {
    fn from_items(items: Vec<WorkItem>, skipped_count: usize) -> Self {
        let mut result = Self {
            skipped_count,
            ..Self::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Completed => result.successful.push(item),
                ItemStatus::Failed => result.failed.push(item),
                _ => result.cancelled.push(item),
            }
        }
        result
    }

    /// Every item of the run
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.successful
            .iter()
            .chain(&self.failed)
            .chain(&self.cancelled)
    }

    /// Number of items in the run
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len() + self.cancelled.len()
    }

    /// Whether every item succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    /// Aggregate failure, if any item did not succeed
    ///
    /// Cancelled items count as not succeeded.
    pub fn partial_failure(&self) -> Option<Error> {
        if self.is_success() {
            return None;
        }
        Some(Error::PartialFailure {
            success_count: self.successful.len(),
            fail_count: self.failed.len() + self.cancelled.len(),
        })
    }
}

/// Drives a bulk assignment run
pub struct Orchestrator {
    service: Arc<dyn AssignmentService>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimitCoordinator>,
    refresher: Option<Arc<dyn StateRefresher>>,
    cancel: CancellationToken,
    reporter: Arc<ProgressReporter>,
}

impl Orchestrator {
    /// Create an orchestrator using the system clock and no refresher
    pub fn new(service: Arc<dyn AssignmentService>, config: EngineConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimitCoordinator::new(
            clock.clone(),
            config.default_retry_after(),
        ));
        Self {
            service,
            config,
            clock,
            limiter,
            refresher: None,
            cancel: CancellationToken::new(),
            reporter: Arc::new(ProgressReporter::new(Arc::new(NoopProgress))),
        }
    }

    /// Use a different time source
    ///
    /// Replaces the rate-limit coordinator with one on the new clock; call
    /// [`with_rate_limiter`](Self::with_rate_limiter) afterwards to share one.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = Arc::new(RateLimitCoordinator::new(
            clock.clone(),
            self.config.default_retry_after(),
        ));
        self.clock = clock;
        self
    }

    /// Share a rate-limit coordinator with other runs
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimitCoordinator>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Refresh remote state after successful writes
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn StateRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Use a caller-owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Forward progress events to `callback`
    ///
    /// Receivers obtained from [`progress`](Self::progress) before this call
    /// observe the old reporter.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.reporter = Arc::new(ProgressReporter::new(callback));
        self
    }

    /// Observe the progress snapshot
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.reporter.subscribe()
    }

    /// Token that cancels the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Rate-limit coordinator used by this orchestrator
    pub fn rate_limiter(&self) -> Arc<RateLimitCoordinator> {
        self.limiter.clone()
    }

    /// Validate and chunk without sending anything
    pub fn plan(&self, items: Vec<WorkItem>, known: &AssignmentIndex) -> SubmissionPlan {
        create_submission_plan(items, known, self.config.batch_limit)
    }

    /// Run `items` to completion
    ///
    /// Per-item failures end up on the items; check
    /// [`RunResult::partial_failure`]. Only a transport fault before any
    /// item was written returns `Err`.
    #[allow(clippy::too_many_lines)]
    pub async fn run(&self, items: Vec<WorkItem>, known: &AssignmentIndex) -> Result<RunResult> {
        self.reporter.start(items.len());
        info!(total = items.len(), "starting bulk assignment run");

        self.reporter.phase(Phase::Validating).await;
        let plan = self.plan(items, known);
        let skipped_count = plan.skipped.len();
        if skipped_count > 0 {
            info!(skipped = skipped_count, "skipping existing assignments");
        }

        let mut finished: Vec<WorkItem> = Vec::with_capacity(plan.total());
        for item in plan.skipped {
            self.reporter.item_finished(&item).await;
            finished.push(item);
        }

        let batch_count = plan.batches.len();
        let touched = touched_artifacts(plan.batches.iter().flatten());
        let executor = BatchExecutor::new(
            self.service.clone(),
            self.limiter.clone(),
            self.clock.clone(),
            self.reporter.clone(),
            self.cancel.clone(),
            self.config.retry_limit,
        );
        let in_flight = self
            .config
            .max_concurrent_batches
            .clamp(1, MAX_CONCURRENT_BATCHES);

        let mut queue: VecDeque<(usize, Vec<WorkItem>)> =
            plan.batches.into_iter().enumerate().collect();
        let mut tasks = JoinSet::new();
        let mut completed_runs: Vec<(usize, Vec<WorkItem>)> = Vec::with_capacity(batch_count);
        let mut wrote_any = false;
        let mut fault: Option<Error> = None;

        loop {
            while tasks.len() < in_flight && fault.is_none() && !self.cancel.is_cancelled() {
                let Some((idx, batch)) = queue.pop_front() else {
                    break;
                };
                self.reporter
                    .phase(Phase::Submitting {
                        batch: idx + 1,
                        of: batch_count,
                    })
                    .await;
                debug!(batch = idx + 1, of = batch_count, size = batch.len(), "dispatching batch");

                let executor = executor.clone();
                tasks.spawn(async move { (idx, executor.execute(batch).await) });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (idx, mut run) =
                joined.map_err(|e| Error::Internal(format!("batch task failed: {e}")))?;
            wrote_any |= run.any_completed();
            if let Some(e) = run.fault.take() {
                if fault.is_none() {
                    fault = Some(e);
                }
            }
            completed_runs.push((idx, run.items));
        }

        // Anything still queued was never dispatched.
        for (_, batch) in queue {
            for mut item in batch {
                item.mark_cancelled();
                self.reporter.item_finished(&item).await;
                finished.push(item);
            }
        }

        completed_runs.sort_by_key(|(idx, _)| *idx);
        finished.extend(completed_runs.into_iter().flat_map(|(_, items)| items));

        if let Some(e) = fault {
            if !wrote_any {
                warn!(error = %e, "run aborted: no batch could be delivered");
                self.reporter
                    .message(&format!("run aborted: {e}"))
                    .await;
                self.reporter.phase(Phase::Failed).await;
                return Err(match e {
                    Error::Transport(_) => e,
                    other => Error::Transport(other.to_string()),
                });
            }
            warn!(error = %e, "run stopped early after a transport failure");
        }

        let mut result = RunResult::from_items(finished, skipped_count);

        if self.cancel.is_cancelled() {
            info!(
                successful = result.successful.len(),
                cancelled = result.cancelled.len(),
                "run cancelled"
            );
            self.reporter.phase(Phase::Cancelled).await;
            return Ok(result);
        }

        if wrote_any {
            result.refresh_error = self.verify(&touched).await;
            if self.cancel.is_cancelled() {
                self.reporter.phase(Phase::Cancelled).await;
                return Ok(result);
            }
        }

        info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            skipped = skipped_count,
            "run finished"
        );
        self.reporter.phase(Phase::Done).await;
        Ok(result)
    }

    /// Settle, then refresh the touched artifacts
    ///
    /// Returns the refresh failure message, if any.
    async fn verify(&self, touched: &[ArtifactRef]) -> Option<String> {
        self.reporter.phase(Phase::Verifying).await;
        if self
            .clock
            .sleep(self.config.post_submit_settle(), &self.cancel)
            .await
            .is_err()
        {
            return None;
        }

        let refresher = self.refresher.as_ref()?;
        match refresher.refresh(touched).await {
            Ok(()) => {
                debug!(artifacts = touched.len(), "refreshed remote state");
                None
            }
            Err(e) => {
                let message = format!("could not refresh assignments: {e}");
                warn!(error = %e, "post-run refresh failed");
                self.reporter.message(&message).await;
                Some(message)
            }
        }
    }
}

/// Distinct artifacts of `items`, in first-seen order
fn touched_artifacts<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Vec<ArtifactRef> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.artifact_id.clone()))
        .map(WorkItem::artifact)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactKind, AssignmentTarget, FailureKind, Intent};

    fn item(artifact: &str, status: ItemStatus) -> WorkItem {
        let artifact = ArtifactRef::new(artifact, artifact.to_uppercase(), ArtifactKind::App);
        let mut item = WorkItem::new(&artifact, AssignmentTarget::AllUsers, Intent::Required);
        match status {
            ItemStatus::Completed => item.mark_completed(None),
            ItemStatus::Failed => item.mark_failed(FailureKind::Forbidden, "HTTP 403".into()),
            ItemStatus::Cancelled => item.mark_cancelled(),
            _ => {}
        }
        item
    }

    #[test]
    fn test_all_success_has_no_partial_failure() {
        let result = RunResult::from_items(
            vec![item("a", ItemStatus::Completed), item("b", ItemStatus::Completed)],
            1,
        );
        assert!(result.is_success());
        assert!(result.partial_failure().is_none());
        assert_eq!(result.skipped_count, 1);
    }

    #[test]
    fn test_partial_failure_counts_cancelled_as_unsuccessful() {
        let result = RunResult::from_items(
            vec![
                item("a", ItemStatus::Completed),
                item("b", ItemStatus::Failed),
                item("c", ItemStatus::Cancelled),
            ],
            0,
        );

        let err = result.partial_failure().unwrap();
        assert!(matches!(
            err,
            Error::PartialFailure {
                success_count: 1,
                fail_count: 2
            }
        ));
        assert_eq!(err.to_string(), "2 of 3 assignments failed");
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn test_touched_artifacts_are_distinct_and_ordered() {
        let items = vec![
            item("b", ItemStatus::Pending),
            item("a", ItemStatus::Pending),
            item("b", ItemStatus::Pending),
        ];
        let ids: Vec<String> = touched_artifacts(&items).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
