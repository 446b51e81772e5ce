//! Progress reporting for bulk runs
//!
//! Two views of the same run:
//! - [`ProgressSnapshot`], a pollable/observable value behind a
//!   `tokio::sync::watch` channel
//! - [`ProgressCallback`], an event trait so different interfaces (CLI,
//!   web server, etc.) can render progress their own way

use crate::types::{ItemStatus, WorkItem};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing started yet
    Idle,
    /// Removing already-satisfied items
    Validating,
    /// Dispatching batch `batch` (1-based) of `of`
    Submitting {
        /// Batch number, 1-based
        batch: usize,
        /// Number of batches in the run
        of: usize,
    },
    /// Waiting for the rate-limit window to reopen
    RateLimited {
        /// How long the wait is
        wait: Duration,
    },
    /// Settling and refreshing remote state
    Verifying,
    /// Run complete
    Done,
    /// Run cancelled
    Cancelled,
    /// Run aborted: no batch could be delivered
    Failed,
}

impl Phase {
    /// Whether the run is over
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Validating => f.write_str("Validating"),
            Self::Submitting { batch, of } => write!(f, "Submitting batch {batch}/{of}"),
            Self::RateLimited { wait } => {
                write!(f, "Rate limited, waiting {}s", wait.as_secs_f64().ceil())
            }
            Self::Verifying => f.write_str("Verifying"),
            Self::Done => f.write_str("Done"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Observer-visible state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Items in the run, including skipped ones
    pub total: usize,
    /// Items that reached `completed`
    pub completed: usize,
    /// Items that reached `failed`
    pub failed: usize,
    /// Items that reached `cancelled`
    pub cancelled: usize,
    /// Items currently waiting on a backoff or rate-limit window
    pub waiting: usize,
    /// Current phase
    pub phase: Phase,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            total: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            waiting: 0,
            phase: Phase::Idle,
        }
    }
}

impl ProgressSnapshot {
    /// Items in a final state
    pub const fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Progress callback trait
///
/// Implement this trait to receive progress updates during a run.
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    /// Called when entering a new phase
    async fn on_phase(&self, phase: Phase);

    /// Called once per item when it reaches a final state
    async fn on_item_finished(&self, item: &WorkItem);

    /// Called with a general status message
    async fn on_message(&self, message: &str);
}

/// No-op progress callback for testing or when progress isn't needed
pub struct NoopProgress;

#[async_trait]
impl ProgressCallback for NoopProgress {
    async fn on_phase(&self, _phase: Phase) {}
    async fn on_item_finished(&self, _item: &WorkItem) {}
    async fn on_message(&self, _message: &str) {}
}

/// Single writer for the snapshot, fanning events out to the callback
pub struct ProgressReporter {
    tx: watch::Sender<ProgressSnapshot>,
    callback: Arc<dyn ProgressCallback>,
    // Latest `Submitting` phase entered; batch numbers only move forward
    dispatched: Mutex<Option<Phase>>,
}

impl ProgressReporter {
    /// Create a reporter forwarding events to `callback`
    pub fn new(callback: Arc<dyn ProgressCallback>) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self {
            tx,
            callback,
            dispatched: Mutex::new(None),
        }
    }

    /// Observe snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Reset counters for a new run of `total` items
    pub fn start(&self, total: usize) {
        self.tx.send_replace(ProgressSnapshot {
            total,
            ..ProgressSnapshot::default()
        });
        *self.dispatched.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Enter a phase
    pub async fn phase(&self, phase: Phase) {
        if let Phase::Submitting { batch, .. } = phase {
            let mut dispatched = self.dispatched.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(Phase::Submitting { batch: latest, .. }) = *dispatched {
                if batch < latest {
                    return;
                }
            }
            *dispatched = Some(phase);
        }
        self.tx.send_modify(|s| s.phase = phase);
        self.callback.on_phase(phase).await;
    }

    /// Leave a rate-limit wait
    ///
    /// Returns to the latest dispatched batch, unless another phase has
    /// replaced the wait in the meantime.
    pub async fn resume_submitting(&self) {
        if !matches!(self.snapshot().phase, Phase::RateLimited { .. }) {
            return;
        }
        let latest = *self.dispatched.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(phase) = latest {
            self.phase(phase).await;
        }
    }

    /// Count an item that reached a final state
    pub async fn item_finished(&self, item: &WorkItem) {
        self.tx.send_modify(|s| match item.status {
            ItemStatus::Completed => s.completed += 1,
            ItemStatus::Failed => s.failed += 1,
            ItemStatus::Cancelled => s.cancelled += 1,
            _ => {}
        });
        self.callback.on_item_finished(item).await;
    }

    /// Add `count` items to the waiting gauge
    pub fn waiting_started(&self, count: usize) {
        self.tx.send_modify(|s| s.waiting += count);
    }

    /// Remove `count` items from the waiting gauge
    pub fn waiting_finished(&self, count: usize) {
        self.tx
            .send_modify(|s| s.waiting = s.waiting.saturating_sub(count));
    }

    /// Forward a status message
    pub async fn message(&self, message: &str) {
        self.callback.on_message(message).await;
    }
}
