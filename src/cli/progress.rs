//! Live progress bar for bulk runs

use crate::cli::style::{bar_style, Stylize};
use async_trait::async_trait;
use bulk_assign::submit::{Phase, ProgressCallback};
use bulk_assign::types::{ItemStatus, WorkItem};
use indicatif::{ProgressBar, ProgressDrawTarget};
use std::time::Duration;

/// Progress callback drawing an `indicatif` bar on stderr
///
/// Hidden in JSON mode so stdout stays machine-readable.
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    /// Create a bar for `total` items
    pub fn new(total: usize, hidden: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(total as u64),
            if hidden {
                ProgressDrawTarget::hidden()
            } else {
                ProgressDrawTarget::stderr()
            },
        );
        bar.set_style(bar_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Clear the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl ProgressCallback for CliProgress {
    async fn on_phase(&self, phase: Phase) {
        match phase {
            Phase::RateLimited { .. } => self.bar.set_message(phase.to_string().warn().to_string()),
            _ => self.bar.set_message(phase.to_string()),
        }
    }

    async fn on_item_finished(&self, item: &WorkItem) {
        self.bar.inc(1);
        if item.status == ItemStatus::Failed {
            self.bar.println(format!(
                "  {} {}: {}",
                "failed".error(),
                item.label(),
                item.last_error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    async fn on_message(&self, message: &str) {
        self.bar.println(format!("  {}", message.muted()));
    }
}
