//! Rate-limit coordination
//!
//! One gate shared by every sender of a run. A 429 anywhere pushes the
//! next allowed send time forward for everyone; the gate never moves back.

use crate::clock::Clock;
use crate::config::MAX_RETRY_AFTER;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::warn;

#[derive(Debug, Default)]
struct RateLimitState {
    next_allowed_send: Option<Instant>,
    last_retry_after: Option<Duration>,
}

/// Shared backoff gate
pub struct RateLimitCoordinator {
    clock: Arc<dyn Clock>,
    default_retry_after: Duration,
    state: Mutex<RateLimitState>,
    turn: AsyncMutex<()>,
}

impl RateLimitCoordinator {
    /// Create a coordinator; `default_retry_after` applies to 429s
    /// without a `Retry-After` header
    pub fn new(clock: Arc<dyn Clock>, default_retry_after: Duration) -> Self {
        Self {
            clock,
            default_retry_after,
            state: Mutex::new(RateLimitState::default()),
            turn: AsyncMutex::new(()),
        }
    }

    /// How long to wait before the next send
    pub fn before_send(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .next_allowed_send
            .map_or(Duration::ZERO, |next| {
                next.saturating_duration_since(self.clock.now())
            })
    }

    /// Record a 429
    ///
    /// `next = now + max(remaining, retry_after or default)`, never earlier
    /// than the current gate. Waits are capped at [`MAX_RETRY_AFTER`].
    pub fn on_rate_limited(&self, retry_after: Option<Duration>) {
        let now = self.clock.now();
        let hint = retry_after
            .unwrap_or(self.default_retry_after)
            .min(MAX_RETRY_AFTER);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = state
            .next_allowed_send
            .map_or(Duration::ZERO, |next| next.saturating_duration_since(now));
        let candidate = now.checked_add(remaining.max(hint));

        state.next_allowed_send = match (state.next_allowed_send, candidate) {
            (Some(current), Some(candidate)) => Some(current.max(candidate)),
            (current, None) => current.or(Some(now)),
            (None, candidate) => candidate,
        };
        state.last_retry_after = retry_after;

        warn!(
            retry_after_secs = hint.as_secs_f64(),
            "rate limited by remote service"
        );
    }

    /// Earliest instant the next send may happen, if a 429 was seen
    pub fn next_allowed_send(&self) -> Option<Instant> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_allowed_send
    }

    /// Last `Retry-After` value observed
    pub fn last_retry_after(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_retry_after
    }

    /// Take the sender turn
    ///
    /// Hold the guard across `before_send` and the sleep that follows.
    pub async fn turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }
}
