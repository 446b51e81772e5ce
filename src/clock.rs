//! Time source and cancellable sleeping
//!
//! Every wait in the engine goes through [`Clock`], so retry and rate-limit
//! logic can be driven by [`ManualClock`] in tests instead of wall-clock time.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Scheduler-agnostic time source
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Sleep for `duration`, returning [`Error::Cancelled`] as soon as
    /// `cancel` fires
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Real clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

/// Fake clock: sleeping advances time instantly and is recorded
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a clock starting at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *elapsed += by;
    }

    /// Total time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.sleeps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
        // Let other tasks observe the new time, like a real timer would.
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_records_and_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        let cancel = CancellationToken::new();

        clock.sleep(Duration::from_secs(2), &cancel).await.unwrap();
        clock.sleep(Duration::from_secs(4), &cancel).await.unwrap();

        assert_eq!(clock.now() - start, Duration::from_secs(6));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_sleep_after_cancel_returns_cancelled() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = clock.sleep(Duration::from_secs(1), &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_system_clock_sleep_aborts_promptly_on_cancel() {
        let clock = SystemClock;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = clock.sleep(Duration::from_secs(60), &cancel).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
