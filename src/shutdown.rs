//! Run-scoped stop signal.
//!
//! One `StopSignal` is created per crawl run and cloned into every task that
//! needs to observe cancellation. Triggering is sticky and idempotent:
//! once triggered, the signal stays triggered for the rest of the run.
//!
//! Cancellation is cooperative. Tasks check the signal at admission points
//! and backoff sleeps; in-flight requests are left to complete or time out
//! on their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::info;

#[derive(Debug)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

/// Cloneable handle to a run's stop state.
#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                triggered: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Triggers the signal, waking every current and future waiter.
    ///
    /// Safe to call from multiple places; only the first call logs.
    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            info!("stop requested, winding down");
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Waits until the signal is triggered. Returns immediately if it
    /// already is.
    pub async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        let notified = self.inner.notify.notified();
        // Check again to close the race with a trigger between the load and
        // registering the waiter.
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_starts_untriggered() {
        let signal = StopSignal::new();
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn test_trigger_is_sticky_and_idempotent() {
        let signal = StopSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        clone.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_triggered() {
        let signal = StopSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_on_trigger() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
