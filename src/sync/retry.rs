//! Push retry scheduling
//!
//! A single pending-timer slot: arming replaces (and aborts) whatever was
//! armed before, so failures re-arm exactly one timer and never stack.
//! While offline no timer runs; a pending flag is set instead and consumed
//! on the connectivity edge.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Retry scheduler with one timer slot and an offline pending flag
pub struct RetryScheduler {
    delay: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
    pending: AtomicBool,
}

impl RetryScheduler {
    /// Create a scheduler with a fixed retry delay
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Mutex::new(None),
            pending: AtomicBool::new(false),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the retry timer, replacing any previously armed one
    ///
    /// After the delay the retry future is detached onto its own task; the
    /// armed window (and with it cancellation) ends when the timer fires.
    pub fn arm<F>(&self, retry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            tokio::spawn(retry);
        });

        let mut slot = self.slot();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        debug!(delay_ms = delay.as_millis() as u64, "Retry timer armed");
    }

    /// Clear the timer slot and the pending flag
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
        self.pending.store(false, Ordering::SeqCst);
    }

    /// Whether a retry timer is currently armed
    pub fn is_armed(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Flag that a push is waiting for connectivity
    pub fn mark_pending(&self) {
        self.pending.store(true, Ordering::SeqCst);
        debug!("Push marked pending until connectivity returns");
    }

    /// Consume the pending flag, returning whether it was set
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    /// Whether a push is waiting for connectivity
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// The configured retry delay
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rearm_replaces_timer() {
        let scheduler = RetryScheduler::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            scheduler.arm(async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.is_armed());

        sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "only the latest timer fires");
        assert!(!scheduler.is_armed());
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let scheduler = RetryScheduler::new(Duration::from_millis(30));
        let fired = Arc::new(AtomicU32::new(0));

        let fired_clone = Arc::clone(&fired);
        scheduler.arm(async move {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test]
    async fn test_pending_flag_is_edge_consumed() {
        let scheduler = RetryScheduler::new(Duration::from_millis(30));
        assert!(!scheduler.take_pending());

        scheduler.mark_pending();
        assert!(scheduler.is_pending());
        assert!(scheduler.take_pending());
        assert!(!scheduler.take_pending(), "flag consumed exactly once");
    }

    #[tokio::test]
    async fn test_cancel_clears_pending() {
        let scheduler = RetryScheduler::new(Duration::from_millis(30));
        scheduler.mark_pending();
        scheduler.cancel();
        assert!(!scheduler.is_pending());
    }
}
