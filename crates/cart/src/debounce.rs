//! Cancellable debounce utility.
//!
//! Each [`Debouncer`] owns at most one pending task. Scheduling replaces and
//! aborts the previous pending task, so only the last write within the
//! window fires. Owners must call [`Debouncer::cancel`] on teardown.

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Trailing-edge debouncer for remote writes.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer with the given inactivity window.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `work` to run after the inactivity window, aborting any
    /// previously scheduled work.
    pub fn schedule<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Capture the deadline now rather than at the task's first poll, so
        // the window is measured from the schedule call (deterministic under
        // a paused test clock).
        let deadline = Instant::now() + self.delay;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            work.await;
        });
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Abort pending work without running it. Returns whether anything was
    /// pending.
    pub fn cancel(&self) -> bool {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
                return true;
            }
        }
        false
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, advance};

    #[tokio::test(start_paused = true)]
    async fn test_only_last_scheduled_work_fires() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            debouncer.schedule(async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            advance(Duration::from_millis(200)).await;
        }

        advance(Duration::from_millis(1100)).await;
        // Let the spawned task run to completion.
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let debouncer = Debouncer::new(Duration::from_millis(1000));
        let fired = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&fired);
        debouncer.schedule(async move {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.cancel());

        advance(Duration::from_millis(2000)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }
}
