//! Countdown latch used by the awaiting monitor variants.

use std::time::Duration;

use tokio::sync::watch;

/// A counter that waiters block on until it reaches zero.
#[derive(Debug)]
pub struct CountDownLatch {
    count: watch::Sender<usize>,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        let (count, _) = watch::channel(count);
        Self { count }
    }

    /// Decrement the counter, saturating at zero.
    pub fn count_down(&self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until the counter reaches zero.
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Wait until the counter reaches zero or `timeout` elapses.
    ///
    /// Returns `true` if the counter reached zero.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
