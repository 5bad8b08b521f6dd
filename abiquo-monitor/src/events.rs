//! Terminal notifications: per-call callbacks and the process-wide event bus.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::latch::CountDownLatch;

/// Channel capacity for monitor notices.
///
/// A subscriber lagging further behind than this loses the oldest notices.
const CHANNEL_CAPACITY: usize = 256;

/// Terminal outcome of a monitored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorOutcome {
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for MonitorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorOutcome::Completed => write!(f, "completed"),
            MonitorOutcome::Failed => write!(f, "failed"),
            MonitorOutcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Receives the terminal notification of every object in a monitor call.
///
/// Exactly one method is invoked per object. Invocations for different
/// objects may run concurrently.
#[async_trait]
pub trait MonitorCallback<T>: Send + Sync {
    async fn on_completed(&self, target: &T);
    async fn on_failed(&self, target: &T);
    async fn on_timeout(&self, target: &T);
}

/// Dispatch `outcome` to the matching callback method.
pub(crate) async fn dispatch<T>(callback: &dyn MonitorCallback<T>, outcome: MonitorOutcome, target: &T) {
    match outcome {
        MonitorOutcome::Completed => callback.on_completed(target).await,
        MonitorOutcome::Failed => callback.on_failed(target).await,
        MonitorOutcome::Timeout => callback.on_timeout(target).await,
    }
}

/// Callback backing the awaiting variants: every outcome counts down.
pub(crate) struct LatchCallback {
    latch: Arc<CountDownLatch>,
}

impl LatchCallback {
    pub(crate) fn new(latch: Arc<CountDownLatch>) -> Self {
        Self { latch }
    }
}

#[async_trait]
impl<T: Send + Sync> MonitorCallback<T> for LatchCallback {
    async fn on_completed(&self, _target: &T) {
        self.latch.count_down();
    }

    async fn on_failed(&self, _target: &T) {
        self.latch.count_down();
    }

    async fn on_timeout(&self, _target: &T) {
        self.latch.count_down();
    }
}

/// A terminal notification as seen by process-wide observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorNotice {
    /// Monitor call the object belonged to
    pub monitor_id: Uuid,
    /// Monitor key of the object (task id, virtual machine id)
    pub key: String,
    pub outcome: MonitorOutcome,
    pub at: DateTime<Utc>,
}

/// Broadcasts every terminal notification to whoever subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorNotice>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorNotice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: MonitorNotice) {
        if let Err(broadcast::error::SendError(dead)) = self.sender.send(notice) {
            debug!(
                monitor_id = %dead.monitor_id,
                key = %dead.key,
                outcome = %dead.outcome,
                "Dead monitor event: no subscribers"
            );
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
