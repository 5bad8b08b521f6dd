//! Status functions: the per-poll verdict on a monitored object.

use std::fmt;

use async_trait::async_trait;

use abiquo_api::{AsyncTask, VirtualMachine};

/// Verdict of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    /// The operation finished successfully
    Done,
    /// The operation finished with an error
    Failed,
    /// Not finished yet, poll again on the next tick
    Continue,
}

impl MonitorStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MonitorStatus::Continue)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Done => write!(f, "done"),
            MonitorStatus::Failed => write!(f, "failed"),
            MonitorStatus::Continue => write!(f, "continue"),
        }
    }
}

/// An object the monitors can track.
pub trait Monitorable: Clone + Send + Sync + 'static {
    /// Key identifying the object within one monitor call. Objects sharing a
    /// key are tracked (and notified) once.
    fn monitor_key(&self) -> String;
}

impl Monitorable for AsyncTask {
    fn monitor_key(&self) -> String {
        self.task_id.clone()
    }
}

impl Monitorable for VirtualMachine {
    fn monitor_key(&self) -> String {
        self.id.to_string()
    }
}

/// Decides, from a fresh remote read, whether a monitored object is done.
#[async_trait]
pub trait StatusFunction<T>: Send + Sync {
    /// Re-read `target` and return its refreshed form along with the verdict.
    ///
    /// Errors are treated by the monitor as "not finished yet" for this tick.
    async fn check(&self, target: &T) -> abiquo_api::error::Result<(T, MonitorStatus)>;
}
