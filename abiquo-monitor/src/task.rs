//! Monitor for Abiquo asynchronous tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use abiquo_api::{AbiquoApi, AsyncTask, TaskState};

use crate::error::Result;
use crate::events::MonitorCallback;
use crate::service::{MonitorHandle, MonitoringService};
use crate::status::{MonitorStatus, StatusFunction};

/// Finished when the task reaches a terminal [`TaskState`].
pub struct TaskStatusFunction {
    api: Arc<dyn AbiquoApi>,
}

impl TaskStatusFunction {
    pub fn new(api: Arc<dyn AbiquoApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StatusFunction<AsyncTask> for TaskStatusFunction {
    async fn check(&self, task: &AsyncTask) -> abiquo_api::error::Result<(AsyncTask, MonitorStatus)> {
        let refreshed = self.api.get_task(task).await?;
        let status = match refreshed.state {
            TaskState::FinishedSuccessfully => MonitorStatus::Done,
            TaskState::FinishedUnsuccessfully => MonitorStatus::Failed,
            TaskState::Pending | TaskState::Started => MonitorStatus::Continue,
        };
        Ok((refreshed, status))
    }
}

/// Waits for asynchronous tasks to finish.
///
/// ```rust,ignore
/// let monitor = AsyncTaskMonitor::new(service, api);
/// monitor.await_completion_within(Duration::from_secs(300), &[task]).await?;
/// ```
pub struct AsyncTaskMonitor {
    service: Arc<MonitoringService>,
    function: Arc<TaskStatusFunction>,
}

impl AsyncTaskMonitor {
    pub fn new(service: Arc<MonitoringService>, api: Arc<dyn AbiquoApi>) -> Self {
        Self {
            service,
            function: Arc::new(TaskStatusFunction::new(api)),
        }
    }

    /// Wait until every task is finished.
    pub async fn await_completion(&self, tasks: &[AsyncTask]) -> Result<()> {
        self.service
            .await_completion(tasks.to_vec(), self.function.clone(), None)
            .await
    }

    /// Wait until every task is finished or `max_wait` elapses.
    pub async fn await_completion_within(&self, max_wait: Duration, tasks: &[AsyncTask]) -> Result<()> {
        self.service
            .await_completion(tasks.to_vec(), self.function.clone(), Some(max_wait))
            .await
    }

    /// Block the current thread until every task is finished.
    pub fn await_completion_blocking(&self, tasks: &[AsyncTask]) -> Result<()> {
        self.service
            .await_completion_blocking(tasks.to_vec(), self.function.clone(), None)
    }

    /// Block the current thread until every task is finished or `max_wait`
    /// elapses.
    pub fn await_completion_within_blocking(&self, max_wait: Duration, tasks: &[AsyncTask]) -> Result<()> {
        self.service
            .await_completion_blocking(tasks.to_vec(), self.function.clone(), Some(max_wait))
    }

    /// Poll the tasks in the background and report each outcome to `callback`.
    pub fn monitor(
        &self,
        callback: Arc<dyn MonitorCallback<AsyncTask>>,
        tasks: &[AsyncTask],
    ) -> Result<MonitorHandle<AsyncTask>> {
        self.service
            .monitor(tasks.to_vec(), self.function.clone(), callback, None)
    }

    /// Like [`AsyncTaskMonitor::monitor`], timing out unresolved tasks after
    /// `max_wait`.
    pub fn monitor_within(
        &self,
        max_wait: Duration,
        callback: Arc<dyn MonitorCallback<AsyncTask>>,
        tasks: &[AsyncTask],
    ) -> Result<MonitorHandle<AsyncTask>> {
        self.service
            .monitor(tasks.to_vec(), self.function.clone(), callback, Some(max_wait))
    }
}
