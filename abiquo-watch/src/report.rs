//! Collects task outcomes and renders them for the terminal.

use async_trait::async_trait;
use tokio::sync::mpsc;

use abiquo_api::AsyncTask;
use abiquo_monitor::{MonitorCallback, MonitorOutcome};

/// Final outcome of one watched task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: AsyncTask,
    pub outcome: MonitorOutcome,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.outcome == MonitorOutcome::Completed
    }

    /// One line per task: id, type, outcome, and the failed jobs if any.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{}\t{:?}\t{}\t{}",
            self.task.task_id, self.task.task_type, self.outcome, self.task.state
        );

        let failed: Vec<String> = self
            .task
            .failed_jobs()
            .map(|job| {
                if job.description.is_empty() {
                    job.id.clone()
                } else {
                    format!("{} ({})", job.id, job.description)
                }
            })
            .collect();
        if !failed.is_empty() {
            line.push_str("\tfailed jobs: ");
            line.push_str(&failed.join(", "));
        }

        line
    }
}

/// Forwards every outcome to a channel read by `main`.
pub struct ReportCallback {
    tx: mpsc::UnboundedSender<TaskReport>,
}

impl ReportCallback {
    pub fn new(tx: mpsc::UnboundedSender<TaskReport>) -> Self {
        Self { tx }
    }

    fn send(&self, task: &AsyncTask, outcome: MonitorOutcome) {
        // The receiver only goes away once main stopped listening.
        let _ = self.tx.send(TaskReport {
            task: task.clone(),
            outcome,
        });
    }
}

#[async_trait]
impl MonitorCallback<AsyncTask> for ReportCallback {
    async fn on_completed(&self, task: &AsyncTask) {
        self.send(task, MonitorOutcome::Completed);
    }

    async fn on_failed(&self, task: &AsyncTask) {
        self.send(task, MonitorOutcome::Failed);
    }

    async fn on_timeout(&self, task: &AsyncTask) {
        self.send(task, MonitorOutcome::Timeout);
    }
}
