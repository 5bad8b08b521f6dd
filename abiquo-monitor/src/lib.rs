//! # Abiquo Monitor
//!
//! Polls Abiquo asynchronous operations until they finish and reports each
//! outcome exactly once: completed, failed, or timed out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────────┐
//! │ AsyncTaskMonitor │   │ VirtualMachineMonitor │
//! └────────┬─────────┘   └───────────┬───────────┘
//!          └───────────┬─────────────┘
//!                      ▼
//!          ┌───────────────────────┐      ┌──────────────┐
//!          │   MonitoringService   │─────►│  Scheduler   │
//!          │ (tracker + callbacks) │      │ (tokio pool) │
//!          └───────────┬───────────┘      └──────────────┘
//!                      ▼
//!                AbiquoApi (REST)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use abiquo_monitor::{AsyncTaskMonitor, MonitorConfig, MonitoringService};
//!
//! let service = Arc::new(MonitoringService::start(&MonitorConfig::default())?);
//! let monitor = AsyncTaskMonitor::new(service.clone(), api);
//!
//! monitor.await_completion_within(Duration::from_secs(600), &[task]).await?;
//! service.close();
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod latch;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod task;
pub mod virtual_machine;

pub use config::MonitorConfig;
pub use error::{MonitorError, SchedulerError};
pub use events::{EventBus, MonitorCallback, MonitorNotice, MonitorOutcome};
pub use latch::CountDownLatch;
pub use scheduler::{ScheduleHandle, Scheduler};
pub use service::{MonitorHandle, MonitoringService};
pub use status::{MonitorStatus, Monitorable, StatusFunction};
pub use task::{AsyncTaskMonitor, TaskStatusFunction};
pub use virtual_machine::{VirtualMachineMonitor, VirtualMachineStateFunction};
