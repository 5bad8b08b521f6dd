//! Error types for the monitoring layer.
//!
//! Only call-time precondition violations surface as errors. Once objects are
//! registered, every outcome (including fetch failures and timeouts) flows
//! through the callback contract instead.

use thiserror::Error;

/// Errors raised by the periodic scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The tokio runtime backing the scheduler could not be built.
    #[error("Failed to start scheduler runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The scheduler was closed and accepts no more work.
    #[error("Scheduler is closed")]
    Closed,
}

/// Errors raised when starting a monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// No objects were given.
    #[error("At least one object must be monitored")]
    EmptyTargets,

    /// An argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid monitor configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking wait was requested from inside an async runtime.
    #[error("Blocking wait called from within an async runtime; use the async variant")]
    BlockingInAsyncContext,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
