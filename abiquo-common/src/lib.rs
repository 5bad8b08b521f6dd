//! # Abiquo Common
//!
//! Shared utilities for the Abiquo client crates.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use abiquo_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(task_id = "42", "Waiting for task");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, LogFormat};
