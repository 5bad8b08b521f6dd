//! # Abiquo API
//!
//! Typed model and REST access for the parts of the Abiquo cloud-management
//! API that asynchronous operations are observed through.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            AbiquoApi Trait              │
//! │ (get_task, get_virtual_machine_state)   │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │   AbiquoClient    │     │      MockApi      │
//! │   (REST, HTTP)    │     │ (scripted states) │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use abiquo_api::{AbiquoApi, AbiquoClient, ClientConfig};
//!
//! let client = AbiquoClient::new(ClientConfig::new("https://abiquo.example.com/api", "admin", "xabiquo"))?;
//! let task = client.get_task_by_href("admin/enterprises/1/tasks/4d2a").await?;
//! println!("{} is {}", task.task_id, task.state);
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use client::{AbiquoClient, ClientConfig};
pub use error::ApiError;
pub use mock::MockApi;
pub use traits::AbiquoApi;
pub use types::*;
