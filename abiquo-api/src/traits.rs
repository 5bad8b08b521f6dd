//! Core API abstraction trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::*;

/// Read access to the Abiquo resources that asynchronous operations are
/// observed through.
///
/// Every method is a fresh, idempotent remote read. Implementations must not
/// cache results: the monitors rely on each call reflecting the server.
#[async_trait]
pub trait AbiquoApi: Send + Sync {
    /// Re-fetch a task through its `self` link.
    async fn get_task(&self, task: &AsyncTask) -> Result<AsyncTask>;

    /// Fetch the current state of a virtual machine.
    async fn get_virtual_machine_state(&self, vm: &VirtualMachine) -> Result<VirtualMachineState>;

    /// List the tasks of a resource, given the href of its task collection
    /// owner (for example a virtual machine).
    async fn list_tasks(&self, owner_href: &str) -> Result<Vec<AsyncTask>>;
}
