//! Mock API backend for testing and development.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::traits::AbiquoApi;
use crate::types::*;

/// Mock API backend for testing.
///
/// Each task or virtual machine gets a script of states. Every read pops the
/// next state; once the script runs out the last state is repeated, so a task
/// that reached a terminal state keeps reporting it. Reads can also be told
/// to fail a number of times before the script resumes.
pub struct MockApi {
    tasks: RwLock<HashMap<String, ScriptedTask>>,
    vms: RwLock<HashMap<u32, Script<VirtualMachineState>>>,
}

struct ScriptedTask {
    task: AsyncTask,
    script: Script<TaskState>,
}

struct Script<S> {
    upcoming: VecDeque<S>,
    current: S,
    pending_failures: u32,
    reads: u32,
}

impl<S: Copy> Script<S> {
    fn new(initial: S, states: impl IntoIterator<Item = S>) -> Self {
        Self {
            upcoming: states.into_iter().collect(),
            current: initial,
            pending_failures: 0,
            reads: 0,
        }
    }

    fn next(&mut self, what: &str) -> Result<S> {
        self.reads += 1;
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(ApiError::Unavailable(format!("scripted failure reading {}", what)));
        }
        if let Some(state) = self.upcoming.pop_front() {
            self.current = state;
        }
        Ok(self.current)
    }
}

impl MockApi {
    /// Create a new mock backend.
    pub fn new() -> Self {
        info!("Creating mock Abiquo API backend");
        Self {
            tasks: RwLock::new(HashMap::new()),
            vms: RwLock::new(HashMap::new()),
        }
    }

    /// Register a task and the states successive reads will return.
    pub fn script_task(&self, task: &AsyncTask, states: impl IntoIterator<Item = TaskState>) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;
        tasks.insert(
            task.task_id.clone(),
            ScriptedTask {
                task: task.clone(),
                script: Script::new(task.state, states),
            },
        );
        Ok(())
    }

    /// Make the next `count` reads of a task fail with a transient error.
    pub fn fail_task_reads(&self, task_id: &str, count: u32) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;
        let scripted = tasks
            .get_mut(task_id)
            .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;
        scripted.script.pending_failures += count;
        Ok(())
    }

    /// Number of reads served for a task, failed ones included.
    pub fn task_reads(&self, task_id: &str) -> u32 {
        self.tasks
            .read()
            .ok()
            .and_then(|tasks| tasks.get(task_id).map(|t| t.script.reads))
            .unwrap_or(0)
    }

    /// Register a virtual machine and the states successive reads will return.
    pub fn script_virtual_machine(
        &self,
        vm: &VirtualMachine,
        states: impl IntoIterator<Item = VirtualMachineState>,
    ) -> Result<()> {
        let mut vms = self.vms.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;
        vms.insert(vm.id, Script::new(vm.state, states));
        Ok(())
    }

    /// Make the next `count` reads of a virtual machine fail with a transient error.
    pub fn fail_virtual_machine_reads(&self, vm_id: u32, count: u32) -> Result<()> {
        let mut vms = self.vms.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;
        let script = vms
            .get_mut(&vm_id)
            .ok_or_else(|| ApiError::NotFound(format!("virtual machine {}", vm_id)))?;
        script.pending_failures += count;
        Ok(())
    }

    /// Number of state reads served for a virtual machine.
    pub fn virtual_machine_reads(&self, vm_id: u32) -> u32 {
        self.vms
            .read()
            .ok()
            .and_then(|vms| vms.get(&vm_id).map(|s| s.reads))
            .unwrap_or(0)
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AbiquoApi for MockApi {
    async fn get_task(&self, task: &AsyncTask) -> Result<AsyncTask> {
        let mut tasks = self.tasks.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;

        let scripted = tasks
            .get_mut(&task.task_id)
            .ok_or_else(|| ApiError::NotFound(format!("task {}", task.task_id)))?;

        let state = scripted.script.next(&task.task_id)?;
        scripted.task.state = state;
        debug!(task_id = %task.task_id, state = %state, "Mock task read");

        Ok(scripted.task.clone())
    }

    async fn get_virtual_machine_state(&self, vm: &VirtualMachine) -> Result<VirtualMachineState> {
        let mut vms = self.vms.write().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;

        let script = vms
            .get_mut(&vm.id)
            .ok_or_else(|| ApiError::NotFound(format!("virtual machine {}", vm.id)))?;

        let state = script.next(&vm.name)?;
        debug!(vm_id = vm.id, state = %state, "Mock virtual machine read");
        Ok(state)
    }

    async fn list_tasks(&self, owner_href: &str) -> Result<Vec<AsyncTask>> {
        let tasks = self.tasks.read().map_err(|_| ApiError::Internal("Lock poisoned".to_string()))?;

        let mut owned: Vec<AsyncTask> = tasks
            .values()
            .filter(|t| {
                t.task
                    .link(REL_PARENT)
                    .map(|l| l.href.trim_end_matches("/tasks") == owner_href.trim_end_matches('/'))
                    .unwrap_or(false)
            })
            .map(|t| t.task.clone())
            .collect();
        owned.sort_by_key(|t| t.timestamp);

        Ok(owned)
    }
}
