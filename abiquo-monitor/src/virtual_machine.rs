//! Monitor for virtual machine deployment and undeployment.
//!
//! Deploying is finished once the machine is `ON`; undeploying once it is
//! `NOT_ALLOCATED` again. `UNKNOWN` means the hypervisor lost track of the
//! machine and is reported as a failure in both directions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use abiquo_api::{AbiquoApi, VirtualMachine, VirtualMachineState};

use crate::error::Result;
use crate::events::MonitorCallback;
use crate::service::{MonitorHandle, MonitoringService};
use crate::status::{MonitorStatus, StatusFunction};

/// Finished when the virtual machine reaches a target state.
pub struct VirtualMachineStateFunction {
    api: Arc<dyn AbiquoApi>,
    target: VirtualMachineState,
}

impl VirtualMachineStateFunction {
    /// Finished when the machine is `ON`.
    pub fn deploy(api: Arc<dyn AbiquoApi>) -> Self {
        Self {
            api,
            target: VirtualMachineState::On,
        }
    }

    /// Finished when the machine is `NOT_ALLOCATED`.
    pub fn undeploy(api: Arc<dyn AbiquoApi>) -> Self {
        Self {
            api,
            target: VirtualMachineState::NotAllocated,
        }
    }

    fn verdict(&self, state: VirtualMachineState) -> MonitorStatus {
        if state == self.target {
            MonitorStatus::Done
        } else if state == VirtualMachineState::Unknown {
            MonitorStatus::Failed
        } else {
            MonitorStatus::Continue
        }
    }
}

#[async_trait]
impl StatusFunction<VirtualMachine> for VirtualMachineStateFunction {
    async fn check(
        &self,
        vm: &VirtualMachine,
    ) -> abiquo_api::error::Result<(VirtualMachine, MonitorStatus)> {
        let state = self.api.get_virtual_machine_state(vm).await?;
        let mut refreshed = vm.clone();
        refreshed.state = state;
        Ok((refreshed, self.verdict(state)))
    }
}

/// Waits for virtual machines to be deployed or undeployed.
pub struct VirtualMachineMonitor {
    service: Arc<MonitoringService>,
    deploy: Arc<VirtualMachineStateFunction>,
    undeploy: Arc<VirtualMachineStateFunction>,
}

impl VirtualMachineMonitor {
    pub fn new(service: Arc<MonitoringService>, api: Arc<dyn AbiquoApi>) -> Self {
        Self {
            service,
            deploy: Arc::new(VirtualMachineStateFunction::deploy(Arc::clone(&api))),
            undeploy: Arc::new(VirtualMachineStateFunction::undeploy(api)),
        }
    }

    /// Wait until every machine is `ON` (or failed).
    pub async fn await_deploy(&self, vms: &[VirtualMachine]) -> Result<()> {
        self.service
            .await_completion(vms.to_vec(), self.deploy.clone(), None)
            .await
    }

    pub async fn await_deploy_within(&self, max_wait: Duration, vms: &[VirtualMachine]) -> Result<()> {
        self.service
            .await_completion(vms.to_vec(), self.deploy.clone(), Some(max_wait))
            .await
    }

    pub fn monitor_deploy(
        &self,
        callback: Arc<dyn MonitorCallback<VirtualMachine>>,
        vms: &[VirtualMachine],
    ) -> Result<MonitorHandle<VirtualMachine>> {
        self.service
            .monitor(vms.to_vec(), self.deploy.clone(), callback, None)
    }

    pub fn monitor_deploy_within(
        &self,
        max_wait: Duration,
        callback: Arc<dyn MonitorCallback<VirtualMachine>>,
        vms: &[VirtualMachine],
    ) -> Result<MonitorHandle<VirtualMachine>> {
        self.service
            .monitor(vms.to_vec(), self.deploy.clone(), callback, Some(max_wait))
    }

    /// Wait until every machine is `NOT_ALLOCATED` (or failed).
    pub async fn await_undeploy(&self, vms: &[VirtualMachine]) -> Result<()> {
        self.service
            .await_completion(vms.to_vec(), self.undeploy.clone(), None)
            .await
    }

    pub async fn await_undeploy_within(&self, max_wait: Duration, vms: &[VirtualMachine]) -> Result<()> {
        self.service
            .await_completion(vms.to_vec(), self.undeploy.clone(), Some(max_wait))
            .await
    }

    pub fn monitor_undeploy(
        &self,
        callback: Arc<dyn MonitorCallback<VirtualMachine>>,
        vms: &[VirtualMachine],
    ) -> Result<MonitorHandle<VirtualMachine>> {
        self.service
            .monitor(vms.to_vec(), self.undeploy.clone(), callback, None)
    }

    pub fn monitor_undeploy_within(
        &self,
        max_wait: Duration,
        callback: Arc<dyn MonitorCallback<VirtualMachine>>,
        vms: &[VirtualMachine],
    ) -> Result<MonitorHandle<VirtualMachine>> {
        self.service
            .monitor(vms.to_vec(), self.undeploy.clone(), callback, Some(max_wait))
    }
}
