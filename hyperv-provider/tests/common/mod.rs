#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hyperv_mgmt::sim::SimulatedHost;
use hyperv_mgmt::{FreshSessions, JobTracker};
use hyperv_provider::resources::{HardDriveInput, MachineInputs, NetworkAdapterInputs};
use hyperv_provider::{LogLevel, ProviderAuditLogger, ReconcileContext, ReconciliationDriver};

pub struct Harness {
    pub host: SimulatedHost,
    pub audit: Arc<ProviderAuditLogger>,
    pub ctx: ReconcileContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::on(SimulatedHost::new())
    }

    pub fn on(host: SimulatedHost) -> Self {
        let audit = Arc::new(ProviderAuditLogger::recording());
        let ctx = ReconcileContext::new(
            "",
            Arc::new(FreshSessions::new(Arc::new(host.clone()))),
            JobTracker::new(Duration::from_millis(1), None),
            audit.clone(),
        );
        Self { host, audit, ctx }
    }

    pub fn driver(&self) -> ReconciliationDriver {
        ReconciliationDriver::from_context(self.ctx.clone())
    }

    pub fn warnings(&self, id: &str) -> Vec<String> {
        self.audit
            .events_for(id)
            .into_iter()
            .filter(|e| e.level == LogLevel::Warn)
            .map(|e| e.message)
            .collect()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.host.stats().calls_to(method)
    }
}

pub fn drive(path: &str) -> HardDriveInput {
    HardDriveInput {
        path: Some(path.to_string()),
        ..Default::default()
    }
}

pub fn machine(name: &str) -> MachineInputs {
    MachineInputs {
        machine_name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn adapter(name: &str, switch: Option<&str>) -> NetworkAdapterInputs {
    NetworkAdapterInputs {
        name: Some(name.to_string()),
        switch_name: switch.map(str::to_string),
        ..Default::default()
    }
}
