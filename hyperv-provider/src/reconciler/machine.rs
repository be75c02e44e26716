//! Machine reconciler.
//!
//! A machine is composed of its system settings, memory and processor
//! settings, attached hard drives and network adapters. Creation defines the
//! system with memory and processor in one call, then attaches drives before
//! adapters in declared order. A failing drive or adapter is logged and
//! skipped; the machine is kept.

use std::collections::HashSet;

use async_trait::async_trait;
use hyperv_mgmt::method::{
    AddResourceSettings, DefineSystem, DestroySystem, ModifyResourceSettings, ModifySystemSettings, RemoteMethod,
    RemoveResourceSettings, RequestStateChange, RequestedState,
};
use hyperv_mgmt::{EmbeddedObject, Instance, ObjectPath, Properties, Query, RemoteObjectHandle, ServiceRole, classes};
use tracing::{debug, info};

use super::network_adapter::{self, instance_id};
use super::{Changes, Reconciler, SubResourcePolicy, settle};
use crate::context::{ReconcileContext, RemoteScope};
use crate::error::{ReconcileError, Result};
use crate::resources::machine::{AutoStartAction, AutoStopAction, ControllerType, MachineSettings, adapter_name};
use crate::resources::{HardDriveInput, MachineInputs, MachineOutputs, NetworkAdapterInputs, ResourceKind, identity};

const ENABLED_STATE_RUNNING: u64 = 2;

/// Settings groups the host only changes while the machine is off.
const STOPPED_GROUPS: [&str; 4] = ["memory", "processor", "hardDrives", "networkAdapters"];

pub struct MachineReconciler;

/// A machine's computer system together with its system settings.
pub(crate) struct MachineRef {
    system: Instance,
    settings: Instance,
}

impl MachineRef {
    /// Host-assigned identifier, also the prefix of every child InstanceID.
    pub(crate) fn id(&self) -> &str {
        self.system.get_str("Name").unwrap_or_default()
    }

    pub(crate) fn name(&self) -> &str {
        self.system.get_str("ElementName").unwrap_or_default()
    }

    pub(crate) fn system(&self) -> &RemoteObjectHandle {
        self.system.handle()
    }

    pub(crate) fn system_path(&self) -> &ObjectPath {
        self.system.path()
    }

    pub(crate) fn settings_path(&self) -> &ObjectPath {
        self.settings.path()
    }

    fn is_running(&self) -> bool {
        self.system.get_u64("EnabledState") == Some(ENABLED_STATE_RUNNING)
    }
}

fn machine_query(name: &str) -> Query {
    Query::by_name(classes::COMPUTER_SYSTEM, "ElementName", name).equals("Caption", classes::VIRTUAL_MACHINE_CAPTION)
}

fn child_query(class: &str, vm: &MachineRef) -> Query {
    Query::all(class).contains("InstanceID", vm.id())
}

/// Look up a machine by name.
pub(crate) async fn find_machine(scope: &RemoteScope<'_>, name: &str) -> Result<Option<MachineRef>> {
    let Some(system) = scope.find(&machine_query(name)).await? else {
        return Ok(None);
    };
    let id = system.get_str("Name").unwrap_or_default().to_string();
    let settings = scope
        .find(&Query::by_name(classes::SYSTEM_SETTINGS, "VirtualSystemIdentifier", &id))
        .await?
        .ok_or_else(|| scope.unexpected("ExecQuery", format!("machine '{name}' has no system settings")))?;
    Ok(Some(MachineRef { system, settings }))
}

fn system_settings(name: &str, settings: &MachineSettings) -> EmbeddedObject {
    let subtype = match settings.generation {
        1 => classes::SUBTYPE_GENERATION_1,
        _ => classes::SUBTYPE_GENERATION_2,
    };
    let obj = EmbeddedObject::new(classes::SYSTEM_SETTINGS)
        .with("ElementName", name)
        .with("VirtualSystemSubType", subtype)
        .with("AutomaticStartupAction", settings.auto_start.code())
        .with("AutomaticShutdownAction", settings.auto_stop.code());
    if settings.generation == 1 {
        obj.with("SecureBootEnabled", false)
    } else {
        obj
    }
}

fn memory_settings(settings: &MachineSettings) -> EmbeddedObject {
    let dynamic = settings.dynamic_memory;
    EmbeddedObject::new(classes::MEMORY_SETTINGS)
        .with("VirtualQuantity", settings.memory_mb)
        .with("DynamicMemoryEnabled", dynamic)
        .with_opt("Reservation", dynamic.then_some(settings.minimum_memory_mb))
        .with_opt("Limit", dynamic.then_some(settings.maximum_memory_mb))
}

fn processor_settings(settings: &MachineSettings) -> EmbeddedObject {
    EmbeddedObject::new(classes::PROCESSOR_SETTINGS).with("VirtualQuantity", settings.processor_count)
}

fn drive_settings(drive: &HardDriveInput, path: &str) -> EmbeddedObject {
    EmbeddedObject::new(classes::STORAGE_ALLOCATION)
        .with("ResourceType", classes::RESOURCE_TYPE_LOGICAL_DISK)
        .with("ResourceSubType", classes::SUBTYPE_VIRTUAL_HARD_DISK)
        .with("HostResource", vec![path.to_string()])
        .with("ControllerType", ControllerType::resolve(drive.controller_type.as_deref()).as_str())
        .with("ControllerNumber", drive.controller_number.unwrap_or(0))
        .with("ControllerLocation", drive.controller_location.unwrap_or(0))
}

/// Identity of an attached drive; drives without a path are never attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DriveKey {
    path: String,
    controller: ControllerType,
    number: u32,
    location: u32,
}

impl DriveKey {
    fn of(drive: &HardDriveInput) -> Option<Self> {
        let path = drive.path.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        Some(Self {
            path: path.to_lowercase(),
            controller: ControllerType::resolve(drive.controller_type.as_deref()),
            number: drive.controller_number.unwrap_or(0),
            location: drive.controller_location.unwrap_or(0),
        })
    }
}

fn drive_keys(drives: &[HardDriveInput]) -> Vec<(DriveKey, &HardDriveInput)> {
    drives.iter().filter_map(|d| DriveKey::of(d).map(|k| (k, d))).collect()
}

fn observed_drive(storage: &Instance) -> HardDriveInput {
    HardDriveInput {
        path: storage.get_strings("HostResource").into_iter().next(),
        controller_type: storage.get_str("ControllerType").map(str::to_string),
        controller_number: storage.get_u64("ControllerNumber").and_then(|v| u32::try_from(v).ok()),
        controller_location: storage.get_u64("ControllerLocation").and_then(|v| u32::try_from(v).ok()),
    }
}

fn named_adapters(adapters: &[NetworkAdapterInputs]) -> Vec<(String, &NetworkAdapterInputs)> {
    adapters
        .iter()
        .enumerate()
        .map(|(i, adapter)| (adapter_name(adapter, i), adapter))
        .collect()
}

async fn attach_drive(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    vm: &MachineRef,
    drive: &HardDriveInput,
    path: &str,
) -> Result<()> {
    scope
        .call(
            vsms,
            &AddResourceSettings {
                affected_configuration: vm.settings_path().clone(),
                resource_settings: vec![drive_settings(drive, path)],
            },
        )
        .await?;
    debug!(vm = vm.name(), path, "Attached hard drive");
    Ok(())
}

async fn detach_drive(scope: &RemoteScope<'_>, vsms: &RemoteObjectHandle, vm: &MachineRef, path: &str) -> Result<()> {
    let attached: Vec<ObjectPath> = scope
        .find_all(&child_query(classes::STORAGE_ALLOCATION, vm))
        .await?
        .into_iter()
        .filter(|storage| {
            storage
                .get_strings("HostResource")
                .iter()
                .any(|resource| resource.eq_ignore_ascii_case(path))
        })
        .map(|storage| storage.path().clone())
        .collect();
    if attached.is_empty() {
        debug!(vm = vm.name(), path, "Hard drive already detached");
        return Ok(());
    }
    scope
        .call(
            vsms,
            &RemoveResourceSettings {
                resource_settings: attached,
            },
        )
        .await?;
    debug!(vm = vm.name(), path, "Detached hard drive");
    Ok(())
}

async fn request_state(scope: &RemoteScope<'_>, vm: &MachineRef, requested_state: RequestedState) -> Result<()> {
    scope.call(vm.system(), &RequestStateChange { requested_state }).await?;
    Ok(())
}

/// Rewrite one settings child of the machine in place.
async fn modify_child(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    vm: &MachineRef,
    settings: EmbeddedObject,
) -> Result<()> {
    let current = scope
        .find(&child_query(&settings.class, vm))
        .await?
        .ok_or_else(|| scope.unexpected(ModifyResourceSettings::NAME, format!("machine has no {}", settings.class)))?;
    let settings = settings.with("InstanceID", instance_id(&current));
    scope
        .call(
            vsms,
            &ModifyResourceSettings {
                resource_settings: vec![settings],
            },
        )
        .await?;
    Ok(())
}

/// The machine as the host reports it, in the shape of its descriptor.
async fn observe(scope: &RemoteScope<'_>, vm: &MachineRef, declared: &MachineInputs) -> Result<MachineInputs> {
    let mut observed = MachineSettings::resolve(declared).fill(declared);
    observed.machine_name = Some(vm.name().to_string());

    let settings = &vm.settings;
    if let Some(subtype) = settings.get_str("VirtualSystemSubType") {
        observed.generation = Some(if subtype == classes::SUBTYPE_GENERATION_1 { 1 } else { 2 });
    }
    if let Some(code) = settings.get_u64("AutomaticStartupAction") {
        observed.auto_start_action = Some(AutoStartAction::from_code(code).as_str().to_string());
    }
    if let Some(code) = settings.get_u64("AutomaticShutdownAction") {
        observed.auto_stop_action = Some(AutoStopAction::from_code(code).as_str().to_string());
    }

    if let Some(memory) = scope.find(&child_query(classes::MEMORY_SETTINGS, vm)).await? {
        if let Some(mb) = memory.get_u64("VirtualQuantity") {
            observed.memory_size = Some(mb);
        }
        if let Some(dynamic) = memory.get_bool("DynamicMemoryEnabled") {
            observed.dynamic_memory = Some(dynamic);
            if dynamic {
                observed.minimum_memory = memory.get_u64("Reservation").or(observed.minimum_memory);
                observed.maximum_memory = memory.get_u64("Limit").or(observed.maximum_memory);
            }
        }
    }
    if let Some(processor) = scope.find(&child_query(classes::PROCESSOR_SETTINGS, vm)).await? {
        if let Some(count) = processor.get_u64("VirtualQuantity").and_then(|v| u32::try_from(v).ok()) {
            observed.processor_count = Some(count);
        }
    }

    // Declared order first, then whatever else is attached.
    let mut attached: Vec<HardDriveInput> = scope
        .find_all(&child_query(classes::STORAGE_ALLOCATION, vm))
        .await?
        .iter()
        .map(observed_drive)
        .collect();
    let mut drives = Vec::with_capacity(attached.len());
    for declared_drive in &declared.hard_drives {
        let Some(path) = declared_drive.path.as_deref() else {
            continue;
        };
        let found = attached
            .iter()
            .position(|d| d.path.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(path)));
        if let Some(index) = found {
            drives.push(attached.remove(index));
        }
    }
    drives.extend(attached);
    observed.hard_drives = drives;

    let mut remote = network_adapter::adapters_of(scope, vm).await?;
    let mut adapters = Vec::with_capacity(remote.len());
    for (name, declared_adapter) in named_adapters(&declared.network_adapters) {
        if let Some(index) = remote.iter().position(|a| a.get_str("ElementName") == Some(name.as_str())) {
            let adapter = remote.remove(index);
            adapters.push(network_adapter::observe(scope, &adapter, declared_adapter).await?);
        }
    }
    for adapter in &remote {
        adapters.push(network_adapter::observe(scope, adapter, &NetworkAdapterInputs::default()).await?);
    }
    observed.network_adapters = adapters;

    Ok(observed)
}

fn declared_view(id: &str, inputs: &MachineInputs, vm_id: Option<String>) -> MachineOutputs {
    let mut filled = MachineSettings::resolve(inputs).fill(inputs);
    filled.machine_name = Some(id.to_string());
    MachineOutputs::new(filled, vm_id)
}

/// Reject invalid inline adapters before any remote call, previews included.
fn check_adapters(id: &str, inputs: &MachineInputs) -> Result<()> {
    for (name, adapter) in named_adapters(&inputs.network_adapters) {
        network_adapter::check(adapter).map_err(|reason| ReconcileError::InvalidInput {
            kind: ResourceKind::Machine,
            id: id.to_string(),
            reason: format!("network adapter '{name}': {reason}"),
        })?;
    }
    Ok(())
}

/// Settings groups of a machine that differ between two descriptors.
fn diff(old: &MachineInputs, new: &MachineInputs) -> Changes {
    let before = MachineSettings::resolve(old);
    let after = MachineSettings::resolve(new);

    let mut changes = Changes::default();
    changes.mark(
        "system",
        before.auto_start != after.auto_start || before.auto_stop != after.auto_stop,
    );
    let memory = |s: &MachineSettings| {
        (
            s.memory_mb,
            s.dynamic_memory,
            s.dynamic_memory.then_some((s.minimum_memory_mb, s.maximum_memory_mb)),
        )
    };
    changes.mark("memory", memory(&before) != memory(&after));
    changes.mark("processor", before.processor_count != after.processor_count);

    let old_drives: HashSet<DriveKey> = drive_keys(&old.hard_drives).into_iter().map(|(k, _)| k).collect();
    let new_drives: HashSet<DriveKey> = drive_keys(&new.hard_drives).into_iter().map(|(k, _)| k).collect();
    changes.mark("hardDrives", old_drives != new_drives);

    let old_adapters = named_adapters(&old.network_adapters);
    let new_adapters = named_adapters(&new.network_adapters);
    let adapters_changed = old_adapters.len() != new_adapters.len()
        || new_adapters.iter().any(|(name, adapter)| {
            match old_adapters.iter().find(|(old_name, _)| old_name == name) {
                Some((_, old_adapter)) => !network_adapter::diff(old_adapter, adapter).is_empty(),
                None => true,
            }
        });
    changes.mark("networkAdapters", adapters_changed);
    changes
}

impl MachineReconciler {
    async fn create_in(&self, scope: &RemoteScope<'_>, inputs: &MachineInputs) -> Result<MachineOutputs> {
        let id = scope.id();
        if let Some(vm) = find_machine(scope, id).await? {
            scope.audit().resource_already_present(Self::KIND, id);
            let observed = observe(scope, &vm, inputs).await?;
            return Ok(MachineOutputs::new(observed, Some(vm.id().to_string())));
        }

        let settings = MachineSettings::resolve(inputs);
        let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;
        scope
            .call(
                &vsms,
                &DefineSystem {
                    system_settings: system_settings(id, &settings),
                    resource_settings: vec![memory_settings(&settings), processor_settings(&settings)],
                    reference_configuration: None,
                },
            )
            .await?;
        let vm = find_machine(scope, id)
            .await?
            .ok_or_else(|| scope.unexpected(DefineSystem::NAME, "machine not found after creation"))?;
        info!(vm = id, vm_id = vm.id(), "Defined machine");

        for (i, drive) in inputs.hard_drives.iter().enumerate() {
            let Some(path) = drive.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
                debug!(vm = id, index = i, "Hard drive without a path, skipping");
                continue;
            };
            let result = attach_drive(scope, &vsms, &vm, drive, path).await;
            settle(scope, SubResourcePolicy::Skip, &format!("hard drive {path}"), result)?;
        }

        for (name, adapter) in named_adapters(&inputs.network_adapters) {
            let result = network_adapter::attach(scope, &vm, &name, adapter, SubResourcePolicy::Skip).await;
            settle(scope, SubResourcePolicy::Skip, &format!("network adapter '{name}'"), result)?;
        }

        scope.audit().resource_created(Self::KIND, id);
        Ok(declared_view(id, inputs, Some(vm.id().to_string())))
    }

    async fn read_in(&self, scope: &RemoteScope<'_>, inputs: &MachineInputs) -> Result<MachineOutputs> {
        let id = scope.id();
        match find_machine(scope, id).await? {
            Some(vm) => {
                let observed = observe(scope, &vm, inputs).await?;
                Ok(MachineOutputs::new(observed, Some(vm.id().to_string())))
            }
            None => Ok(declared_view(id, inputs, None)),
        }
    }

    async fn update_in(
        &self,
        scope: &RemoteScope<'_>,
        olds: &MachineOutputs,
        news: &MachineInputs,
        changes: &Changes,
    ) -> Result<MachineOutputs> {
        let id = scope.id();
        let vm = find_machine(scope, id).await?.ok_or_else(|| scope.missing())?;
        let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;
        let settings = MachineSettings::resolve(news);

        let stopped = vm.is_running() && STOPPED_GROUPS.iter().any(|group| changes.has(group));
        if stopped {
            info!(vm = id, "Stopping machine before update");
            request_state(scope, &vm, RequestedState::Disabled).await?;
        }

        if changes.has("system") {
            let system = EmbeddedObject::new(classes::SYSTEM_SETTINGS)
                .with("InstanceID", instance_id(&vm.settings))
                .with("AutomaticStartupAction", settings.auto_start.code())
                .with("AutomaticShutdownAction", settings.auto_stop.code());
            scope
                .call(
                    &vsms,
                    &ModifySystemSettings {
                        system_settings: system,
                    },
                )
                .await?;
        }
        if changes.has("memory") {
            modify_child(scope, &vsms, &vm, memory_settings(&settings)).await?;
        }
        if changes.has("processor") {
            modify_child(scope, &vsms, &vm, processor_settings(&settings)).await?;
        }

        if changes.has("hardDrives") {
            let old_drives = drive_keys(&olds.inputs.hard_drives);
            let new_drives = drive_keys(&news.hard_drives);
            for (key, drive) in &old_drives {
                if !new_drives.iter().any(|(k, _)| k == key) {
                    let path = drive.path.as_deref().unwrap_or_default();
                    detach_drive(scope, &vsms, &vm, path).await?;
                }
            }
            for (key, drive) in &new_drives {
                if !old_drives.iter().any(|(k, _)| k == key) {
                    let path = drive.path.as_deref().unwrap_or_default().trim();
                    attach_drive(scope, &vsms, &vm, drive, path).await?;
                }
            }
        }

        if changes.has("networkAdapters") {
            let old_adapters = named_adapters(&olds.inputs.network_adapters);
            let new_adapters = named_adapters(&news.network_adapters);
            for (name, _) in &old_adapters {
                if !new_adapters.iter().any(|(n, _)| n == name) {
                    network_adapter::detach(scope, &vm, name).await?;
                }
            }
            for (name, adapter) in &new_adapters {
                match old_adapters.iter().find(|(n, _)| n == name) {
                    Some((_, old_adapter)) => {
                        match network_adapter::find_adapter(scope, &vm, name).await? {
                            Some(existing) => {
                                network_adapter::reconfigure(scope, &vm, &existing, name, old_adapter, adapter).await?;
                            }
                            None => {
                                network_adapter::attach(scope, &vm, name, adapter, SubResourcePolicy::Abort).await?;
                            }
                        }
                    }
                    None => {
                        network_adapter::attach(scope, &vm, name, adapter, SubResourcePolicy::Abort).await?;
                    }
                }
            }
        }

        if stopped {
            match request_state(scope, &vm, RequestedState::Enabled).await {
                Ok(()) => info!(vm = id, "Restarted machine after update"),
                Err(e) => scope.audit().restart_failed(Self::KIND, id, &e),
            }
        }

        scope.audit().resource_updated(Self::KIND, id, changes.groups());
        Ok(declared_view(id, news, Some(vm.id().to_string())))
    }

    /// Start the machine if needed, stop it, then destroy it. Every step is fatal.
    async fn delete_in(&self, scope: &RemoteScope<'_>) -> Result<()> {
        let id = scope.id();
        let Some(vm) = find_machine(scope, id).await? else {
            scope.audit().resource_already_absent(Self::KIND, id);
            return Ok(());
        };

        if !vm.is_running() {
            request_state(scope, &vm, RequestedState::Enabled).await?;
        }
        request_state(scope, &vm, RequestedState::Disabled).await?;

        let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;
        scope
            .call(
                &vsms,
                &DestroySystem {
                    affected_system: vm.system_path().clone(),
                },
            )
            .await?;

        scope.audit().resource_deleted(Self::KIND, id);
        Ok(())
    }
}

#[async_trait]
impl Reconciler for MachineReconciler {
    const KIND: ResourceKind = ResourceKind::Machine;
    type Inputs = MachineInputs;
    type Outputs = MachineOutputs;

    fn identity(&self, inputs: &Self::Inputs, fallback: &str) -> String {
        identity(inputs.machine_name.as_deref(), fallback)
    }

    async fn create(
        &self,
        ctx: &ReconcileContext,
        name: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)> {
        let id = self.identity(inputs, name);
        check_adapters(&id, inputs)?;
        if dry_run {
            return Ok((id.clone(), declared_view(&id, inputs, None)));
        }
        info!("Reconciling machine {}", id);

        let session = ctx.open(Self::KIND, &id).await?;
        let result = self.create_in(&ctx.scope(&session, Self::KIND, &id), inputs).await;
        ctx.close(session).await;
        Ok((id, result?))
    }

    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)> {
        if dry_run {
            return Ok((id.to_string(), declared_view(id, inputs, None)));
        }

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.read_in(&ctx.scope(&session, Self::KIND, id), inputs).await;
        ctx.close(session).await;
        Ok((id.to_string(), result?))
    }

    async fn update(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        olds: &Self::Outputs,
        news: &Self::Inputs,
        dry_run: bool,
    ) -> Result<Self::Outputs> {
        let immutable = |field| ReconcileError::Immutable {
            kind: Self::KIND,
            id: id.to_string(),
            field,
        };
        if MachineSettings::resolve(&olds.inputs).generation != MachineSettings::resolve(news).generation {
            return Err(immutable("generation"));
        }
        if news.machine_name.as_deref().is_some_and(|name| name != id) {
            return Err(immutable("machineName"));
        }

        check_adapters(id, news)?;

        let changes = diff(&olds.inputs, news);
        if dry_run || changes.is_empty() {
            return Ok(declared_view(id, news, olds.vm_id.clone()));
        }
        info!("Reconciling machine {} ({})", id, changes.groups().join(", "));

        let session = ctx.open(Self::KIND, id).await?;
        let result = self
            .update_in(&ctx.scope(&session, Self::KIND, id), olds, news, &changes)
            .await;
        ctx.close(session).await;
        result
    }

    async fn delete(&self, ctx: &ReconcileContext, id: &str, _outputs: &Self::Outputs, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        info!("Finalizing (deleting) machine {}", id);

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.delete_in(&ctx.scope(&session, Self::KIND, id)).await;
        ctx.close(session).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_one_disables_secure_boot() {
        let inputs = MachineInputs {
            generation: Some(1),
            ..Default::default()
        };
        let obj = system_settings("legacy", &MachineSettings::resolve(&inputs));
        assert_eq!(obj.get_str("VirtualSystemSubType"), Some(classes::SUBTYPE_GENERATION_1));
        assert_eq!(obj.get_bool("SecureBootEnabled"), Some(false));

        let obj = system_settings("modern", &MachineSettings::resolve(&MachineInputs::default()));
        assert!(obj.get_bool("SecureBootEnabled").is_none());
    }

    #[test]
    fn test_static_memory_has_no_bounds() {
        let obj = memory_settings(&MachineSettings::resolve(&MachineInputs::default()));
        assert_eq!(obj.get_u64("VirtualQuantity"), Some(1024));
        assert!(obj.get_u64("Reservation").is_none());
        assert!(obj.get_u64("Limit").is_none());
    }

    #[test]
    fn test_diff_ignores_equivalent_descriptors() {
        let old = MachineInputs {
            hard_drives: vec![HardDriveInput {
                path: Some("C:\\vms\\a.vhdx".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let new = MachineInputs {
            memory_size: Some(1024),
            hard_drives: vec![HardDriveInput {
                path: Some("c:\\VMS\\a.vhdx".into()),
                controller_type: Some("scsi".into()),
                controller_number: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_diff_groups() {
        let old = MachineInputs::default();
        let new = MachineInputs {
            memory_size: Some(2048),
            auto_start_action: Some("Start".into()),
            network_adapters: vec![NetworkAdapterInputs::default()],
            ..Default::default()
        };
        assert_eq!(diff(&old, &new).groups(), &["system", "memory", "networkAdapters"]);
    }
}
