//! Network adapter reconciler.
//!
//! An adapter is a synthetic ethernet port of an existing machine, connected
//! through a port allocation that carries the VLAN, security and offload
//! features. The attach, reconfigure and detach steps here are shared with the
//! machine reconciler, which manages the adapters declared inline.

use async_trait::async_trait;
use hyperv_mgmt::method::{
    AddFeatureSettings, AddResourceSettings, ModifyFeatureSettings, ModifyResourceSettings, RemoteMethod,
    RemoveFeatureSettings, RemoveResourceSettings, SetGuestNetworkAdapterConfiguration,
};
use hyperv_mgmt::{EmbeddedObject, Instance, ObjectPath, Properties, Query, RemoteObjectHandle, ServiceRole, classes};
use tracing::{debug, info};

use super::machine::{MachineRef, find_machine};
use super::{Changes, Reconciler, SubResourcePolicy, settle};
use crate::context::{ReconcileContext, RemoteScope};
use crate::error::{ReconcileError, Result};
use crate::resources::network_adapter::{PortMirroring, normalize_mac};
use crate::resources::{NetworkAdapterInputs, NetworkAdapterOutputs, ResourceKind, identity};

/// VLAN operation mode "access".
const VLAN_MODE_ACCESS: u16 = 1;

pub struct NetworkAdapterReconciler;

fn adapter_query(vm: &MachineRef, name: &str) -> Query {
    Query::by_name(classes::SYNTHETIC_ETHERNET_PORT, "ElementName", name).contains("InstanceID", vm.id())
}

fn port_query(adapter: &ObjectPath) -> Query {
    Query::all(classes::ETHERNET_PORT_ALLOCATION).equals("Parent", adapter.as_str())
}

fn feature_query(class: &str, port: &Instance) -> Query {
    Query::all(class).contains("InstanceID", &format!("{}\\", instance_id(port)))
}

fn guest_query(adapter: &Instance) -> Query {
    Query::by_name(classes::GUEST_NETWORK_CONFIGURATION, "InstanceID", &guest_configuration_id(adapter))
}

pub(crate) fn instance_id(instance: &Instance) -> &str {
    instance.get_str("InstanceID").unwrap_or_default()
}

fn guest_configuration_id(adapter: &Instance) -> String {
    let id = instance_id(adapter);
    format!("Microsoft:GuestNetwork\\{}", id.strip_prefix("Microsoft:").unwrap_or(id))
}

/// Reject values the host cannot represent. Returns the reason.
pub(crate) fn check(inputs: &NetworkAdapterInputs) -> std::result::Result<(), String> {
    if let Some(mac) = inputs.mac_address.as_deref() {
        if normalize_mac(mac).is_none() {
            return Err(format!("invalid MAC address '{mac}'"));
        }
    }
    if let Some(mode) = inputs.port_mirroring.as_deref() {
        if PortMirroring::parse(mode).is_none() {
            return Err(format!("invalid port mirroring mode '{mode}'"));
        }
    }
    if let Some(vlan) = inputs.vlan_id {
        if !(1..=4094).contains(&vlan) {
            return Err(format!("VLAN id {vlan} is outside 1-4094"));
        }
    }
    Ok(())
}

fn adapter_settings(name: &str, mac: Option<&str>) -> EmbeddedObject {
    let mac = mac.and_then(normalize_mac);
    EmbeddedObject::new(classes::SYNTHETIC_ETHERNET_PORT)
        .with("ElementName", name)
        .with("ResourceSubType", classes::SUBTYPE_SYNTHETIC_ETHERNET)
        .with("StaticMacAddress", mac.is_some())
        .with_opt("Address", mac)
}

/// Port allocation without a switch is a disconnected port.
fn port_settings(adapter: &ObjectPath, switch: Option<&ObjectPath>) -> EmbeddedObject {
    EmbeddedObject::new(classes::ETHERNET_PORT_ALLOCATION)
        .with("Parent", adapter.clone())
        .with("HostResource", host_resource(switch))
}

fn host_resource(switch: Option<&ObjectPath>) -> Vec<String> {
    switch.map(|s| vec![s.as_str().to_string()]).unwrap_or_default()
}

fn vlan_settings(vlan: u16) -> EmbeddedObject {
    EmbeddedObject::new(classes::PORT_VLAN_SETTINGS)
        .with("AccessVlanId", vlan)
        .with("OperationMode", VLAN_MODE_ACCESS)
}

fn security_settings(inputs: &NetworkAdapterInputs) -> EmbeddedObject {
    let mirroring = inputs.port_mirroring.as_deref().and_then(PortMirroring::parse);
    EmbeddedObject::new(classes::PORT_SECURITY_SETTINGS)
        .with_opt("EnableDhcpGuard", inputs.dhcp_guard)
        .with_opt("EnableRouterGuard", inputs.router_guard)
        .with_opt("MonitorMode", mirroring.map(|m| m.code()))
        .with_opt("AllowIeeePriorityTag", inputs.ieee_priority_tag)
}

fn offload_settings(weight: u32) -> EmbeddedObject {
    EmbeddedObject::new(classes::PORT_OFFLOAD_SETTINGS).with("VMQOffloadWeight", weight)
}

fn security_key(inputs: &NetworkAdapterInputs) -> (Option<bool>, Option<bool>, Option<PortMirroring>, Option<bool>) {
    (
        inputs.dhcp_guard,
        inputs.router_guard,
        inputs.port_mirroring.as_deref().and_then(PortMirroring::parse),
        inputs.ieee_priority_tag,
    )
}

/// Settings groups that differ between two descriptors of the same adapter.
pub(crate) fn diff(old: &NetworkAdapterInputs, new: &NetworkAdapterInputs) -> Changes {
    let mut changes = Changes::default();
    changes.mark(
        "mac",
        old.mac_address.as_deref().and_then(normalize_mac) != new.mac_address.as_deref().and_then(normalize_mac),
    );
    changes.mark("switch", old.switch_name != new.switch_name);
    changes.mark("vlan", old.vlan_id != new.vlan_id);
    changes.mark("security", security_key(old) != security_key(new));
    changes.mark("offload", old.vmq_weight != new.vmq_weight);
    changes.mark("ip", old.ip_address_list() != new.ip_address_list());
    changes
}

async fn find_switch(scope: &RemoteScope<'_>, name: &str) -> Result<ObjectPath> {
    let query = Query::by_name(classes::VIRTUAL_SWITCH, "ElementName", name);
    match scope.find(&query).await? {
        Some(switch) => Ok(switch.path().clone()),
        None => Err(scope.invalid(format!("virtual switch '{name}' does not exist"))),
    }
}

/// Fetch an object a method just reported creating.
async fn created(scope: &RemoteScope<'_>, outputs: &hyperv_mgmt::PropertyMap, key: &str, method: &'static str) -> Result<Instance> {
    let path = scope.resulting(outputs, key, method)?;
    scope
        .get(path)
        .await?
        .ok_or_else(|| scope.unexpected(method, format!("{key} does not exist")))
}

async fn connect(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    vm: &MachineRef,
    adapter: &Instance,
    switch_name: Option<&str>,
) -> Result<Instance> {
    let switch = match switch_name {
        Some(name) => Some(find_switch(scope, name).await?),
        None => None,
    };
    let outputs = scope
        .call(
            vsms,
            &AddResourceSettings {
                affected_configuration: vm.settings_path().clone(),
                resource_settings: vec![port_settings(adapter.path(), switch.as_ref())],
            },
        )
        .await?;
    created(scope, &outputs, "ResultingResourceSettings", AddResourceSettings::NAME).await
}

async fn add_feature(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    port: &Instance,
    feature: EmbeddedObject,
) -> Result<()> {
    scope
        .call(
            vsms,
            &AddFeatureSettings {
                affected_configuration: port.path().clone(),
                feature_settings: vec![feature],
            },
        )
        .await?;
    Ok(())
}

/// Bring one port feature to `desired`: add it, modify it in place or remove it.
async fn apply_feature(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    port: &Instance,
    class: &str,
    desired: Option<EmbeddedObject>,
) -> Result<()> {
    let existing = scope.find(&feature_query(class, port)).await?;
    match (existing, desired) {
        (None, None) => {}
        (None, Some(feature)) => add_feature(scope, vsms, port, feature).await?,
        (Some(current), Some(mut feature)) => {
            feature.set("InstanceID", instance_id(&current));
            scope
                .call(
                    vsms,
                    &ModifyFeatureSettings {
                        feature_settings: vec![feature],
                    },
                )
                .await?;
        }
        (Some(current), None) => {
            scope
                .call(
                    vsms,
                    &RemoveFeatureSettings {
                        feature_settings: vec![current.path().clone()],
                    },
                )
                .await?;
        }
    }
    Ok(())
}

/// Static guest addresses; an empty list switches the adapter back to DHCP.
async fn configure_guest(
    scope: &RemoteScope<'_>,
    vsms: &RemoteObjectHandle,
    vm: &MachineRef,
    adapter: &Instance,
    addresses: &[String],
) -> Result<()> {
    let config = EmbeddedObject::new(classes::GUEST_NETWORK_CONFIGURATION)
        .with("InstanceID", guest_configuration_id(adapter))
        .with("DHCPEnabled", addresses.is_empty())
        .with("IPAddresses", addresses.to_vec());
    scope
        .call(
            vsms,
            &SetGuestNetworkAdapterConfiguration {
                computer_system: vm.system_path().clone(),
                network_configuration: vec![config],
            },
        )
        .await?;
    Ok(())
}

/// Add an adapter named `name` to `vm` and apply its declared features.
///
/// The adapter itself is always required. Its port and features follow `policy`.
pub(crate) async fn attach(
    scope: &RemoteScope<'_>,
    vm: &MachineRef,
    name: &str,
    inputs: &NetworkAdapterInputs,
    policy: SubResourcePolicy,
) -> Result<Instance> {
    check(inputs).map_err(|reason| scope.invalid(format!("network adapter '{name}': {reason}")))?;
    let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;

    let outputs = scope
        .call(
            &vsms,
            &AddResourceSettings {
                affected_configuration: vm.settings_path().clone(),
                resource_settings: vec![adapter_settings(name, inputs.mac_address.as_deref())],
            },
        )
        .await?;
    let adapter = created(scope, &outputs, "ResultingResourceSettings", AddResourceSettings::NAME).await?;
    debug!(adapter = name, vm = vm.name(), "Added network adapter");

    let port = connect(scope, &vsms, vm, &adapter, inputs.switch_name.as_deref()).await;
    let Some(port) = settle(scope, policy, &format!("port of network adapter '{name}'"), port)? else {
        return Ok(adapter);
    };

    if let Some(vlan) = inputs.vlan_id {
        let result = add_feature(scope, &vsms, &port, vlan_settings(vlan)).await;
        settle(scope, policy, &format!("VLAN of network adapter '{name}'"), result)?;
    }
    if inputs.has_security_settings() {
        let result = add_feature(scope, &vsms, &port, security_settings(inputs)).await;
        settle(scope, policy, &format!("security settings of network adapter '{name}'"), result)?;
    }
    if let Some(weight) = inputs.vmq_weight {
        let result = add_feature(scope, &vsms, &port, offload_settings(weight)).await;
        settle(scope, policy, &format!("offload settings of network adapter '{name}'"), result)?;
    }
    let addresses = inputs.ip_address_list();
    if !addresses.is_empty() {
        let result = configure_guest(scope, &vsms, vm, &adapter, &addresses).await;
        settle(scope, policy, &format!("guest addresses of network adapter '{name}'"), result)?;
    }

    Ok(adapter)
}

/// Apply the changed settings groups of an existing adapter, one call per group.
pub(crate) async fn reconfigure(
    scope: &RemoteScope<'_>,
    vm: &MachineRef,
    adapter: &Instance,
    name: &str,
    old: &NetworkAdapterInputs,
    new: &NetworkAdapterInputs,
) -> Result<Changes> {
    let changes = diff(old, new);
    if changes.is_empty() {
        return Ok(changes);
    }
    check(new).map_err(|reason| scope.invalid(format!("network adapter '{name}': {reason}")))?;
    let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;

    if changes.has("mac") {
        let settings = adapter_settings(name, new.mac_address.as_deref()).with("InstanceID", instance_id(adapter));
        scope
            .call(
                &vsms,
                &ModifyResourceSettings {
                    resource_settings: vec![settings],
                },
            )
            .await?;
    }

    let port_groups = ["switch", "vlan", "security", "offload"];
    if port_groups.iter().any(|g| changes.has(g)) {
        let port = match scope.find(&port_query(adapter.path())).await? {
            Some(port) => {
                if changes.has("switch") {
                    let switch = match new.switch_name.as_deref() {
                        Some(name) => Some(find_switch(scope, name).await?),
                        None => None,
                    };
                    let settings = EmbeddedObject::new(classes::ETHERNET_PORT_ALLOCATION)
                        .with("InstanceID", instance_id(&port))
                        .with("HostResource", host_resource(switch.as_ref()));
                    scope
                        .call(
                            &vsms,
                            &ModifyResourceSettings {
                                resource_settings: vec![settings],
                            },
                        )
                        .await?;
                }
                port
            }
            None => connect(scope, &vsms, vm, adapter, new.switch_name.as_deref()).await?,
        };

        if changes.has("vlan") {
            apply_feature(scope, &vsms, &port, classes::PORT_VLAN_SETTINGS, new.vlan_id.map(vlan_settings)).await?;
        }
        if changes.has("security") {
            let desired = new.has_security_settings().then(|| security_settings(new));
            apply_feature(scope, &vsms, &port, classes::PORT_SECURITY_SETTINGS, desired).await?;
        }
        if changes.has("offload") {
            let desired = new.vmq_weight.map(offload_settings);
            apply_feature(scope, &vsms, &port, classes::PORT_OFFLOAD_SETTINGS, desired).await?;
        }
    }

    if changes.has("ip") {
        configure_guest(scope, &vsms, vm, adapter, &new.ip_address_list()).await?;
    }

    Ok(changes)
}

/// Remove the adapter's port allocation, then the adapter. Returns false if it was absent.
pub(crate) async fn detach(scope: &RemoteScope<'_>, vm: &MachineRef, name: &str) -> Result<bool> {
    let Some(adapter) = scope.find(&adapter_query(vm, name)).await? else {
        return Ok(false);
    };
    let vsms = scope.service(ServiceRole::VirtualSystemManagement).await?;

    let ports: Vec<ObjectPath> = scope
        .find_all(&port_query(adapter.path()))
        .await?
        .into_iter()
        .map(|port| port.path().clone())
        .collect();
    if !ports.is_empty() {
        scope
            .call(
                &vsms,
                &RemoveResourceSettings {
                    resource_settings: ports,
                },
            )
            .await?;
    }
    scope
        .call(
            &vsms,
            &RemoveResourceSettings {
                resource_settings: vec![adapter.path().clone()],
            },
        )
        .await?;
    debug!(adapter = name, vm = vm.name(), "Removed network adapter");
    Ok(true)
}

pub(crate) async fn find_adapter(scope: &RemoteScope<'_>, vm: &MachineRef, name: &str) -> Result<Option<Instance>> {
    scope.find(&adapter_query(vm, name)).await
}

/// Every adapter of `vm`.
pub(crate) async fn adapters_of(scope: &RemoteScope<'_>, vm: &MachineRef) -> Result<Vec<Instance>> {
    scope
        .find_all(&Query::all(classes::SYNTHETIC_ETHERNET_PORT).contains("InstanceID", vm.id()))
        .await
}

/// The adapter as the host reports it. Values the host does not report keep their declared value.
pub(crate) async fn observe(
    scope: &RemoteScope<'_>,
    adapter: &Instance,
    declared: &NetworkAdapterInputs,
) -> Result<NetworkAdapterInputs> {
    let mut observed = declared.clone();
    if let Some(name) = adapter.get_str("ElementName") {
        observed.name = Some(name.to_string());
    }

    match (adapter.get_bool("StaticMacAddress"), adapter.get_str("Address")) {
        (Some(true), Some(address)) => {
            let declared_mac = declared.mac_address.as_deref().and_then(normalize_mac);
            if declared_mac.as_deref() != Some(address) {
                observed.mac_address = Some(address.to_string());
            }
        }
        (Some(false), _) => observed.mac_address = None,
        _ => {}
    }

    if let Some(port) = scope.find(&port_query(adapter.path())).await? {
        observed.switch_name = match port.get_strings("HostResource").into_iter().next() {
            Some(switch) => scope
                .get(ObjectPath::new(switch))
                .await?
                .and_then(|s| s.get_str("ElementName").map(str::to_string)),
            None => None,
        };

        if let Some(vlan) = scope.find(&feature_query(classes::PORT_VLAN_SETTINGS, &port)).await? {
            if let Some(id) = vlan.get_u64("AccessVlanId").and_then(|v| u16::try_from(v).ok()) {
                observed.vlan_id = Some(id);
            }
        }
        if let Some(security) = scope.find(&feature_query(classes::PORT_SECURITY_SETTINGS, &port)).await? {
            observed.dhcp_guard = security.get_bool("EnableDhcpGuard").or(declared.dhcp_guard);
            observed.router_guard = security.get_bool("EnableRouterGuard").or(declared.router_guard);
            observed.ieee_priority_tag = security.get_bool("AllowIeeePriorityTag").or(declared.ieee_priority_tag);
            if let Some(code) = security.get_u64("MonitorMode") {
                let mode = PortMirroring::from_code(code);
                let declared_mode = declared.port_mirroring.as_deref().and_then(PortMirroring::parse);
                if declared_mode != Some(mode) && (declared_mode.is_some() || mode != PortMirroring::None) {
                    observed.port_mirroring = Some(mode.as_str().to_string());
                }
            }
        }
        if let Some(offload) = scope.find(&feature_query(classes::PORT_OFFLOAD_SETTINGS, &port)).await? {
            if let Some(weight) = offload.get_u64("VMQOffloadWeight").and_then(|v| u32::try_from(v).ok()) {
                observed.vmq_weight = Some(weight);
            }
        }
    }

    if let Some(guest) = scope.find(&guest_query(adapter)).await? {
        let addresses = guest.get_strings("IPAddresses");
        if addresses != declared.ip_address_list() {
            observed.ip_addresses = (!addresses.is_empty()).then(|| addresses.join(","));
        }
    }

    Ok(observed)
}

fn declared_view(id: &str, inputs: &NetworkAdapterInputs, adapter_id: Option<String>) -> NetworkAdapterOutputs {
    let mut inputs = inputs.clone();
    inputs.name = Some(id.to_string());
    NetworkAdapterOutputs::new(inputs, adapter_id)
}

fn require_vm_name(id: &str, inputs: &NetworkAdapterInputs) -> Result<String> {
    match inputs.vm_name.as_deref().map(str::trim) {
        Some(vm) if !vm.is_empty() => Ok(vm.to_string()),
        _ => Err(ReconcileError::InvalidInput {
            kind: ResourceKind::NetworkAdapter,
            id: id.to_string(),
            reason: "vmName is required".to_string(),
        }),
    }
}

impl NetworkAdapterReconciler {
    async fn create_in(
        &self,
        scope: &RemoteScope<'_>,
        vm_name: &str,
        inputs: &NetworkAdapterInputs,
    ) -> Result<NetworkAdapterOutputs> {
        let id = scope.id();
        let vm = find_machine(scope, vm_name)
            .await?
            .ok_or_else(|| scope.invalid(format!("machine '{vm_name}' does not exist")))?;

        if let Some(adapter) = find_adapter(scope, &vm, id).await? {
            scope.audit().resource_already_present(Self::KIND, id);
            let observed = observe(scope, &adapter, inputs).await?;
            return Ok(declared_view(id, &observed, Some(instance_id(&adapter).to_string())));
        }

        let adapter = attach(scope, &vm, id, inputs, SubResourcePolicy::Skip).await?;
        scope.audit().resource_created(Self::KIND, id);
        Ok(declared_view(id, inputs, Some(instance_id(&adapter).to_string())))
    }

    async fn read_in(
        &self,
        scope: &RemoteScope<'_>,
        vm_name: &str,
        inputs: &NetworkAdapterInputs,
    ) -> Result<NetworkAdapterOutputs> {
        let id = scope.id();
        let Some(vm) = find_machine(scope, vm_name).await? else {
            return Ok(declared_view(id, inputs, None));
        };
        match find_adapter(scope, &vm, id).await? {
            Some(adapter) => {
                let observed = observe(scope, &adapter, inputs).await?;
                Ok(declared_view(id, &observed, Some(instance_id(&adapter).to_string())))
            }
            None => Ok(declared_view(id, inputs, None)),
        }
    }

    async fn update_in(
        &self,
        scope: &RemoteScope<'_>,
        vm_name: &str,
        olds: &NetworkAdapterOutputs,
        news: &NetworkAdapterInputs,
    ) -> Result<NetworkAdapterOutputs> {
        let id = scope.id();
        let vm = find_machine(scope, vm_name).await?.ok_or_else(|| scope.missing())?;
        let adapter = find_adapter(scope, &vm, id).await?.ok_or_else(|| scope.missing())?;

        let changes = reconfigure(scope, &vm, &adapter, id, &olds.inputs, news).await?;
        scope.audit().resource_updated(Self::KIND, id, changes.groups());
        Ok(declared_view(id, news, Some(instance_id(&adapter).to_string())))
    }

    async fn delete_in(&self, scope: &RemoteScope<'_>, vm_name: &str) -> Result<()> {
        let id = scope.id();
        let removed = match find_machine(scope, vm_name).await? {
            Some(vm) => detach(scope, &vm, id).await?,
            None => false,
        };
        if removed {
            scope.audit().resource_deleted(Self::KIND, id);
        } else {
            scope.audit().resource_already_absent(Self::KIND, id);
        }
        Ok(())
    }
}

#[async_trait]
impl Reconciler for NetworkAdapterReconciler {
    const KIND: ResourceKind = ResourceKind::NetworkAdapter;
    type Inputs = NetworkAdapterInputs;
    type Outputs = NetworkAdapterOutputs;

    fn identity(&self, inputs: &Self::Inputs, fallback: &str) -> String {
        identity(inputs.name.as_deref(), fallback)
    }

    async fn create(
        &self,
        ctx: &ReconcileContext,
        name: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)> {
        let id = self.identity(inputs, name);
        let vm_name = require_vm_name(&id, inputs)?;
        check(inputs).map_err(|reason| ReconcileError::InvalidInput {
            kind: Self::KIND,
            id: id.clone(),
            reason,
        })?;
        if dry_run {
            return Ok((id.clone(), declared_view(&id, inputs, None)));
        }
        info!("Reconciling network adapter {} on machine {}", id, vm_name);

        let session = ctx.open(Self::KIND, &id).await?;
        let result = self.create_in(&ctx.scope(&session, Self::KIND, &id), &vm_name, inputs).await;
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
        let vm_name = require_vm_name(id, inputs)?;

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.read_in(&ctx.scope(&session, Self::KIND, id), &vm_name, inputs).await;
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
        if olds.inputs.vm_name != news.vm_name {
            return Err(immutable("vmName"));
        }
        if news.name.as_deref().is_some_and(|name| name != id) {
            return Err(immutable("name"));
        }

        let preview = declared_view(id, news, olds.adapter_id.clone());
        if dry_run || diff(&olds.inputs, news).is_empty() {
            return Ok(preview);
        }
        let vm_name = require_vm_name(id, news)?;
        info!("Reconciling network adapter {} on machine {}", id, vm_name);

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.update_in(&ctx.scope(&session, Self::KIND, id), &vm_name, olds, news).await;
        ctx.close(session).await;
        result
    }

    async fn delete(&self, ctx: &ReconcileContext, id: &str, outputs: &Self::Outputs, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        // Adapters are scoped to their machine; without one there is nothing to find.
        let Ok(vm_name) = require_vm_name(id, &outputs.inputs) else {
            ctx.audit().resource_already_absent(Self::KIND, id);
            return Ok(());
        };
        info!("Finalizing (deleting) network adapter {} on machine {}", id, vm_name);

        let session = ctx.open(Self::KIND, id).await?;
        let result = self.delete_in(&ctx.scope(&session, Self::KIND, id), &vm_name).await;
        ctx.close(session).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_groups() {
        let old = NetworkAdapterInputs {
            mac_address: Some("00:15:5d:01:02:03".into()),
            vlan_id: Some(10),
            ..Default::default()
        };
        let same_mac = NetworkAdapterInputs {
            mac_address: Some("00155D010203".into()),
            vlan_id: Some(10),
            ..Default::default()
        };
        assert!(diff(&old, &same_mac).is_empty());

        let new = NetworkAdapterInputs {
            mac_address: Some("00155D010203".into()),
            vlan_id: Some(20),
            dhcp_guard: Some(true),
            ip_addresses: Some("10.0.0.5".into()),
            ..Default::default()
        };
        assert_eq!(diff(&old, &new).groups(), &["vlan", "security", "ip"]);
    }

    #[test]
    fn test_check_rejects_bad_values() {
        let bad_mac = NetworkAdapterInputs {
            mac_address: Some("00:15".into()),
            ..Default::default()
        };
        assert!(check(&bad_mac).unwrap_err().contains("MAC"));

        let bad_vlan = NetworkAdapterInputs {
            vlan_id: Some(0),
            ..Default::default()
        };
        assert!(check(&bad_vlan).is_err());

        let bad_mirror = NetworkAdapterInputs {
            port_mirroring: Some("sideways".into()),
            ..Default::default()
        };
        assert!(check(&bad_mirror).is_err());
        assert!(check(&NetworkAdapterInputs::default()).is_ok());
    }

    #[test]
    fn test_security_settings_only_carry_declared_fields() {
        let inputs = NetworkAdapterInputs {
            dhcp_guard: Some(true),
            port_mirroring: Some("source".into()),
            ..Default::default()
        };
        let settings = security_settings(&inputs);
        assert_eq!(settings.get_bool("EnableDhcpGuard"), Some(true));
        assert_eq!(settings.get_u64("MonitorMode"), Some(2));
        assert!(settings.get_bool("EnableRouterGuard").is_none());
    }
}
