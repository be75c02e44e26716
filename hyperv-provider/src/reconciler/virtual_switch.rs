//! Virtual switch reconciler.
//!
//! The switch type is not stored on the host. It follows from the switch's
//! port allocations: a port on a physical NIC makes it external, a port on
//! the host's own computer system gives the management OS access.

use async_trait::async_trait;
use hyperv_mgmt::method::{AddResourceSettings, DefineSystem, DestroySystem, ModifySystemSettings, RemoveResourceSettings};
use hyperv_mgmt::{EmbeddedObject, Instance, ObjectPath, Properties, Query, ServiceRole, classes};
use tracing::{debug, info};

use super::{Changes, Reconciler};
use crate::context::{ReconcileContext, RemoteScope};
use crate::error::{ReconcileError, Result};
use crate::resources::virtual_switch::SwitchType;
use crate::resources::{ResourceKind, VirtualSwitchInputs, identity};

pub struct VirtualSwitchReconciler;

/// A switch with its settings and port allocations.
struct SwitchRef {
    system: Instance,
    settings: Instance,
    ports: Vec<Instance>,
}

impl SwitchRef {
    fn port_to(&self, class: &str) -> Option<&Instance> {
        self.ports.iter().find(|port| {
            port.get_strings("HostResource")
                .first()
                .is_some_and(|resource| ObjectPath::new(resource.clone()).class() == class)
        })
    }

    fn external_port(&self) -> Option<&Instance> {
        self.port_to(classes::EXTERNAL_ETHERNET_PORT)
    }

    fn internal_port(&self) -> Option<&Instance> {
        self.port_to(classes::COMPUTER_SYSTEM)
    }
}

fn invalid(id: &str, reason: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidInput {
        kind: ResourceKind::VirtualSwitch,
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn switch_type(id: &str, inputs: &VirtualSwitchInputs) -> Result<SwitchType> {
    let value = inputs
        .switch_type
        .as_deref()
        .ok_or_else(|| invalid(id, "switchType is required"))?;
    let switch_type =
        SwitchType::parse(value).ok_or_else(|| invalid(id, format!("unknown switch type '{value}'")))?;
    if switch_type == SwitchType::External && inputs.net_adapter_name.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(id, "netAdapterName is required for external switches"));
    }
    Ok(switch_type)
}

/// Internal switches always reach the management OS, external ones on request.
fn wants_internal_port(switch_type: SwitchType, inputs: &VirtualSwitchInputs) -> bool {
    match switch_type {
        SwitchType::Internal => true,
        SwitchType::External => inputs.allow_management_os.unwrap_or(false),
        SwitchType::Private => false,
    }
}

fn port_settings(name: String, resource: &ObjectPath) -> EmbeddedObject {
    EmbeddedObject::new(classes::ETHERNET_PORT_ALLOCATION)
        .with("ElementName", name)
        .with("HostResource", vec![resource.as_str().to_string()])
}

fn declared_view(id: &str, switch_type: SwitchType, inputs: &VirtualSwitchInputs) -> VirtualSwitchInputs {
    let mut filled = inputs.clone();
    filled.name = Some(id.to_string());
    filled.switch_type = Some(switch_type.as_str().to_string());
    filled.allow_management_os = Some(wants_internal_port(switch_type, inputs));
    filled
}

async fn find_switch(scope: &RemoteScope<'_>, name: &str) -> Result<Option<SwitchRef>> {
    let Some(system) = scope
        .find(&Query::by_name(classes::VIRTUAL_SWITCH, "ElementName", name))
        .await?
    else {
        return Ok(None);
    };
    let id = system.get_str("Name").unwrap_or_default().to_string();
    let settings = scope
        .find(&Query::by_name(classes::SWITCH_SETTINGS, "VirtualSystemIdentifier", &id))
        .await?
        .ok_or_else(|| scope.unexpected("ExecQuery", format!("switch '{name}' has no settings")))?;
    let ports = scope
        .find_all(&Query::all(classes::ETHERNET_PORT_ALLOCATION).contains("InstanceID", &id))
        .await?;
    Ok(Some(SwitchRef {
        system,
        settings,
        ports,
    }))
}

async fn host_system(scope: &RemoteScope<'_>) -> Result<ObjectPath> {
    scope
        .find(&Query::by_name(classes::COMPUTER_SYSTEM, "Caption", classes::HOST_CAPTION))
        .await?
        .map(|host| host.path().clone())
        .ok_or_else(|| scope.unexpected("ExecQuery", "host computer system not found"))
}

async fn internal_port(scope: &RemoteScope<'_>) -> Result<EmbeddedObject> {
    let host = host_system(scope).await?;
    Ok(port_settings(format!("{}_Internal", scope.id()), &host))
}

async fn observe(scope: &RemoteScope<'_>, switch: &SwitchRef, declared: &VirtualSwitchInputs) -> Result<VirtualSwitchInputs> {
    let mut observed = declared.clone();
    observed.name = switch.system.get_str("ElementName").map(str::to_string).or(observed.name);
    observed.notes = switch.settings.get_strings("Notes").into_iter().next();

    let internal = switch.internal_port().is_some();
    let switch_type = match switch.external_port() {
        Some(port) => {
            if let Some(resource) = port.get_strings("HostResource").into_iter().next() {
                if let Some(nic) = scope.get(ObjectPath::new(resource)).await? {
                    observed.net_adapter_name = nic.get_str("ElementName").map(str::to_string);
                }
            }
            SwitchType::External
        }
        None if internal => SwitchType::Internal,
        None => SwitchType::Private,
    };
    observed.switch_type = Some(switch_type.as_str().to_string());
    observed.allow_management_os = Some(internal);
    Ok(observed)
}

impl VirtualSwitchReconciler {
    async fn create_in(
        &self,
        scope: &RemoteScope<'_>,
        switch_type: SwitchType,
        inputs: &VirtualSwitchInputs,
    ) -> Result<VirtualSwitchInputs> {
        let id = scope.id();
        if let Some(switch) = find_switch(scope, id).await? {
            scope.audit().resource_already_present(Self::KIND, id);
            return observe(scope, &switch, inputs).await;
        }

        let mut ports = Vec::new();
        if switch_type == SwitchType::External {
            let nic_name = inputs.net_adapter_name.as_deref().unwrap_or_default();
            let nic = scope
                .find(&Query::by_name(classes::EXTERNAL_ETHERNET_PORT, "ElementName", nic_name))
                .await?
                .ok_or_else(|| scope.invalid(format!("network adapter '{nic_name}' not found on host")))?;
            ports.push(port_settings(format!("{id}_External"), nic.path()));
        }
        if wants_internal_port(switch_type, inputs) {
            ports.push(internal_port(scope).await?);
        }

        let settings = EmbeddedObject::new(classes::SWITCH_SETTINGS)
            .with("ElementName", id)
            .with_opt("Notes", inputs.notes.clone().map(|notes| vec![notes]));
        let service = scope.service(ServiceRole::SwitchManagement).await?;
        scope
            .call(
                &service,
                &DefineSystem {
                    system_settings: settings,
                    resource_settings: ports,
                    reference_configuration: None,
                },
            )
            .await?;
        scope.audit().resource_created(Self::KIND, id);
        Ok(declared_view(id, switch_type, inputs))
    }

    async fn read_in(
        &self,
        scope: &RemoteScope<'_>,
        switch_type: Option<SwitchType>,
        inputs: &VirtualSwitchInputs,
    ) -> Result<VirtualSwitchInputs> {
        match find_switch(scope, scope.id()).await? {
            Some(switch) => observe(scope, &switch, inputs).await,
            None => Ok(match switch_type {
                Some(switch_type) => declared_view(scope.id(), switch_type, inputs),
                None => inputs.clone(),
            }),
        }
    }

    async fn update_in(
        &self,
        scope: &RemoteScope<'_>,
        switch_type: SwitchType,
        news: &VirtualSwitchInputs,
        changes: &Changes,
    ) -> Result<VirtualSwitchInputs> {
        let id = scope.id();
        let switch = find_switch(scope, id).await?.ok_or_else(|| scope.missing())?;
        let service = scope.service(ServiceRole::SwitchManagement).await?;

        if changes.has("notes") {
            let settings = EmbeddedObject::new(classes::SWITCH_SETTINGS)
                .with("InstanceID", switch.settings.get_str("InstanceID").unwrap_or_default())
                .with("Notes", news.notes.clone().into_iter().collect::<Vec<_>>());
            scope
                .call(
                    &service,
                    &ModifySystemSettings {
                        system_settings: settings,
                    },
                )
                .await?;
        }

        if changes.has("managementOs") {
            match (wants_internal_port(switch_type, news), switch.internal_port()) {
                (true, None) => {
                    let port = internal_port(scope).await?;
                    scope
                        .call(
                            &service,
                            &AddResourceSettings {
                                affected_configuration: switch.settings.path().clone(),
                                resource_settings: vec![port],
                            },
                        )
                        .await?;
                }
                (false, Some(port)) => {
                    scope
                        .call(
                            &service,
                            &RemoveResourceSettings {
                                resource_settings: vec![port.path().clone()],
                            },
                        )
                        .await?;
                }
                _ => debug!(switch = id, "Management OS port already as declared"),
            }
        }

        scope.audit().resource_updated(Self::KIND, id, changes.groups());
        Ok(declared_view(id, switch_type, news))
    }

    async fn delete_in(&self, scope: &RemoteScope<'_>) -> Result<()> {
        let id = scope.id();
        let Some(switch) = find_switch(scope, id).await? else {
            scope.audit().resource_already_absent(Self::KIND, id);
            return Ok(());
        };
        let service = scope.service(ServiceRole::SwitchManagement).await?;
        scope
            .call(
                &service,
                &DestroySystem {
                    affected_system: switch.system.path().clone(),
                },
            )
            .await?;
        scope.audit().resource_deleted(Self::KIND, id);
        Ok(())
    }
}

#[async_trait]
impl Reconciler for VirtualSwitchReconciler {
    const KIND: ResourceKind = ResourceKind::VirtualSwitch;
    type Inputs = VirtualSwitchInputs;
    type Outputs = VirtualSwitchInputs;

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
        let switch_type = switch_type(&id, inputs)?;
        if dry_run {
            return Ok((id.clone(), declared_view(&id, switch_type, inputs)));
        }
        info!("Reconciling virtual switch {} ({})", id, switch_type.as_str());

        let session = ctx.open(Self::KIND, &id).await?;
        let result = self
            .create_in(&ctx.scope(&session, Self::KIND, &id), switch_type, inputs)
            .await;
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
        let switch_type = inputs.switch_type.as_deref().and_then(SwitchType::parse);
        if dry_run {
            let view = match switch_type {
                Some(switch_type) => declared_view(id, switch_type, inputs),
                None => inputs.clone(),
            };
            return Ok((id.to_string(), view));
        }

        let session = ctx.open(Self::KIND, id).await?;
        let result = self
            .read_in(&ctx.scope(&session, Self::KIND, id), switch_type, inputs)
            .await;
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
        let switch_type = switch_type(id, news)?;
        if olds.switch_type.as_deref().and_then(SwitchType::parse) != Some(switch_type) {
            return Err(immutable("switchType"));
        }
        if switch_type == SwitchType::External && olds.net_adapter_name != news.net_adapter_name {
            return Err(immutable("netAdapterName"));
        }
        if news.name.as_deref().is_some_and(|name| name != id) {
            return Err(immutable("name"));
        }

        let mut changes = Changes::default();
        changes.mark("notes", olds.notes != news.notes);
        changes.mark(
            "managementOs",
            switch_type == SwitchType::External
                && olds.allow_management_os.unwrap_or(false) != news.allow_management_os.unwrap_or(false),
        );
        if dry_run || changes.is_empty() {
            return Ok(declared_view(id, switch_type, news));
        }
        info!("Reconciling virtual switch {} ({})", id, changes.groups().join(", "));

        let session = ctx.open(Self::KIND, id).await?;
        let result = self
            .update_in(&ctx.scope(&session, Self::KIND, id), switch_type, news, &changes)
            .await;
        ctx.close(session).await;
        result
    }

    async fn delete(&self, ctx: &ReconcileContext, id: &str, _outputs: &Self::Outputs, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        info!("Finalizing (deleting) virtual switch {}", id);

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
    fn test_switch_type_validation() {
        let external = VirtualSwitchInputs {
            switch_type: Some("external".into()),
            ..Default::default()
        };
        let err = switch_type("lan", &external).unwrap_err();
        assert!(err.to_string().contains("netAdapterName"));

        let missing = VirtualSwitchInputs::default();
        assert!(switch_type("lan", &missing).is_err());

        let private = VirtualSwitchInputs {
            switch_type: Some("Private".into()),
            allow_management_os: Some(true),
            ..Default::default()
        };
        assert_eq!(switch_type("lan", &private).unwrap(), SwitchType::Private);
        assert!(!wants_internal_port(SwitchType::Private, &private));
        assert!(wants_internal_port(SwitchType::Internal, &VirtualSwitchInputs::default()));
    }
}
