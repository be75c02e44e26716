//! Typed parameter records for the management methods this crate invokes.
//!
//! Each record encodes itself into the generic parameter map exactly once, at
//! the session boundary.

use crate::handle::ObjectPath;
use crate::value::{EmbeddedObject, PropertyMap, Value};

/// A remote method together with its input parameters.
pub trait RemoteMethod: Send + Sync {
    const NAME: &'static str;

    fn encode(&self) -> PropertyMap;
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> PropertyMap {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// `RequestedState` values accepted by `RequestStateChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedState {
    Enabled,
    Disabled,
    ShutDown,
    Offline,
    Reboot,
    Reset,
    Pause,
    Resume,
}

impl RequestedState {
    pub fn code(&self) -> u16 {
        match self {
            RequestedState::Enabled => 2,
            RequestedState::Disabled => 3,
            RequestedState::ShutDown => 4,
            RequestedState::Offline => 6,
            RequestedState::Reboot => 10,
            RequestedState::Reset => 11,
            RequestedState::Pause => 32776,
            RequestedState::Resume => 32777,
        }
    }
}

/// Create a virtual system (machine or switch) from setting objects.
#[derive(Debug, Clone)]
pub struct DefineSystem {
    pub system_settings: EmbeddedObject,
    pub resource_settings: Vec<EmbeddedObject>,
    pub reference_configuration: Option<ObjectPath>,
}

impl RemoteMethod for DefineSystem {
    const NAME: &'static str = "DefineSystem";

    fn encode(&self) -> PropertyMap {
        let mut map = params([
            ("SystemSettings", self.system_settings.clone().into()),
            ("ResourceSettings", self.resource_settings.clone().into()),
        ]);
        if let Some(reference) = &self.reference_configuration {
            map.insert("ReferenceConfiguration".into(), reference.clone().into());
        }
        map
    }
}

#[derive(Debug, Clone)]
pub struct DestroySystem {
    pub affected_system: ObjectPath,
}

impl RemoteMethod for DestroySystem {
    const NAME: &'static str = "DestroySystem";

    fn encode(&self) -> PropertyMap {
        params([("AffectedSystem", self.affected_system.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct ModifySystemSettings {
    pub system_settings: EmbeddedObject,
}

impl RemoteMethod for ModifySystemSettings {
    const NAME: &'static str = "ModifySystemSettings";

    fn encode(&self) -> PropertyMap {
        params([("SystemSettings", self.system_settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct AddResourceSettings {
    pub affected_configuration: ObjectPath,
    pub resource_settings: Vec<EmbeddedObject>,
}

impl RemoteMethod for AddResourceSettings {
    const NAME: &'static str = "AddResourceSettings";

    fn encode(&self) -> PropertyMap {
        params([
            ("AffectedConfiguration", self.affected_configuration.clone().into()),
            ("ResourceSettings", self.resource_settings.clone().into()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ModifyResourceSettings {
    pub resource_settings: Vec<EmbeddedObject>,
}

impl RemoteMethod for ModifyResourceSettings {
    const NAME: &'static str = "ModifyResourceSettings";

    fn encode(&self) -> PropertyMap {
        params([("ResourceSettings", self.resource_settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct RemoveResourceSettings {
    pub resource_settings: Vec<ObjectPath>,
}

impl RemoteMethod for RemoveResourceSettings {
    const NAME: &'static str = "RemoveResourceSettings";

    fn encode(&self) -> PropertyMap {
        params([("ResourceSettings", self.resource_settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct AddFeatureSettings {
    pub affected_configuration: ObjectPath,
    pub feature_settings: Vec<EmbeddedObject>,
}

impl RemoteMethod for AddFeatureSettings {
    const NAME: &'static str = "AddFeatureSettings";

    fn encode(&self) -> PropertyMap {
        params([
            ("AffectedConfiguration", self.affected_configuration.clone().into()),
            ("FeatureSettings", self.feature_settings.clone().into()),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct ModifyFeatureSettings {
    pub feature_settings: Vec<EmbeddedObject>,
}

impl RemoteMethod for ModifyFeatureSettings {
    const NAME: &'static str = "ModifyFeatureSettings";

    fn encode(&self) -> PropertyMap {
        params([("FeatureSettings", self.feature_settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct RemoveFeatureSettings {
    pub feature_settings: Vec<ObjectPath>,
}

impl RemoteMethod for RemoveFeatureSettings {
    const NAME: &'static str = "RemoveFeatureSettings";

    fn encode(&self) -> PropertyMap {
        params([("FeatureSettings", self.feature_settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct SetGuestNetworkAdapterConfiguration {
    pub computer_system: ObjectPath,
    pub network_configuration: Vec<EmbeddedObject>,
}

impl RemoteMethod for SetGuestNetworkAdapterConfiguration {
    const NAME: &'static str = "SetGuestNetworkAdapterConfiguration";

    fn encode(&self) -> PropertyMap {
        params([
            ("ComputerSystem", self.computer_system.clone().into()),
            ("NetworkConfiguration", self.network_configuration.clone().into()),
        ])
    }
}

/// Invoked on a computer system rather than on a service.
#[derive(Debug, Clone)]
pub struct RequestStateChange {
    pub requested_state: RequestedState,
}

impl RemoteMethod for RequestStateChange {
    const NAME: &'static str = "RequestStateChange";

    fn encode(&self) -> PropertyMap {
        params([("RequestedState", self.requested_state.code().into())])
    }
}

#[derive(Debug, Clone)]
pub struct CreateVirtualHardDisk {
    pub settings: EmbeddedObject,
}

impl RemoteMethod for CreateVirtualHardDisk {
    const NAME: &'static str = "CreateVirtualHardDisk";

    fn encode(&self) -> PropertyMap {
        params([("VirtualDiskSettingData", self.settings.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct GetVirtualHardDiskSettingData {
    pub path: String,
}

impl RemoteMethod for GetVirtualHardDiskSettingData {
    const NAME: &'static str = "GetVirtualHardDiskSettingData";

    fn encode(&self) -> PropertyMap {
        params([("Path", self.path.clone().into())])
    }
}

#[derive(Debug, Clone)]
pub struct ResizeVirtualHardDisk {
    pub path: String,
    pub max_internal_size: u64,
}

impl RemoteMethod for ResizeVirtualHardDisk {
    const NAME: &'static str = "ResizeVirtualHardDisk";

    fn encode(&self) -> PropertyMap {
        params([
            ("Path", self.path.clone().into()),
            ("MaxInternalSize", self.max_internal_size.into()),
        ])
    }
}

/// `CIM_DataFile.Delete`, invoked on the file object itself.
#[derive(Debug, Clone, Default)]
pub struct DeleteDataFile;

impl RemoteMethod for DeleteDataFile {
    const NAME: &'static str = "Delete";

    fn encode(&self) -> PropertyMap {
        PropertyMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Properties;

    #[test]
    fn test_define_system_encoding() {
        let method = DefineSystem {
            system_settings: EmbeddedObject::new("Msvm_VirtualSystemSettingData").with("ElementName", "web-01"),
            resource_settings: vec![EmbeddedObject::new("Msvm_MemorySettingData").with("VirtualQuantity", 1024u64)],
            reference_configuration: None,
        };
        let map = method.encode();

        assert_eq!(map.len(), 2);
        let settings = map.get_object("SystemSettings").unwrap();
        assert_eq!(settings.get_str("ElementName"), Some("web-01"));
        assert!(matches!(map.get("ResourceSettings"), Some(Value::ObjectList(list)) if list.len() == 1));
    }

    #[test]
    fn test_request_state_change_encoding() {
        let map = RequestStateChange {
            requested_state: RequestedState::Disabled,
        }
        .encode();
        assert_eq!(map.get_u64("RequestedState"), Some(3));
        assert_eq!(RequestStateChange::NAME, "RequestStateChange");
    }
}
