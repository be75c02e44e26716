//! Effects of management methods on the simulated object store.

use super::state::{SimState, props};
use crate::classes;
use crate::handle::ObjectPath;
use crate::transport::TransportError;
use crate::value::{EmbeddedObject, Properties, PropertyMap, Value};
use uuid::Uuid;

/// Outputs on success, a method return code on failure.
pub(crate) type Outcome = std::result::Result<PropertyMap, u32>;

const FAILED: u32 = 32768;
const NOT_SUPPORTED: u32 = 32770;
const INVALID_PARAMETER: u32 = 32773;
const INVALID_STATE: u32 = 32775;

const VSMS: &str = "Msvm_VirtualSystemManagementService";
const IMAGE_SERVICE: &str = "Msvm_ImageManagementService";
const SWITCH_SERVICE: &str = "Msvm_VirtualEthernetSwitchManagementService";

const ENABLED: u64 = 2;
const DISABLED: u64 = 3;
const SAVED: u64 = 6;
const PAUSED: u64 = 32768;

const VHD_TYPE_FIXED: u64 = 2;
const VHD_TYPE_DIFFERENCING: u64 = 4;
const EMPTY_IMAGE_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Clone, Copy)]
enum SystemKind {
    Machine,
    Switch,
}

pub(crate) fn dispatch(
    state: &mut SimState,
    target: &ObjectPath,
    method: &str,
    params: &PropertyMap,
) -> Result<Outcome, TransportError> {
    let class = state
        .get(target)
        .map(|obj| obj.class.clone())
        .ok_or_else(|| TransportError::Failed(format!("object {target} not found")))?;

    let outcome = match (class.as_str(), method) {
        (VSMS, "DefineSystem") => define_system(state, SystemKind::Machine, params),
        (SWITCH_SERVICE, "DefineSystem") => define_system(state, SystemKind::Switch, params),
        (VSMS | SWITCH_SERVICE, "DestroySystem") => destroy_system(state, params),
        (VSMS | SWITCH_SERVICE, "ModifySystemSettings") => {
            modify_settings(state, params.get_object("SystemSettings").cloned().into_iter().collect())
                .map(|_| PropertyMap::new())
        }
        (VSMS | SWITCH_SERVICE, "AddResourceSettings") => {
            add_settings(state, params, "ResourceSettings", "ResultingResourceSettings")
        }
        (VSMS | SWITCH_SERVICE, "ModifyResourceSettings") => modify_settings(state, objects(params, "ResourceSettings"))
            .map(|paths| props([("ResultingResourceSettings", paths.into())])),
        (VSMS | SWITCH_SERVICE, "RemoveResourceSettings") => remove_settings(state, params, "ResourceSettings"),
        (VSMS | SWITCH_SERVICE, "AddFeatureSettings") => {
            add_settings(state, params, "FeatureSettings", "ResultingFeatureSettings")
        }
        (VSMS | SWITCH_SERVICE, "ModifyFeatureSettings") => modify_settings(state, objects(params, "FeatureSettings"))
            .map(|paths| props([("ResultingFeatureSettings", paths.into())])),
        (VSMS | SWITCH_SERVICE, "RemoveFeatureSettings") => remove_settings(state, params, "FeatureSettings"),
        (VSMS, "SetGuestNetworkAdapterConfiguration") => set_guest_network(state, params),
        (IMAGE_SERVICE, "CreateVirtualHardDisk") => create_disk(state, params),
        (IMAGE_SERVICE, "GetVirtualHardDiskSettingData") => disk_settings(state, params),
        (IMAGE_SERVICE, "ResizeVirtualHardDisk") => resize_disk(state, params),
        (classes::COMPUTER_SYSTEM, "RequestStateChange") => request_state_change(state, target, params),
        (classes::DATA_FILE, "Delete") => {
            state.remove(target);
            Ok(PropertyMap::new())
        }
        _ => return Err(TransportError::InvalidMethod(format!("{class}.{method}"))),
    };
    Ok(outcome)
}

fn objects(params: &PropertyMap, key: &str) -> Vec<EmbeddedObject> {
    match params.get(key) {
        Some(Value::ObjectList(list)) => list.clone(),
        Some(Value::Object(obj)) => vec![obj.clone()],
        _ => Vec::new(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

fn instance_id(state: &SimState, path: &ObjectPath) -> Option<String> {
    state
        .get(path)
        .and_then(|obj| obj.properties.get_str("InstanceID"))
        .map(str::to_string)
}

/// Resources must point at objects that exist on the host.
fn check_references(state: &SimState, obj: &EmbeddedObject) -> Result<(), u32> {
    let resources = obj.get_strings("HostResource");
    let resolves = |resource: &String| {
        if obj.class == classes::STORAGE_ALLOCATION {
            state.contains(&ObjectPath::keyed(classes::DATA_FILE, "Name", resource))
        } else {
            state.contains(&ObjectPath::new(resource.clone()))
        }
    };
    if !resources.iter().all(resolves) {
        return Err(INVALID_PARAMETER);
    }
    if let Some(parent) = obj.get_path("Parent") {
        if !state.contains(&parent) {
            return Err(INVALID_PARAMETER);
        }
    }
    Ok(())
}

fn define_system(state: &mut SimState, kind: SystemKind, params: &PropertyMap) -> Outcome {
    let settings = params.get_object("SystemSettings").ok_or(INVALID_PARAMETER)?;
    let mut resources = objects(params, "ResourceSettings");
    for resource in &resources {
        check_references(state, resource)?;
    }

    let id = new_id();
    let name = settings.get_str("ElementName").unwrap_or_default().to_string();
    let (system_class, settings_class, caption, enabled_state) = match kind {
        SystemKind::Machine => (
            classes::COMPUTER_SYSTEM,
            classes::SYSTEM_SETTINGS,
            classes::VIRTUAL_MACHINE_CAPTION,
            DISABLED,
        ),
        SystemKind::Switch => (classes::VIRTUAL_SWITCH, classes::SWITCH_SETTINGS, "Virtual Switch", ENABLED),
    };

    let system_path = ObjectPath::keyed(system_class, "Name", &id);
    state.insert(
        system_path.clone(),
        system_class,
        props([
            ("Name", id.clone().into()),
            ("ElementName", name.clone().into()),
            ("Caption", caption.into()),
            ("EnabledState", enabled_state.into()),
        ]),
    );

    let base = format!("Microsoft:{id}");
    let mut settings_props = settings.properties.clone();
    settings_props.insert("InstanceID".into(), base.clone().into());
    settings_props.insert("ElementName".into(), name.into());
    settings_props.insert("VirtualSystemIdentifier".into(), id.into());
    state.insert(
        ObjectPath::keyed(settings_class, "InstanceID", &base),
        settings_class,
        settings_props,
    );

    if let SystemKind::Machine = kind {
        // Hyper-V always gives a machine memory and processor settings.
        let has = |class: &str, resources: &[EmbeddedObject]| resources.iter().any(|r| r.class == class);
        if !has(classes::MEMORY_SETTINGS, &resources) {
            resources.push(EmbeddedObject::new(classes::MEMORY_SETTINGS).with("VirtualQuantity", 1024u64));
        }
        if !has(classes::PROCESSOR_SETTINGS, &resources) {
            resources.push(EmbeddedObject::new(classes::PROCESSOR_SETTINGS).with("VirtualQuantity", 1u64));
        }
    }
    for resource in resources {
        state.add_child(&base, resource);
    }

    Ok(props([("ResultingSystem", system_path.into())]))
}

fn destroy_system(state: &mut SimState, params: &PropertyMap) -> Outcome {
    let path = params.get_path("AffectedSystem").ok_or(INVALID_PARAMETER)?;
    let system = state.get(&path).ok_or(INVALID_PARAMETER)?;
    if system.class == classes::COMPUTER_SYSTEM && system.properties.get_u64("EnabledState") == Some(ENABLED) {
        return Err(INVALID_STATE);
    }
    let id = system.properties.get_str("Name").ok_or(INVALID_PARAMETER)?.to_string();

    let owned: Vec<ObjectPath> = state
        .objects
        .iter()
        .filter(|(_, obj)| obj.properties.get_str("InstanceID").is_some_and(|iid| iid.contains(&id)))
        .map(|(p, _)| p.clone())
        .collect();
    for p in owned {
        state.remove(&p);
    }
    state.remove(&path);
    Ok(PropertyMap::new())
}

fn add_settings(state: &mut SimState, params: &PropertyMap, input: &str, output: &str) -> Outcome {
    let affected = params.get_path("AffectedConfiguration").ok_or(INVALID_PARAMETER)?;
    let base = instance_id(state, &affected).ok_or(INVALID_PARAMETER)?;
    let settings = objects(params, input);
    if settings.is_empty() {
        return Err(INVALID_PARAMETER);
    }
    for obj in &settings {
        check_references(state, obj)?;
    }
    let paths: Vec<ObjectPath> = settings.into_iter().map(|obj| state.add_child(&base, obj)).collect();
    Ok(props([(output, paths.into())]))
}

fn modify_settings(state: &mut SimState, settings: Vec<EmbeddedObject>) -> Result<Vec<ObjectPath>, u32> {
    if settings.is_empty() {
        return Err(INVALID_PARAMETER);
    }
    let mut targets = Vec::with_capacity(settings.len());
    for obj in &settings {
        let iid = obj.get_str("InstanceID").ok_or(INVALID_PARAMETER)?;
        let path = ObjectPath::keyed(&obj.class, "InstanceID", iid);
        if !state.contains(&path) {
            return Err(INVALID_PARAMETER);
        }
        check_references(state, obj)?;
        if needs_stopped_system(&obj.class) && owner_is_running(state, iid) {
            return Err(INVALID_STATE);
        }
        targets.push(path);
    }
    for (obj, path) in settings.into_iter().zip(&targets) {
        if let Some(existing) = state.get_mut(path) {
            existing.properties.extend(obj.properties);
        }
    }
    Ok(targets)
}

fn needs_stopped_system(class: &str) -> bool {
    class == classes::MEMORY_SETTINGS || class == classes::PROCESSOR_SETTINGS
}

/// Whether the machine owning the setting `instance_id` is running.
fn owner_is_running(state: &SimState, instance_id: &str) -> bool {
    let base = instance_id.split('\\').next().unwrap_or(instance_id);
    let Some(system_id) = base.strip_prefix("Microsoft:") else {
        return false;
    };
    state
        .get(&ObjectPath::keyed(classes::COMPUTER_SYSTEM, "Name", system_id))
        .is_some_and(|system| system.properties.get_u64("EnabledState") == Some(ENABLED))
}

fn remove_settings(state: &mut SimState, params: &PropertyMap, input: &str) -> Outcome {
    let paths = params.get_paths(input);
    if paths.is_empty() || !paths.iter().all(|p| state.contains(p)) {
        return Err(INVALID_PARAMETER);
    }
    for path in paths {
        remove_tree(state, &path);
    }
    Ok(PropertyMap::new())
}

/// Remove an object, everything nested below it and everything attached to it via `Parent`.
fn remove_tree(state: &mut SimState, path: &ObjectPath) {
    let Some(removed) = state.remove(path) else {
        return;
    };
    let mut dependents: Vec<ObjectPath> = state
        .objects
        .iter()
        .filter(|(_, obj)| obj.properties.get_str("Parent") == Some(path.as_str()))
        .map(|(p, _)| p.clone())
        .collect();
    if let Some(iid) = removed.properties.get_str("InstanceID") {
        dependents.extend(state.descendants(iid));
    }
    for dependent in dependents {
        remove_tree(state, &dependent);
    }
}

fn set_guest_network(state: &mut SimState, params: &PropertyMap) -> Outcome {
    let system = params.get_path("ComputerSystem").ok_or(INVALID_PARAMETER)?;
    if !state.contains(&system) {
        return Err(INVALID_PARAMETER);
    }
    let configs = objects(params, "NetworkConfiguration");
    if configs.is_empty() {
        return Err(INVALID_PARAMETER);
    }
    for config in configs {
        let iid = config.get_str("InstanceID").ok_or(INVALID_PARAMETER)?.to_string();
        let path = ObjectPath::keyed(classes::GUEST_NETWORK_CONFIGURATION, "InstanceID", &iid);
        state.insert(path, classes::GUEST_NETWORK_CONFIGURATION, config.properties);
    }
    Ok(PropertyMap::new())
}

fn create_disk(state: &mut SimState, params: &PropertyMap) -> Outcome {
    let settings = params.get_object("VirtualDiskSettingData").ok_or(INVALID_PARAMETER)?;
    let path = settings.get_str("Path").ok_or(INVALID_PARAMETER)?.to_string();
    let file = ObjectPath::keyed(classes::DATA_FILE, "Name", &path);
    if state.contains(&file) {
        return Err(FAILED);
    }

    let disk_type = settings.get_u64("Type").ok_or(INVALID_PARAMETER)?;
    let size = if disk_type == VHD_TYPE_DIFFERENCING {
        let parent = settings.get_str("ParentPath").ok_or(INVALID_PARAMETER)?;
        state
            .get(&ObjectPath::keyed(classes::DATA_FILE, "Name", parent))
            .ok_or(INVALID_PARAMETER)?
            .properties
            .get_u64("MaxInternalSize")
            .unwrap_or_default()
    } else {
        match settings.get_u64("MaxInternalSize") {
            Some(size) if size > 0 => size,
            _ => return Err(INVALID_PARAMETER),
        }
    };

    let mut properties = settings.properties.clone();
    properties.insert("Name".into(), path.clone().into());
    properties.insert("MaxInternalSize".into(), size.into());
    let file_size = if disk_type == VHD_TYPE_FIXED { size } else { EMPTY_IMAGE_SIZE };
    properties.insert("FileSize".into(), file_size.into());
    state.insert(file, classes::DATA_FILE, properties);
    Ok(PropertyMap::new())
}

fn disk_settings(state: &mut SimState, params: &PropertyMap) -> Outcome {
    let path = params.get_str("Path").ok_or(INVALID_PARAMETER)?;
    let file = state
        .get(&ObjectPath::keyed(classes::DATA_FILE, "Name", path))
        .ok_or(INVALID_PARAMETER)?;
    if file.properties.get_u64("Type").is_none() {
        // Not a virtual hard disk.
        return Err(NOT_SUPPORTED);
    }

    let mut settings = EmbeddedObject::new(classes::HARD_DISK_SETTINGS).with("Path", path);
    for key in [
        "Type",
        "Format",
        "MaxInternalSize",
        "BlockSize",
        "LogicalSectorSize",
        "PhysicalSectorSize",
        "ParentPath",
    ] {
        if let Some(value) = file.properties.get(key) {
            settings.set(key, value.clone());
        }
    }
    Ok(props([("SettingData", settings.into())]))
}

fn resize_disk(state: &mut SimState, params: &PropertyMap) -> Outcome {
    let path = params.get_str("Path").ok_or(INVALID_PARAMETER)?;
    let new_size = params.get_u64("MaxInternalSize").ok_or(INVALID_PARAMETER)?;
    let file = state
        .get_mut(&ObjectPath::keyed(classes::DATA_FILE, "Name", path))
        .ok_or(INVALID_PARAMETER)?;
    let current = file.properties.get_u64("MaxInternalSize").ok_or(NOT_SUPPORTED)?;
    if new_size < current {
        return Err(INVALID_PARAMETER);
    }
    file.properties.insert("MaxInternalSize".into(), new_size.into());
    if file.properties.get_u64("Type") == Some(VHD_TYPE_FIXED) {
        file.properties.insert("FileSize".into(), new_size.into());
    }
    Ok(PropertyMap::new())
}

fn request_state_change(state: &mut SimState, target: &ObjectPath, params: &PropertyMap) -> Outcome {
    let requested = params.get_u64("RequestedState").ok_or(INVALID_PARAMETER)?;
    let system = state.get_mut(target).ok_or(INVALID_PARAMETER)?;
    if system.properties.get_str("Caption") != Some(classes::VIRTUAL_MACHINE_CAPTION) {
        return Err(NOT_SUPPORTED);
    }
    let current = system.properties.get_u64("EnabledState").unwrap_or(DISABLED);
    let next = match requested {
        2 if current == ENABLED => return Err(INVALID_STATE),
        2 | 32777 => ENABLED,
        3 | 4 if current == DISABLED => return Err(INVALID_STATE),
        3 | 4 => DISABLED,
        6 => SAVED,
        10 | 11 if current != ENABLED => return Err(INVALID_STATE),
        10 | 11 => ENABLED,
        32776 => PAUSED,
        _ => return Err(INVALID_PARAMETER),
    };
    system.properties.insert("EnabledState".into(), next.into());
    Ok(PropertyMap::new())
}
