//! Object store of the simulated host. Serializable so it can be persisted between runs.

use crate::classes;
use crate::handle::ObjectPath;
use crate::job::JobState;
use crate::query::Query;
use crate::session::ServiceRole;
use crate::transport::RawInstance;
use crate::value::{EmbeddedObject, Properties, PropertyMap, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

pub const SIM_HOST_NAME: &str = "HV-SIM";
pub const DEFAULT_EXTERNAL_PORT: &str = "Ethernet";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimObject {
    pub class: String,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimJob {
    pub states: VecDeque<JobState>,
    #[serde(default)]
    pub error_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    #[serde(default)]
    pub objects: BTreeMap<ObjectPath, SimObject>,
    #[serde(default)]
    pub jobs: BTreeMap<ObjectPath, SimJob>,
}

impl SimState {
    /// A host with its management services, its own computer system and one physical NIC.
    pub fn seeded() -> Self {
        let mut state = SimState::default();
        let service_names = [
            (ServiceRole::VirtualSystemManagement, "vmms"),
            (ServiceRole::ImageManagement, "vhdsvc"),
            (ServiceRole::SwitchManagement, "nvspwmi"),
            (ServiceRole::Security, "securitysvc"),
        ];
        for (role, name) in service_names {
            state.insert(
                ObjectPath::keyed(role.class_name(), "Name", name),
                role.class_name(),
                props([("Name", name.into()), ("SystemName", SIM_HOST_NAME.into())]),
            );
        }
        state.insert(
            ObjectPath::keyed(classes::COMPUTER_SYSTEM, "Name", SIM_HOST_NAME),
            classes::COMPUTER_SYSTEM,
            props([
                ("Name", SIM_HOST_NAME.into()),
                ("ElementName", SIM_HOST_NAME.into()),
                ("Caption", classes::HOST_CAPTION.into()),
                ("EnabledState", 2u16.into()),
            ]),
        );
        state.add_external_port(DEFAULT_EXTERNAL_PORT);
        state
    }

    pub fn add_external_port(&mut self, name: &str) -> ObjectPath {
        let device_id = format!("Microsoft:{}", Uuid::new_v4().to_string().to_uppercase());
        let path = ObjectPath::keyed(classes::EXTERNAL_ETHERNET_PORT, "DeviceID", &device_id);
        self.insert(
            path.clone(),
            classes::EXTERNAL_ETHERNET_PORT,
            props([
                ("DeviceID", device_id.into()),
                ("ElementName", name.into()),
                ("Name", name.into()),
            ]),
        );
        path
    }

    /// A plain file on the host, e.g. an ISO or an existing disk image.
    pub fn add_file(&mut self, name: &str, size: u64) -> ObjectPath {
        let path = ObjectPath::keyed(classes::DATA_FILE, "Name", name);
        self.insert(
            path.clone(),
            classes::DATA_FILE,
            props([("Name", name.into()), ("FileSize", size.into())]),
        );
        path
    }

    pub fn insert(&mut self, path: ObjectPath, class: &str, properties: PropertyMap) {
        self.objects.insert(
            path,
            SimObject {
                class: class.to_string(),
                properties,
            },
        );
    }

    pub fn get(&self, path: &ObjectPath) -> Option<&SimObject> {
        self.objects.get(path)
    }

    pub fn get_mut(&mut self, path: &ObjectPath) -> Option<&mut SimObject> {
        self.objects.get_mut(path)
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.objects.contains_key(path)
    }

    pub fn remove(&mut self, path: &ObjectPath) -> Option<SimObject> {
        self.objects.remove(path)
    }

    pub fn query(&self, query: &Query) -> Vec<RawInstance> {
        self.objects
            .iter()
            .filter(|(_, obj)| obj.class == query.class && query.matches(&obj.properties))
            .map(|(path, obj)| raw(path, obj))
            .collect()
    }

    pub fn instance(&self, path: &ObjectPath) -> Option<RawInstance> {
        self.objects.get(path).map(|obj| raw(path, obj))
    }

    /// Store a setting object as a child of the configuration whose InstanceID is `parent_id`.
    pub fn add_child(&mut self, parent_id: &str, obj: EmbeddedObject) -> ObjectPath {
        let instance_id = format!("{parent_id}\\{}", Uuid::new_v4().to_string().to_uppercase());
        let path = ObjectPath::keyed(&obj.class, "InstanceID", &instance_id);
        let mut properties = obj.properties;
        properties.insert("InstanceID".into(), instance_id.into());
        self.insert(path.clone(), &obj.class, properties);
        path
    }

    /// Paths of objects whose InstanceID is nested below `instance_id`.
    pub fn descendants(&self, instance_id: &str) -> Vec<ObjectPath> {
        let prefix = format!("{instance_id}\\");
        self.objects
            .iter()
            .filter(|(_, obj)| obj.properties.get_str("InstanceID").is_some_and(|id| id.starts_with(&prefix)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn add_job(&mut self, states: Vec<JobState>, error_description: &str) -> ObjectPath {
        let id = Uuid::new_v4().to_string().to_uppercase();
        let path = ObjectPath::keyed(classes::CONCRETE_JOB, "InstanceID", &id);
        self.jobs.insert(
            path.clone(),
            SimJob {
                states: states.into(),
                error_description: error_description.to_string(),
            },
        );
        path
    }

    pub fn is_job(&self, path: &ObjectPath) -> bool {
        self.jobs.contains_key(path)
    }

    /// Current view of a job; each fetch advances the script until its last state.
    pub fn poll_job(&mut self, path: &ObjectPath) -> Option<RawInstance> {
        let job = self.jobs.get_mut(path)?;
        let state = if job.states.len() > 1 {
            job.states.pop_front()
        } else {
            job.states.front().copied()
        }
        .unwrap_or(JobState::Completed);

        let mut properties = props([
            ("JobState", u16::from(state).into()),
            ("InstanceID", path.as_str().into()),
        ]);
        if state.is_complete() && !state.is_successful() {
            properties.insert("ErrorDescription".into(), job.error_description.clone().into());
        }
        Some(RawInstance {
            path: path.clone(),
            class: classes::CONCRETE_JOB.to_string(),
            properties,
        })
    }
}

pub(crate) fn props<const N: usize>(entries: [(&str, Value); N]) -> PropertyMap {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn raw(path: &ObjectPath, obj: &SimObject) -> RawInstance {
    RawInstance {
        path: path.clone(),
        class: obj.class.clone(),
        properties: obj.properties.clone(),
    }
}
