//! Object paths and session-bound handles to remote objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Instance path of a remote object, e.g. `Msvm_ComputerSystem.Name="4F0A..."`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path of an instance identified by a single key property.
    pub fn keyed(class: &str, key: &str, value: &str) -> Self {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        Self(format!("{class}.{key}=\"{escaped}\""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Class part of the path, with any namespace prefix stripped.
    pub fn class(&self) -> &str {
        // Colons after the first '=' belong to key values.
        let head = self.0.split_once('=').map_or(self.0.as_str(), |(head, _)| head);
        let local = head.rsplit_once(':').map_or(head, |(_, rest)| rest);
        local.split_once('.').map_or(local, |(class, _)| class)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one open management session within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Reference to a remote object, valid only within the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectHandle {
    path: ObjectPath,
    namespace: String,
    session: SessionId,
}

impl RemoteObjectHandle {
    pub(crate) fn new(path: ObjectPath, namespace: &str, session: SessionId) -> Self {
        Self {
            path,
            namespace: namespace.to_string(),
            session,
        }
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl fmt::Display for RemoteObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_path_escapes_value() {
        let path = ObjectPath::keyed("CIM_DataFile", "Name", "C:\\vms\\a.vhdx");
        assert_eq!(path.as_str(), "CIM_DataFile.Name=\"C:\\\\vms\\\\a.vhdx\"");
        assert_eq!(path.class(), "CIM_DataFile");
    }

    #[test]
    fn test_class_strips_namespace() {
        let path = ObjectPath::new("root\\virtualization\\v2:Msvm_ConcreteJob.InstanceID=\"x\"");
        assert_eq!(path.class(), "Msvm_ConcreteJob");

        let path = ObjectPath::new("Msvm_VirtualSystemSettingData.InstanceID=\"Microsoft:1234\"");
        assert_eq!(path.class(), "Msvm_VirtualSystemSettingData");

        let path = ObjectPath::new("root\\virtualization\\v2:Msvm_MemorySettingData.InstanceID=\"Microsoft:1\\2\"");
        assert_eq!(path.class(), "Msvm_MemorySettingData");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::next(), SessionId::next());
    }
}
