//! Management sessions against a host's virtualization namespace.

use crate::error::{MgmtError, Result};
use crate::handle::{ObjectPath, RemoteObjectHandle, SessionId};
use crate::query::Query;
use crate::transport::{Connection, ManagementTransport, RawInstance, TransportError};
use crate::value::{Properties, PropertyMap, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};

pub const VIRTUALIZATION_NAMESPACE: &str = "root\\virtualization\\v2";

/// Well-known singleton services of the virtualization namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceRole {
    VirtualSystemManagement,
    ImageManagement,
    SwitchManagement,
    Security,
}

impl ServiceRole {
    pub const ALL: [ServiceRole; 4] = [
        ServiceRole::VirtualSystemManagement,
        ServiceRole::ImageManagement,
        ServiceRole::SwitchManagement,
        ServiceRole::Security,
    ];

    pub fn class_name(&self) -> &'static str {
        match self {
            ServiceRole::VirtualSystemManagement => "Msvm_VirtualSystemManagementService",
            ServiceRole::ImageManagement => "Msvm_ImageManagementService",
            ServiceRole::SwitchManagement => "Msvm_VirtualEthernetSwitchManagementService",
            ServiceRole::Security => "Msvm_SecurityService",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceRole::VirtualSystemManagement => "virtual system management service",
            ServiceRole::ImageManagement => "image management service",
            ServiceRole::SwitchManagement => "virtual ethernet switch management service",
            ServiceRole::Security => "security service",
        };
        f.write_str(name)
    }
}

/// An instance bound to the session that fetched it.
#[derive(Debug, Clone)]
pub struct Instance {
    handle: RemoteObjectHandle,
    class: String,
    properties: PropertyMap,
}

impl Instance {
    pub fn handle(&self) -> &RemoteObjectHandle {
        &self.handle
    }

    pub fn path(&self) -> &ObjectPath {
        self.handle.path()
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

impl Properties for Instance {
    fn value(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A connection to one namespace on one host.
///
/// Handles produced by a session are only accepted by that same session.
pub struct ManagementSession {
    id: SessionId,
    host: String,
    target: String,
    namespace: String,
    conn: Option<Box<dyn Connection>>,
    services: Mutex<HashMap<ServiceRole, ObjectPath>>,
}

impl ManagementSession {
    /// Open a session to the virtualization namespace. An empty host means the local machine.
    pub async fn open(transport: &dyn ManagementTransport, host: &str) -> Result<Self> {
        Self::open_namespace(transport, host, VIRTUALIZATION_NAMESPACE).await
    }

    pub async fn open_namespace(transport: &dyn ManagementTransport, host: &str, namespace: &str) -> Result<Self> {
        let (wire_host, display_host) = resolve_host(host);
        let conn = transport
            .connect(&wire_host, namespace)
            .await
            .map_err(|source| MgmtError::Connection {
                host: display_host.clone(),
                namespace: namespace.to_string(),
                source,
            })?;

        let id = SessionId::next();
        debug!(session = %id, host = %display_host, namespace, "Opened management session");

        Ok(Self {
            id,
            host: display_host,
            target: wire_host,
            namespace: namespace.to_string(),
            conn: Some(conn),
            services: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host name as sent to the transport; `.` for the local machine.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Resolve the handle of a well-known service, memoized for the life of the session.
    pub async fn service(&self, role: ServiceRole) -> Result<RemoteObjectHandle> {
        if let Some(path) = self.cached_service(role) {
            return Ok(self.adopt(path));
        }

        let conn = self.connection()?;
        let not_found = |reason: String| MgmtError::NotFound {
            host: self.host.clone(),
            role,
            reason,
        };
        let found = conn
            .query(&Query::all(role.class_name()))
            .await
            .map_err(|e| not_found(e.to_string()))?;
        let instance = found
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("no instance of {}", role.class_name())))?;

        if let Ok(mut services) = self.services.lock() {
            services.insert(role, instance.path.clone());
        }
        debug!(session = %self.id, %role, path = %instance.path, "Resolved service");
        Ok(self.adopt(instance.path))
    }

    fn cached_service(&self, role: ServiceRole) -> Option<ObjectPath> {
        self.services.lock().ok().and_then(|services| services.get(&role).cloned())
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Instance>> {
        let conn = self.connection()?;
        let raw = conn.query(query).await.map_err(|source| MgmtError::Query {
            query: query.to_wql(),
            source,
        })?;
        Ok(raw.into_iter().map(|r| self.bind(r)).collect())
    }

    /// Re-fetch the current state of an object; `None` when it no longer exists.
    pub async fn get(&self, handle: &RemoteObjectHandle) -> Result<Option<Instance>> {
        self.check_handle(handle, "get")?;
        let conn = self.connection()?;
        let raw = conn.get(handle.path()).await.map_err(|source| MgmtError::Query {
            query: format!("GET {}", handle.path()),
            source,
        })?;
        Ok(raw.map(|r| self.bind(r)))
    }

    /// Send a method with an already encoded parameter map.
    pub async fn invoke_raw(&self, target: &RemoteObjectHandle, method: &str, params: PropertyMap) -> Result<PropertyMap> {
        self.check_handle(target, method)?;
        let conn = self.connection()?;
        conn.invoke(target.path(), method, params)
            .await
            .map_err(|e: TransportError| MgmtError::Invocation {
                method: method.to_string(),
                reason: e.to_string(),
            })
    }

    /// Bind a path returned by a method (or read from a property) to this session.
    pub fn adopt(&self, path: ObjectPath) -> RemoteObjectHandle {
        RemoteObjectHandle::new(path, &self.namespace, self.id)
    }

    /// Release the connection. Closing twice is a no-op.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
            if let Ok(mut services) = self.services.lock() {
                services.clear();
            }
            info!(session = %self.id, host = %self.host, "Closed management session");
        }
    }

    fn connection(&self) -> Result<&dyn Connection> {
        self.conn.as_deref().ok_or_else(|| MgmtError::SessionClosed {
            host: self.host.clone(),
        })
    }

    fn check_handle(&self, handle: &RemoteObjectHandle, method: &str) -> Result<()> {
        if handle.session() != self.id {
            return Err(MgmtError::Invocation {
                method: method.to_string(),
                reason: format!("handle {} belongs to {}, not {}", handle.path(), handle.session(), self.id),
            });
        }
        Ok(())
    }

    fn bind(&self, raw: RawInstance) -> Instance {
        Instance {
            handle: self.adopt(raw.path),
            class: raw.class,
            properties: raw.properties,
        }
    }
}

impl fmt::Debug for ManagementSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementSession")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("namespace", &self.namespace)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Returns (host as sent on the wire, host as shown in logs and errors).
fn resolve_host(host: &str) -> (String, String) {
    let host = host.trim();
    if host.is_empty() || host == "." || host.eq_ignore_ascii_case("localhost") {
        let local = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        (".".to_string(), local)
    } else {
        (host.to_string(), host.to_string())
    }
}
