//! Transport seam between sessions and the host's management service.
//!
//! The wire protocol is not implemented here; [`crate::sim::SimulatedHost`]
//! provides an in-process host for tests and offline use.

use crate::handle::ObjectPath;
use crate::query::Query;
use crate::value::PropertyMap;
use async_trait::async_trait;
use thiserror::Error;

/// Raw failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("{0}")]
    Failed(String),
}

/// An instance as returned by the transport, before it is bound to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub path: ObjectPath,
    pub class: String,
    pub properties: PropertyMap,
}

/// Opens connections to a namespace on a host.
#[async_trait]
pub trait ManagementTransport: Send + Sync {
    /// `host` is `.` for the local machine.
    async fn connect(&self, host: &str, namespace: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open connection to a namespace.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn query(&self, query: &Query) -> Result<Vec<RawInstance>, TransportError>;

    /// Fetch a single instance by path; `None` when it no longer exists.
    async fn get(&self, path: &ObjectPath) -> Result<Option<RawInstance>, TransportError>;

    /// Execute a method on the object at `target`, returning its output parameters.
    async fn invoke(&self, target: &ObjectPath, method: &str, params: PropertyMap) -> Result<PropertyMap, TransportError>;

    async fn close(&self);
}
