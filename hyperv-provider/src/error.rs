//! Errors returned by reconcilers and the driver.

use crate::resources::ResourceKind;
use hyperv_mgmt::MgmtError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A session, query or remote method failed.
    #[error("{kind} '{id}': {source}")]
    Remote {
        kind: ResourceKind,
        id: String,
        #[source]
        source: MgmtError,
    },

    #[error("{kind} '{id}': {reason}")]
    InvalidInput {
        kind: ResourceKind,
        id: String,
        reason: String,
    },

    #[error("{kind} '{id}': {field} cannot be changed once the resource exists")]
    Immutable {
        kind: ResourceKind,
        id: String,
        field: &'static str,
    },

    #[error("{kind} '{id}' does not exist on the host")]
    Missing { kind: ResourceKind, id: String },

    #[error("{kind} '{id}': {method} returned an unexpected result: {reason}")]
    UnexpectedResponse {
        kind: ResourceKind,
        id: String,
        method: &'static str,
        reason: String,
    },

    #[error("malformed {kind} document: {source}")]
    Document {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ReconcileError::Remote { kind, .. }
            | ReconcileError::InvalidInput { kind, .. }
            | ReconcileError::Immutable { kind, .. }
            | ReconcileError::Missing { kind, .. }
            | ReconcileError::UnexpectedResponse { kind, .. }
            | ReconcileError::Document { kind, .. } => *kind,
        }
    }

    pub fn remote(&self) -> Option<&MgmtError> {
        match self {
            ReconcileError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_message_names_resource_and_method() {
        let err = ReconcileError::Remote {
            kind: ResourceKind::Machine,
            id: "web-01".into(),
            source: MgmtError::JobFailure {
                method: "DefineSystem".into(),
                code: Some(32769),
                state: None,
                detail: "Access Denied.".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "machine 'web-01': DefineSystem failed (return code 32769): Access Denied."
        );
        assert!(err.remote().is_some_and(MgmtError::is_job_failure));
    }
}
