//! Error types for management sessions and method calls.

use crate::job::JobState;
use crate::session::ServiceRole;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by sessions, the method invoker and the job tracker.
#[derive(Debug, Clone, Error)]
pub enum MgmtError {
    #[error("failed to connect to {namespace} on {host}: {source}")]
    Connection {
        host: String,
        namespace: String,
        #[source]
        source: TransportError,
    },

    #[error("{role} not available on {host}: {reason}")]
    NotFound {
        host: String,
        role: ServiceRole,
        reason: String,
    },

    #[error("query `{query}` failed: {source}")]
    Query {
        query: String,
        #[source]
        source: TransportError,
    },

    #[error("{method} could not be invoked: {reason}")]
    Invocation { method: String, reason: String },

    #[error("{method} failed{}: {detail}", code_suffix(.code))]
    JobFailure {
        method: String,
        code: Option<u32>,
        state: Option<JobState>,
        detail: String,
    },

    #[error("{method} did not complete within {waited:?}")]
    PollTimeout { method: String, waited: Duration },

    #[error("{method} was cancelled while waiting for its job")]
    Cancelled { method: String },

    #[error("session to {host} is closed")]
    SessionClosed { host: String },
}

impl MgmtError {
    /// The remote operation itself ran and reported failure.
    pub fn is_job_failure(&self) -> bool {
        matches!(self, MgmtError::JobFailure { .. })
    }

    /// The host, namespace or a required service could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            MgmtError::Connection { .. } | MgmtError::NotFound { .. } | MgmtError::SessionClosed { .. }
        )
    }
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(" (return code {c})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, MgmtError>;
