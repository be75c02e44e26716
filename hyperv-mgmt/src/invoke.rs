//! Method invocation and interpretation of the raw result map.

use crate::error::{MgmtError, Result};
use crate::handle::RemoteObjectHandle;
use crate::method::RemoteMethod;
use crate::session::ManagementSession;
use crate::value::{Properties, PropertyMap};
use tracing::debug;

/// Return code for a method that completed synchronously.
pub const RETURN_COMPLETED: u32 = 0;
/// Return code for a method that started an asynchronous job.
pub const RETURN_JOB_STARTED: u32 = 4096;

/// Outcome of a single remote method call, before any job is followed.
#[derive(Debug, Clone)]
pub struct MethodCallResult {
    pub method: String,
    pub return_code: u32,
    pub job: Option<RemoteObjectHandle>,
    pub outputs: PropertyMap,
}

impl MethodCallResult {
    /// Interpret the output parameters of `method` as returned by the transport.
    pub fn from_outputs(session: &ManagementSession, method: &str, mut outputs: PropertyMap) -> Result<Self> {
        let return_code = outputs
            .remove("ReturnValue")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MgmtError::Invocation {
                method: method.to_string(),
                reason: "result has no ReturnValue".to_string(),
            })?;
        let job = outputs.get_path("Job").map(|path| session.adopt(path));
        outputs.remove("Job");

        Ok(Self {
            method: method.to_string(),
            return_code,
            job,
            outputs,
        })
    }

    pub fn started_job(&self) -> bool {
        self.return_code == RETURN_JOB_STARTED
    }
}

/// Send `method` to `target` and return the uninterpreted result.
pub async fn invoke<M: RemoteMethod>(
    session: &ManagementSession,
    target: &RemoteObjectHandle,
    method: &M,
) -> Result<MethodCallResult> {
    debug!(session = %session.id(), method = M::NAME, target = %target.path(), "Invoking method");
    let outputs = session.invoke_raw(target, M::NAME, method.encode()).await?;
    MethodCallResult::from_outputs(session, M::NAME, outputs)
}
