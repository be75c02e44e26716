//! Job tracking: turning a method result into success or failure.
//!
//! A method either completes synchronously (return code 0), starts a job
//! (4096) that is polled until it reaches a terminal state, or fails with a
//! code from the management error table.

use crate::error::{MgmtError, Result};
use crate::handle::RemoteObjectHandle;
use crate::invoke::{self, MethodCallResult, RETURN_COMPLETED, RETURN_JOB_STARTED};
use crate::method::RemoteMethod;
use crate::session::ManagementSession;
use crate::value::{Properties, PropertyMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// State of a `Msvm_ConcreteJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum JobState {
    New,
    Starting,
    Running,
    Suspended,
    ShuttingDown,
    Completed,
    Terminated,
    Killed,
    Exception,
    CompletedWithWarnings,
    Other(u16),
}

impl JobState {
    /// The job will not change state again.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::CompletedWithWarnings
                | JobState::Terminated
                | JobState::Killed
                | JobState::Exception
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, JobState::Completed | JobState::CompletedWithWarnings)
    }
}

impl From<u16> for JobState {
    fn from(code: u16) -> Self {
        match code {
            2 => JobState::New,
            3 => JobState::Starting,
            4 => JobState::Running,
            5 => JobState::Suspended,
            6 => JobState::ShuttingDown,
            7 => JobState::Completed,
            8 => JobState::Terminated,
            9 => JobState::Killed,
            10 => JobState::Exception,
            32768 => JobState::CompletedWithWarnings,
            other => JobState::Other(other),
        }
    }
}

impl From<JobState> for u16 {
    fn from(state: JobState) -> Self {
        match state {
            JobState::New => 2,
            JobState::Starting => 3,
            JobState::Running => 4,
            JobState::Suspended => 5,
            JobState::ShuttingDown => 6,
            JobState::Completed => 7,
            JobState::Terminated => 8,
            JobState::Killed => 9,
            JobState::Exception => 10,
            JobState::CompletedWithWarnings => 32768,
            JobState::Other(code) => code,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Other(code) => write!(f, "Unknown({code})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Meaning of a method return code.
pub fn error_code_meaning(code: u32) -> &'static str {
    match code {
        0 => "Completed with No Error.",
        1 => "Not Supported.",
        2 => "Failed.",
        3 => "Timeout.",
        4 => "Invalid Parameter.",
        5 => "Invalid State.",
        6 => "Invalid Type.",
        4096 => "Method Parameters Checked - Job Started.",
        32768 => "Failed.",
        32769 => "Access Denied.",
        32770 => "Not Supported.",
        32771 => "Status is Unknown.",
        32772 => "Timeout.",
        32773 => "Invalid Parameter.",
        32774 => "System is In Use.",
        32775 => "Invalid State for this Operation.",
        32776 => "Incorrect Data Type.",
        32777 => "System is Not Available.",
        32778 => "Out of Memory.",
        _ => "The Method Failed. The Reason is Unknown.",
    }
}

/// Follows method results to completion.
#[derive(Debug, Clone)]
pub struct JobTracker {
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

impl JobTracker {
    /// Without `max_wait`, polling only stops at a terminal state or on cancellation.
    pub fn new(poll_interval: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    /// Invoke `method` on `target` and wait for it to finish.
    pub async fn call<M: RemoteMethod>(
        &self,
        session: &ManagementSession,
        target: &RemoteObjectHandle,
        method: &M,
        cancel: &CancellationToken,
    ) -> Result<PropertyMap> {
        let result = invoke::invoke(session, target, method).await?;
        self.resolve(session, result, cancel).await
    }

    /// Resolve a method result into its outputs or an error.
    pub async fn resolve(
        &self,
        session: &ManagementSession,
        result: MethodCallResult,
        cancel: &CancellationToken,
    ) -> Result<PropertyMap> {
        match result.return_code {
            RETURN_COMPLETED => Ok(result.outputs),
            RETURN_JOB_STARTED => self.wait(session, result, cancel).await,
            code => Err(MgmtError::JobFailure {
                method: result.method,
                code: Some(code),
                state: None,
                detail: error_code_meaning(code).to_string(),
            }),
        }
    }

    async fn wait(
        &self,
        session: &ManagementSession,
        result: MethodCallResult,
        cancel: &CancellationToken,
    ) -> Result<PropertyMap> {
        let method = result.method;
        let Some(job) = result.job else {
            return Err(MgmtError::Invocation {
                method,
                reason: "job started but no job reference was returned".to_string(),
            });
        };

        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            // Always re-fetch; job objects are never cached.
            let instance = session.get(&job).await?.ok_or_else(|| MgmtError::Invocation {
                method: method.clone(),
                reason: format!("job {} no longer exists", job.path()),
            })?;
            polls += 1;

            let state = instance
                .get_u64("JobState")
                .and_then(|v| u16::try_from(v).ok())
                .map(JobState::from)
                .ok_or_else(|| MgmtError::Invocation {
                    method: method.clone(),
                    reason: format!("job {} has no JobState", job.path()),
                })?;

            if state.is_complete() {
                if state.is_successful() {
                    debug!(method = %method, polls, %state, "Job completed");
                    return Ok(result.outputs);
                }
                let detail = match instance.get_str("ErrorDescription") {
                    Some(description) if !description.trim().is_empty() => description.to_string(),
                    _ => format!("job ended in state {state}"),
                };
                warn!(method = %method, polls, %state, detail = %detail, "Job failed");
                return Err(MgmtError::JobFailure {
                    method,
                    code: None,
                    state: Some(state),
                    detail,
                });
            }

            let elapsed = started.elapsed();
            let sleep = match self.max_wait {
                Some(max) if elapsed >= max => {
                    return Err(MgmtError::PollTimeout { method, waited: elapsed });
                }
                Some(max) => self.poll_interval.min(max - elapsed),
                None => self.poll_interval,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(MgmtError::Cancelled { method });
                }
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }
}
