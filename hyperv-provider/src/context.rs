//! Per-call reconciliation context.

use std::sync::Arc;

use hyperv_mgmt::{
    Instance, JobTracker, ManagementSession, MgmtError, ObjectPath, Properties, PropertyMap, Query, RemoteMethod,
    RemoteObjectHandle, ServiceRole, SessionProvider, probe,
};
use tokio_util::sync::CancellationToken;

use crate::audit::ProviderAuditLogger;
use crate::error::{ReconcileError, Result};
use crate::resources::ResourceKind;

/// Everything a reconciler needs for one call: where sessions come from, how
/// jobs are waited for, where audit events go and when to give up.
#[derive(Clone)]
pub struct ReconcileContext {
    host: String,
    sessions: Arc<dyn SessionProvider>,
    tracker: JobTracker,
    audit: Arc<ProviderAuditLogger>,
    cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(
        host: impl Into<String>,
        sessions: Arc<dyn SessionProvider>,
        tracker: JobTracker,
        audit: Arc<ProviderAuditLogger>,
    ) -> Self {
        Self {
            host: host.into(),
            sessions,
            tracker,
            audit,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn audit(&self) -> &ProviderAuditLogger {
        &self.audit
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Acquire a session for the resource `id`.
    pub async fn open(&self, kind: ResourceKind, id: &str) -> Result<ManagementSession> {
        self.sessions.acquire(&self.host).await.map_err(|source| ReconcileError::Remote {
            kind,
            id: id.to_string(),
            source,
        })
    }

    pub async fn close(&self, session: ManagementSession) {
        self.sessions.release(session).await;
    }

    pub fn scope<'a>(&'a self, session: &'a ManagementSession, kind: ResourceKind, id: &'a str) -> RemoteScope<'a> {
        RemoteScope {
            ctx: self,
            session,
            kind,
            id,
        }
    }
}

/// A session bound to the resource being reconciled, so every failure is
/// reported against that resource.
pub struct RemoteScope<'a> {
    ctx: &'a ReconcileContext,
    session: &'a ManagementSession,
    kind: ResourceKind,
    id: &'a str,
}

impl<'a> RemoteScope<'a> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn audit(&self) -> &'a ProviderAuditLogger {
        &self.ctx.audit
    }

    pub fn remote(&self, source: MgmtError) -> ReconcileError {
        ReconcileError::Remote {
            kind: self.kind,
            id: self.id.to_string(),
            source,
        }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> ReconcileError {
        ReconcileError::InvalidInput {
            kind: self.kind,
            id: self.id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unexpected(&self, method: &'static str, reason: impl Into<String>) -> ReconcileError {
        ReconcileError::UnexpectedResponse {
            kind: self.kind,
            id: self.id.to_string(),
            method,
            reason: reason.into(),
        }
    }

    pub fn missing(&self) -> ReconcileError {
        ReconcileError::Missing {
            kind: self.kind,
            id: self.id.to_string(),
        }
    }

    pub async fn service(&self, role: ServiceRole) -> Result<RemoteObjectHandle> {
        self.session.service(role).await.map_err(|e| self.remote(e))
    }

    /// Invoke `method` on `target` and wait for any job it starts.
    pub async fn call<M: RemoteMethod>(&self, target: &RemoteObjectHandle, method: &M) -> Result<PropertyMap> {
        self.ctx
            .tracker
            .call(self.session, target, method, &self.ctx.cancel)
            .await
            .map_err(|e| self.remote(e))
    }

    /// First path of an output parameter holding one or more references.
    pub fn resulting(&self, outputs: &PropertyMap, key: &str, method: &'static str) -> Result<ObjectPath> {
        outputs
            .get_paths(key)
            .into_iter()
            .next()
            .ok_or_else(|| self.unexpected(method, format!("no {key} in result")))
    }

    pub async fn exists(&self, query: &Query) -> Result<bool> {
        probe::exists(self.session, query).await.map_err(|e| self.remote(e))
    }

    pub async fn find(&self, query: &Query) -> Result<Option<Instance>> {
        probe::find(self.session, query).await.map_err(|e| self.remote(e))
    }

    pub async fn find_all(&self, query: &Query) -> Result<Vec<Instance>> {
        probe::find_all(self.session, query).await.map_err(|e| self.remote(e))
    }

    pub async fn get(&self, path: ObjectPath) -> Result<Option<Instance>> {
        let handle = self.session.adopt(path);
        self.session.get(&handle).await.map_err(|e| self.remote(e))
    }
}
