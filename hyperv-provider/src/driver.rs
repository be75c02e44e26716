//! Entry point for reconciliation calls.
//!
//! Callers pass JSON documents; the driver decodes them into the descriptor of
//! the requested kind, runs the matching reconciler and encodes the observed
//! state back to JSON.

use std::sync::Arc;

use hyperv_mgmt::ManagementTransport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::audit::ProviderAuditLogger;
use crate::config::ProviderConfig;
use crate::context::ReconcileContext;
use crate::error::{ReconcileError, Result};
use crate::reconciler::{
    MachineReconciler, NetworkAdapterReconciler, Reconciler, VhdFileReconciler, VirtualSwitchReconciler,
};
use crate::resources::ResourceKind;

/// Identity and observed state of a reconciled resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub identity: String,
    pub state: serde_json::Value,
}

pub struct ReconciliationDriver {
    ctx: ReconcileContext,
}

impl ReconciliationDriver {
    pub fn new(config: &ProviderConfig, transport: Arc<dyn ManagementTransport>, audit: Arc<ProviderAuditLogger>) -> Self {
        let sessions = config.session_provider(transport);
        Self::from_context(ReconcileContext::new(
            config.host.clone(),
            sessions,
            config.job_tracker(),
            audit,
        ))
    }

    pub fn from_context(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    fn call_context(&self, cancel: &CancellationToken) -> ReconcileContext {
        self.ctx.clone().with_cancel(cancel.clone())
    }

    pub async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        desired: serde_json::Value,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationOutcome> {
        let ctx = self.call_context(cancel);
        match kind {
            ResourceKind::Machine => create_with(&MachineReconciler, &ctx, name, desired, dry_run).await,
            ResourceKind::VhdFile => create_with(&VhdFileReconciler, &ctx, name, desired, dry_run).await,
            ResourceKind::VirtualSwitch => create_with(&VirtualSwitchReconciler, &ctx, name, desired, dry_run).await,
            ResourceKind::NetworkAdapter => create_with(&NetworkAdapterReconciler, &ctx, name, desired, dry_run).await,
        }
    }

    /// `desired` may be omitted when the caller only knows the identity.
    pub async fn read(
        &self,
        kind: ResourceKind,
        id: &str,
        desired: Option<serde_json::Value>,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationOutcome> {
        let ctx = self.call_context(cancel);
        let desired = desired.unwrap_or_else(empty_document);
        match kind {
            ResourceKind::Machine => read_with(&MachineReconciler, &ctx, id, desired, dry_run).await,
            ResourceKind::VhdFile => read_with(&VhdFileReconciler, &ctx, id, desired, dry_run).await,
            ResourceKind::VirtualSwitch => read_with(&VirtualSwitchReconciler, &ctx, id, desired, dry_run).await,
            ResourceKind::NetworkAdapter => read_with(&NetworkAdapterReconciler, &ctx, id, desired, dry_run).await,
        }
    }

    pub async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        previous: serde_json::Value,
        desired: serde_json::Value,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationOutcome> {
        let ctx = self.call_context(cancel);
        match kind {
            ResourceKind::Machine => update_with(&MachineReconciler, &ctx, id, previous, desired, dry_run).await,
            ResourceKind::VhdFile => update_with(&VhdFileReconciler, &ctx, id, previous, desired, dry_run).await,
            ResourceKind::VirtualSwitch => {
                update_with(&VirtualSwitchReconciler, &ctx, id, previous, desired, dry_run).await
            }
            ResourceKind::NetworkAdapter => {
                update_with(&NetworkAdapterReconciler, &ctx, id, previous, desired, dry_run).await
            }
        }
    }

    pub async fn delete(
        &self,
        kind: ResourceKind,
        id: &str,
        observed: Option<serde_json::Value>,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ctx = self.call_context(cancel);
        let observed = observed.unwrap_or_else(empty_document);
        match kind {
            ResourceKind::Machine => delete_with(&MachineReconciler, &ctx, id, observed, dry_run).await,
            ResourceKind::VhdFile => delete_with(&VhdFileReconciler, &ctx, id, observed, dry_run).await,
            ResourceKind::VirtualSwitch => delete_with(&VirtualSwitchReconciler, &ctx, id, observed, dry_run).await,
            ResourceKind::NetworkAdapter => delete_with(&NetworkAdapterReconciler, &ctx, id, observed, dry_run).await,
        }
    }
}

fn empty_document() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn decode<T: DeserializeOwned>(kind: ResourceKind, document: serde_json::Value) -> Result<T> {
    serde_json::from_value(document).map_err(|source| ReconcileError::Document { kind, source })
}

fn outcome<T: Serialize>(kind: ResourceKind, identity: String, state: &T) -> Result<ReconciliationOutcome> {
    let state = serde_json::to_value(state).map_err(|source| ReconcileError::Document { kind, source })?;
    Ok(ReconciliationOutcome { identity, state })
}

async fn create_with<R: Reconciler>(
    reconciler: &R,
    ctx: &ReconcileContext,
    name: &str,
    desired: serde_json::Value,
    dry_run: bool,
) -> Result<ReconciliationOutcome> {
    let inputs: R::Inputs = decode(R::KIND, desired)?;
    let (identity, outputs) = reconciler
        .create(ctx, name, &inputs, dry_run)
        .await
        .inspect_err(|e| {
            let id = reconciler.identity(&inputs, name);
            ctx.audit().operation_failed(R::KIND, &id, "create", e)
        })?;
    outcome(R::KIND, identity, &outputs)
}

async fn read_with<R: Reconciler>(
    reconciler: &R,
    ctx: &ReconcileContext,
    id: &str,
    desired: serde_json::Value,
    dry_run: bool,
) -> Result<ReconciliationOutcome> {
    let inputs: R::Inputs = decode(R::KIND, desired)?;
    let (identity, outputs) = reconciler.read(ctx, id, &inputs, dry_run).await?;
    outcome(R::KIND, identity, &outputs)
}

async fn update_with<R: Reconciler>(
    reconciler: &R,
    ctx: &ReconcileContext,
    id: &str,
    previous: serde_json::Value,
    desired: serde_json::Value,
    dry_run: bool,
) -> Result<ReconciliationOutcome> {
    let olds: R::Outputs = decode(R::KIND, previous)?;
    let news: R::Inputs = decode(R::KIND, desired)?;
    let outputs = reconciler
        .update(ctx, id, &olds, &news, dry_run)
        .await
        .inspect_err(|e| ctx.audit().operation_failed(R::KIND, id, "update", e))?;
    outcome(R::KIND, id.to_string(), &outputs)
}

async fn delete_with<R: Reconciler>(
    reconciler: &R,
    ctx: &ReconcileContext,
    id: &str,
    observed: serde_json::Value,
    dry_run: bool,
) -> Result<()> {
    let outputs: R::Outputs = decode(R::KIND, observed)?;
    reconciler
        .delete(ctx, id, &outputs, dry_run)
        .await
        .inspect_err(|e| ctx.audit().operation_failed(R::KIND, id, "delete", e))
}
