//! Reconcilers for the managed resource kinds.
//!
//! Each reconciler converges one remote object (and, for machines, its
//! sub-resources) toward a declared descriptor. Every operation follows the
//! same shape: honour dry-run without touching the host, open a session,
//! probe, act, release the session.

pub mod machine;
pub mod network_adapter;
pub mod vhd_file;
pub mod virtual_switch;

pub use machine::MachineReconciler;
pub use network_adapter::NetworkAdapterReconciler;
pub use vhd_file::VhdFileReconciler;
pub use virtual_switch::VirtualSwitchReconciler;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::context::{ReconcileContext, RemoteScope};
use crate::error::Result;
use crate::resources::ResourceKind;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    const KIND: ResourceKind;

    /// The declared (desired) descriptor.
    type Inputs: DeserializeOwned + Serialize + Send + Sync;
    /// The observed descriptor reported back to the caller.
    type Outputs: DeserializeOwned + Serialize + Send + Sync;

    /// Stable identity: the descriptor's own name when set, else `fallback`.
    fn identity(&self, inputs: &Self::Inputs, fallback: &str) -> String;

    /// Create the resource unless it already exists.
    async fn create(
        &self,
        ctx: &ReconcileContext,
        name: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)>;

    /// Observe the resource. A resource that no longer exists reads as the declared view.
    async fn read(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        inputs: &Self::Inputs,
        dry_run: bool,
    ) -> Result<(String, Self::Outputs)>;

    /// Apply the difference between the previous outputs and the new inputs.
    async fn update(
        &self,
        ctx: &ReconcileContext,
        id: &str,
        olds: &Self::Outputs,
        news: &Self::Inputs,
        dry_run: bool,
    ) -> Result<Self::Outputs>;

    /// Remove the resource. Deleting something absent succeeds.
    async fn delete(&self, ctx: &ReconcileContext, id: &str, outputs: &Self::Outputs, dry_run: bool) -> Result<()>;
}

/// Whether a failing sub-resource aborts the surrounding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubResourcePolicy {
    /// Log the failure and continue with the next sub-resource.
    Skip,
    Abort,
}

/// Apply `policy` to the result of one sub-resource step.
///
/// Skipped failures are reported as audit warnings against the scope's resource.
pub(crate) fn settle<T>(
    scope: &RemoteScope<'_>,
    policy: SubResourcePolicy,
    sub_resource: &str,
    result: Result<T>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if policy == SubResourcePolicy::Skip => {
            scope.audit().sub_resource_skipped(scope.kind(), scope.id(), sub_resource, &e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Names of the settings groups that differ, in the order they are applied.
#[derive(Debug, Default)]
pub(crate) struct Changes(Vec<&'static str>);

impl Changes {
    pub(crate) fn mark(&mut self, group: &'static str, changed: bool) {
        if changed {
            self.0.push(group);
        }
    }

    pub(crate) fn has(&self, group: &str) -> bool {
        self.0.contains(&group)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn groups(&self) -> &[&'static str] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_keep_order() {
        let mut changes = Changes::default();
        changes.mark("memory", true);
        changes.mark("processor", false);
        changes.mark("system", true);
        assert!(changes.has("memory"));
        assert!(!changes.has("processor"));
        assert_eq!(changes.groups(), &["memory", "system"]);
    }
}
