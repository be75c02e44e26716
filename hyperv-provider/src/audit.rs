//! Audit logging for reconciliation events.
//!
//! Events are always emitted through tracing with `target: "audit"`. A
//! recording logger additionally keeps them in memory so callers can inspect
//! what happened during a call, e.g. which sub-resources were skipped.

use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resources::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Audit,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub object_ids: Vec<String>,
}

/// Component-scoped audit logger.
pub struct AuditLogger {
    component: String,
    recorded: Option<Mutex<Vec<AuditEvent>>>,
}

impl AuditLogger {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            recorded: None,
        }
    }

    /// Logger that also keeps every event in memory.
    pub fn recording(component: &str) -> Self {
        Self {
            component: component.to_string(),
            recorded: Some(Mutex::new(Vec::new())),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, object_ids: Vec<String>) {
        let message = message.into();

        match level {
            LogLevel::Error => {
                tracing::error!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Audit | LogLevel::Info => {
                tracing::info!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Debug => {
                tracing::debug!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
        }

        if let Some(recorded) = &self.recorded {
            recorded.lock().unwrap_or_else(PoisonError::into_inner).push(AuditEvent {
                timestamp: Utc::now(),
                level,
                component: self.component.clone(),
                message,
                object_ids,
            });
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.recorded
            .as_ref()
            .map(|r| r.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .unwrap_or_default()
    }
}

/// Audit logger with reconciliation-specific methods.
pub struct ProviderAuditLogger {
    inner: AuditLogger,
}

impl Default for ProviderAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAuditLogger {
    pub fn new() -> Self {
        Self {
            inner: AuditLogger::new("hyperv-provider"),
        }
    }

    pub fn recording() -> Self {
        Self {
            inner: AuditLogger::recording("hyperv-provider"),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner.events()
    }

    /// Recorded events that concern the resource `id`.
    pub fn events_for(&self, id: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.object_ids.iter().any(|o| o == id))
            .collect()
    }

    // === Lifecycle Events ===

    pub fn resource_created(&self, kind: ResourceKind, id: &str) {
        self.inner
            .log(LogLevel::Audit, format!("{} '{}' created", kind, id), vec![id.to_string()]);
    }

    pub fn resource_already_present(&self, kind: ResourceKind, id: &str) {
        self.inner.log(
            LogLevel::Info,
            format!("{} '{}' already exists, nothing to create", kind, id),
            vec![id.to_string()],
        );
    }

    pub fn resource_updated(&self, kind: ResourceKind, id: &str, groups: &[&str]) {
        self.inner.log(
            LogLevel::Audit,
            format!("{} '{}' updated ({})", kind, id, groups.join(", ")),
            vec![id.to_string()],
        );
    }

    pub fn resource_deleted(&self, kind: ResourceKind, id: &str) {
        self.inner
            .log(LogLevel::Audit, format!("{} '{}' deleted", kind, id), vec![id.to_string()]);
    }

    pub fn resource_already_absent(&self, kind: ResourceKind, id: &str) {
        self.inner.log(
            LogLevel::Info,
            format!("{} '{}' does not exist, nothing to delete", kind, id),
            vec![id.to_string()],
        );
    }

    // === Partial Failures ===

    /// A declared sub-resource could not be created; the parent was kept.
    pub fn sub_resource_skipped(&self, kind: ResourceKind, id: &str, sub_resource: &str, error: &dyn Display) {
        self.inner.log(
            LogLevel::Warn,
            format!("{} '{}': skipped {}: {}", kind, id, sub_resource, error),
            vec![id.to_string()],
        );
    }

    /// A machine stopped for an update could not be started again; the update stands.
    pub fn restart_failed(&self, kind: ResourceKind, id: &str, error: &dyn Display) {
        self.inner.log(
            LogLevel::Warn,
            format!("{} '{}': failed to restart after update: {}", kind, id, error),
            vec![id.to_string()],
        );
    }

    pub fn operation_failed(&self, kind: ResourceKind, id: &str, operation: &str, error: &dyn Display) {
        self.inner.log(
            LogLevel::Error,
            format!("{} '{}': {} failed: {}", kind, id, operation, error),
            vec![id.to_string()],
        );
    }
}
