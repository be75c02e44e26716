//! Declarative reconciliation of Hyper-V resources.
//!
//! Each resource kind has a [`reconciler::Reconciler`] that converges the host
//! towards a descriptor. The [`driver::ReconciliationDriver`] dispatches JSON
//! documents to the right reconciler.

pub mod audit;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod reconciler;
pub mod resources;

pub use audit::{AuditEvent, LogLevel, ProviderAuditLogger};
pub use config::{ConfigError, ProviderConfig};
pub use context::ReconcileContext;
pub use driver::{ReconciliationDriver, ReconciliationOutcome};
pub use error::{ReconcileError, Result};
pub use resources::ResourceKind;
