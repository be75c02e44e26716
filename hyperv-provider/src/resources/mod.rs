//! Desired-state descriptors for each resource kind.
//!
//! Descriptors are JSON documents with camelCase field names. Every field is
//! optional on the wire; defaults are applied by the reconcilers.

pub mod machine;
pub mod network_adapter;
pub mod vhd_file;
pub mod virtual_switch;

pub use machine::{HardDriveInput, MachineInputs, MachineOutputs};
pub use network_adapter::{NetworkAdapterInputs, NetworkAdapterOutputs};
pub use vhd_file::VhdFileInputs;
pub use virtual_switch::VirtualSwitchInputs;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Machine,
    VhdFile,
    VirtualSwitch,
    NetworkAdapter,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Machine => "machine",
            ResourceKind::VhdFile => "vhd file",
            ResourceKind::VirtualSwitch => "virtual switch",
            ResourceKind::NetworkAdapter => "network adapter",
        };
        f.write_str(name)
    }
}

/// Identity of a resource: its explicit name when given, else the caller's fallback.
pub(crate) fn identity(explicit: Option<&str>, fallback: &str) -> String {
    match explicit.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_explicit_name() {
        assert_eq!(identity(Some("web-01"), "fallback"), "web-01");
        assert_eq!(identity(Some("  "), "fallback"), "fallback");
        assert_eq!(identity(None, "fallback"), "fallback");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ResourceKind::VhdFile.to_string(), "vhd file");
        assert_eq!(
            serde_json::to_value(ResourceKind::NetworkAdapter).unwrap(),
            serde_json::json!("network-adapter")
        );
    }
}
