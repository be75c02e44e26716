//! Network adapter descriptor, used standalone and inside a machine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkAdapterInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp_guard: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_guard: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_mirroring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ieee_priority_tag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmq_weight: Option<u32>,
    /// Comma separated static addresses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<String>,
}

impl NetworkAdapterInputs {
    pub fn ip_address_list(&self) -> Vec<String> {
        self.ip_addresses
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn has_security_settings(&self) -> bool {
        self.dhcp_guard.is_some()
            || self.router_guard.is_some()
            || self.port_mirroring.is_some()
            || self.ieee_priority_tag.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAdapterOutputs {
    #[serde(flatten)]
    pub inputs: NetworkAdapterInputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
}

impl NetworkAdapterOutputs {
    pub fn new(inputs: NetworkAdapterInputs, adapter_id: Option<String>) -> Self {
        Self { inputs, adapter_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortMirroring {
    #[default]
    None,
    Destination,
    Source,
    Both,
}

impl PortMirroring {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "destination" => Some(Self::Destination),
            "source" => Some(Self::Source),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Destination,
            2 => Self::Source,
            3 => Self::Both,
            _ => Self::None,
        }
    }

    /// `MonitorMode` of the port security settings.
    pub fn code(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Destination => 1,
            Self::Source => 2,
            Self::Both => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Destination => "Destination",
            Self::Source => "Source",
            Self::Both => "Both",
        }
    }
}

/// Normalize a MAC address to 12 upper-case hex digits, as the host stores it.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let digits: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (digits.len() == 12 && digits.chars().all(|c| c.is_ascii_hexdigit())).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_normalization() {
        assert_eq!(normalize_mac("00:15:5d:01:02:03").as_deref(), Some("00155D010203"));
        assert_eq!(normalize_mac("00-15-5D-01-02-03").as_deref(), Some("00155D010203"));
        assert_eq!(normalize_mac("00155D0102"), None);
        assert_eq!(normalize_mac("zz:15:5d:01:02:03"), None);
    }

    #[test]
    fn test_ip_address_list() {
        let inputs = NetworkAdapterInputs {
            ip_addresses: Some("10.0.0.5, 10.0.0.6,,".into()),
            ..Default::default()
        };
        assert_eq!(inputs.ip_address_list(), vec!["10.0.0.5", "10.0.0.6"]);
        assert!(NetworkAdapterInputs::default().ip_address_list().is_empty());
    }
}
