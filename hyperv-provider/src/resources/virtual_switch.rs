//! Virtual switch descriptor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualSwitchInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_management_os: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_adapter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchType {
    External,
    Internal,
    Private,
}

impl SwitchType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "external" => Some(Self::External),
            "internal" => Some(Self::Internal),
            "private" => Some(Self::Private),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "External",
            Self::Internal => "Internal",
            Self::Private => "Private",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_type_parse() {
        assert_eq!(SwitchType::parse("external"), Some(SwitchType::External));
        assert_eq!(SwitchType::parse("Private"), Some(SwitchType::Private));
        assert_eq!(SwitchType::parse("bridge"), None);
    }
}
