//! Machine descriptor and its resolved settings.

use super::network_adapter::NetworkAdapterInputs;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_GENERATION: u8 = 2;
pub const DEFAULT_PROCESSOR_COUNT: u32 = 1;
pub const DEFAULT_MEMORY_MB: u64 = 1024;
pub const DEFAULT_MINIMUM_MEMORY_MB: u64 = 512;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardDriveInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_location: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_count: Option<u32>,
    /// Startup memory in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_memory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_stop_action: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hard_drives: Vec<HardDriveInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub network_adapters: Vec<NetworkAdapterInputs>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineOutputs {
    #[serde(flatten)]
    pub inputs: MachineInputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,
}

impl MachineOutputs {
    pub fn new(inputs: MachineInputs, vm_id: Option<String>) -> Self {
        Self { inputs, vm_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoStartAction {
    #[default]
    Nothing,
    StartIfRunning,
    Start,
}

impl AutoStartAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Nothing" => Some(Self::Nothing),
            "StartIfRunning" => Some(Self::StartIfRunning),
            "Start" => Some(Self::Start),
            _ => None,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::StartIfRunning,
            2 => Self::Start,
            _ => Self::Nothing,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Nothing => 0,
            Self::StartIfRunning => 1,
            Self::Start => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::StartIfRunning => "StartIfRunning",
            Self::Start => "Start",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoStopAction {
    #[default]
    TurnOff,
    Save,
    ShutDown,
}

impl AutoStopAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TurnOff" => Some(Self::TurnOff),
            "Save" => Some(Self::Save),
            "ShutDown" => Some(Self::ShutDown),
            _ => None,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Save,
            2 => Self::ShutDown,
            _ => Self::TurnOff,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::TurnOff => 0,
            Self::Save => 1,
            Self::ShutDown => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnOff => "TurnOff",
            Self::Save => "Save",
            Self::ShutDown => "ShutDown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerType {
    #[default]
    Scsi,
    Ide,
}

impl ControllerType {
    /// Unknown controller types fall back to SCSI.
    pub fn resolve(value: Option<&str>) -> Self {
        match value {
            None => Self::Scsi,
            Some(v) if v.eq_ignore_ascii_case("scsi") => Self::Scsi,
            Some(v) if v.eq_ignore_ascii_case("ide") => Self::Ide,
            Some(v) => {
                warn!(controller_type = v, "Unknown controller type, using SCSI");
                Self::Scsi
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scsi => "SCSI",
            Self::Ide => "IDE",
        }
    }
}

/// Machine settings with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineSettings {
    pub generation: u8,
    pub processor_count: u32,
    pub memory_mb: u64,
    pub dynamic_memory: bool,
    pub minimum_memory_mb: u64,
    pub maximum_memory_mb: u64,
    pub auto_start: AutoStartAction,
    pub auto_stop: AutoStopAction,
}

impl MachineSettings {
    /// Apply defaults; invalid values are logged and replaced by the default.
    pub fn resolve(inputs: &MachineInputs) -> Self {
        let generation = match inputs.generation {
            None => DEFAULT_GENERATION,
            Some(1) => 1,
            Some(2) => 2,
            Some(other) => {
                warn!(generation = other, "Invalid generation, using {}", DEFAULT_GENERATION);
                DEFAULT_GENERATION
            }
        };
        let processor_count = match inputs.processor_count {
            Some(0) => {
                warn!("Processor count of 0 is invalid, using {}", DEFAULT_PROCESSOR_COUNT);
                DEFAULT_PROCESSOR_COUNT
            }
            Some(n) => n,
            None => DEFAULT_PROCESSOR_COUNT,
        };
        let memory_mb = inputs.memory_size.filter(|m| *m > 0).unwrap_or(DEFAULT_MEMORY_MB);
        let dynamic_memory = inputs.dynamic_memory.unwrap_or(false);

        let auto_start = match inputs.auto_start_action.as_deref() {
            None => AutoStartAction::default(),
            Some(value) => AutoStartAction::parse(value).unwrap_or_else(|| {
                warn!(action = value, "Invalid auto start action, using Nothing");
                AutoStartAction::default()
            }),
        };
        let auto_stop = match inputs.auto_stop_action.as_deref() {
            None => AutoStopAction::default(),
            Some(value) => AutoStopAction::parse(value).unwrap_or_else(|| {
                warn!(action = value, "Invalid auto stop action, using TurnOff");
                AutoStopAction::default()
            }),
        };

        Self {
            generation,
            processor_count,
            memory_mb,
            dynamic_memory,
            minimum_memory_mb: inputs.minimum_memory.unwrap_or(DEFAULT_MINIMUM_MEMORY_MB),
            maximum_memory_mb: inputs.maximum_memory.unwrap_or(memory_mb.saturating_mul(2)),
            auto_start,
            auto_stop,
        }
    }

    /// `inputs` with the resolved values written back.
    pub fn fill(&self, inputs: &MachineInputs) -> MachineInputs {
        let mut filled = inputs.clone();
        filled.generation = Some(self.generation.into());
        filled.processor_count = Some(self.processor_count);
        filled.memory_size = Some(self.memory_mb);
        filled.dynamic_memory = Some(self.dynamic_memory);
        if self.dynamic_memory {
            filled.minimum_memory = Some(self.minimum_memory_mb);
            filled.maximum_memory = Some(self.maximum_memory_mb);
        }
        filled.auto_start_action = Some(self.auto_start.as_str().to_string());
        filled.auto_stop_action = Some(self.auto_stop.as_str().to_string());
        for (i, adapter) in filled.network_adapters.iter_mut().enumerate() {
            adapter.name = Some(adapter_name(adapter, i));
        }
        filled
    }
}

/// Name of the `index`th declared adapter of a machine.
pub fn adapter_name(adapter: &NetworkAdapterInputs, index: usize) -> String {
    match adapter.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("Network Adapter {}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MachineSettings::resolve(&MachineInputs::default());
        assert_eq!(settings.generation, 2);
        assert_eq!(settings.processor_count, 1);
        assert_eq!(settings.memory_mb, 1024);
        assert!(!settings.dynamic_memory);
        assert_eq!(settings.auto_start, AutoStartAction::Nothing);
        assert_eq!(settings.auto_stop, AutoStopAction::TurnOff);
    }

    #[test]
    fn test_dynamic_memory_bounds() {
        let inputs = MachineInputs {
            memory_size: Some(4096),
            dynamic_memory: Some(true),
            ..Default::default()
        };
        let settings = MachineSettings::resolve(&inputs);
        assert_eq!(settings.minimum_memory_mb, 512);
        assert_eq!(settings.maximum_memory_mb, 8192);

        let filled = settings.fill(&inputs);
        assert_eq!(filled.maximum_memory, Some(8192));
    }

    #[test]
    fn test_huge_memory_caps_maximum() {
        let inputs = MachineInputs {
            memory_size: Some(u64::MAX / 2 + 1),
            ..Default::default()
        };
        let settings = MachineSettings::resolve(&inputs);
        assert_eq!(settings.memory_mb, u64::MAX / 2 + 1);
        assert_eq!(settings.maximum_memory_mb, u64::MAX);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let inputs = MachineInputs {
            generation: Some(3),
            auto_start_action: Some("Sometimes".into()),
            auto_stop_action: Some("Save".into()),
            ..Default::default()
        };
        let settings = MachineSettings::resolve(&inputs);
        assert_eq!(settings.generation, 2);
        assert_eq!(settings.auto_start, AutoStartAction::Nothing);
        assert_eq!(settings.auto_stop, AutoStopAction::Save);
    }

    #[test]
    fn test_adapter_default_names() {
        let inputs = MachineInputs {
            network_adapters: vec![
                NetworkAdapterInputs::default(),
                NetworkAdapterInputs {
                    name: Some("mgmt".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let filled = MachineSettings::resolve(&inputs).fill(&inputs);
        assert_eq!(filled.network_adapters[0].name.as_deref(), Some("Network Adapter 1"));
        assert_eq!(filled.network_adapters[1].name.as_deref(), Some("mgmt"));
    }

    #[test]
    fn test_outputs_flatten_inputs() {
        let json = serde_json::json!({
            "machineName": "web-01",
            "memorySize": 2048,
            "hardDrives": [{"path": "C:\\vms\\web-01.vhdx"}],
            "vmId": "4F0A"
        });
        let outputs: MachineOutputs = serde_json::from_value(json).unwrap();
        assert_eq!(outputs.inputs.machine_name.as_deref(), Some("web-01"));
        assert_eq!(outputs.inputs.hard_drives.len(), 1);
        assert_eq!(outputs.vm_id.as_deref(), Some("4F0A"));
    }
}
