//! Virtual hard disk file descriptor.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BLOCK_SIZE: u32 = 512;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VhdFileInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskType {
    Fixed,
    Dynamic,
    Differencing,
}

impl DiskType {
    /// Anything other than `fixed` or `differencing` is a dynamic disk.
    pub fn resolve(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("fixed") => Self::Fixed,
            Some(v) if v.eq_ignore_ascii_case("differencing") => Self::Differencing,
            _ => Self::Dynamic,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            2 => Some(Self::Fixed),
            3 => Some(Self::Dynamic),
            4 => Some(Self::Differencing),
            _ => None,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Fixed => 2,
            Self::Dynamic => 3,
            Self::Differencing => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Dynamic => "dynamic",
            Self::Differencing => "differencing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Vhd,
    Vhdx,
}

impl DiskFormat {
    /// `.vhd` files are VHD, everything else VHDX.
    pub fn from_path(path: &str) -> Self {
        let is_vhd = path
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("vhd"));
        if is_vhd { Self::Vhd } else { Self::Vhdx }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Vhd => 2,
            Self::Vhdx => 3,
        }
    }
}
