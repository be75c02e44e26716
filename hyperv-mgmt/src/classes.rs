//! Class names of the virtualization namespace used by this crate and its callers.

pub const COMPUTER_SYSTEM: &str = "Msvm_ComputerSystem";
pub const SYSTEM_SETTINGS: &str = "Msvm_VirtualSystemSettingData";
pub const MEMORY_SETTINGS: &str = "Msvm_MemorySettingData";
pub const PROCESSOR_SETTINGS: &str = "Msvm_ProcessorSettingData";
pub const STORAGE_ALLOCATION: &str = "Msvm_StorageAllocationSettingData";
pub const SYNTHETIC_ETHERNET_PORT: &str = "Msvm_SyntheticEthernetPortSettingData";
pub const ETHERNET_PORT_ALLOCATION: &str = "Msvm_EthernetPortAllocationSettingData";
pub const PORT_VLAN_SETTINGS: &str = "Msvm_EthernetSwitchPortVlanSettingData";
pub const PORT_SECURITY_SETTINGS: &str = "Msvm_EthernetSwitchPortSecuritySettingData";
pub const PORT_OFFLOAD_SETTINGS: &str = "Msvm_EthernetSwitchPortOffloadSettingData";
pub const GUEST_NETWORK_CONFIGURATION: &str = "Msvm_GuestNetworkAdapterConfiguration";
pub const VIRTUAL_SWITCH: &str = "Msvm_VirtualEthernetSwitch";
pub const SWITCH_SETTINGS: &str = "Msvm_VirtualEthernetSwitchSettingData";
pub const EXTERNAL_ETHERNET_PORT: &str = "Msvm_ExternalEthernetPort";
pub const HARD_DISK_SETTINGS: &str = "Msvm_VirtualHardDiskSettingData";
pub const CONCRETE_JOB: &str = "Msvm_ConcreteJob";
pub const DATA_FILE: &str = "CIM_DataFile";

/// `Caption` of guest computer systems.
pub const VIRTUAL_MACHINE_CAPTION: &str = "Virtual Machine";
/// `Caption` of the computer system representing the host itself.
pub const HOST_CAPTION: &str = "Hosting Computer System";

/// `ResourceType` of storage allocations holding a virtual hard disk.
pub const RESOURCE_TYPE_LOGICAL_DISK: u64 = 31;
pub const SUBTYPE_VIRTUAL_HARD_DISK: &str = "Microsoft:Hyper-V:Virtual Hard Disk";
pub const SUBTYPE_SYNTHETIC_ETHERNET: &str = "Microsoft:Hyper-V:Synthetic Ethernet Port";
pub const SUBTYPE_GENERATION_1: &str = "Microsoft:Hyper-V:SubType:1";
pub const SUBTYPE_GENERATION_2: &str = "Microsoft:Hyper-V:SubType:2";
