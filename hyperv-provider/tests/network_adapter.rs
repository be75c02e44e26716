mod common;

use common::{Harness, adapter, machine};
use hyperv_mgmt::{Properties, Query, classes};
use hyperv_provider::ReconcileError;
use hyperv_provider::reconciler::{MachineReconciler, NetworkAdapterReconciler, Reconciler, VirtualSwitchReconciler};
use hyperv_provider::resources::{NetworkAdapterInputs, NetworkAdapterOutputs, VirtualSwitchInputs};

/// A host with machine `web-01` and internal switch `lab`.
async fn prepared() -> Harness {
    let h = Harness::new();
    MachineReconciler.create(&h.ctx, "web-01", &machine("web-01"), false).await.unwrap();
    let lab = VirtualSwitchInputs {
        name: Some("lab".to_string()),
        switch_type: Some("Internal".to_string()),
        ..Default::default()
    };
    VirtualSwitchReconciler.create(&h.ctx, "lab", &lab, false).await.unwrap();
    h.host.reset_stats();
    h
}

fn nic(switch: Option<&str>) -> NetworkAdapterInputs {
    NetworkAdapterInputs {
        vm_name: Some("web-01".to_string()),
        ..adapter("eth0", switch)
    }
}

async fn create(h: &Harness, inputs: &NetworkAdapterInputs) -> NetworkAdapterOutputs {
    let (id, outputs) = NetworkAdapterReconciler.create(&h.ctx, "fallback", inputs, false).await.unwrap();
    assert_eq!(id, "eth0");
    outputs
}

/// Port allocations that belong to adapters rather than switches.
fn adapter_ports(h: &Harness) -> usize {
    h.host
        .find(&Query::all(classes::ETHERNET_PORT_ALLOCATION))
        .iter()
        .filter(|p| p.properties.get_path("Parent").is_some())
        .count()
}

#[tokio::test]
async fn test_create_adapter_with_features() {
    let h = prepared().await;
    let inputs = NetworkAdapterInputs {
        mac_address: Some("00:15:5d:01:02:03".to_string()),
        vlan_id: Some(10),
        dhcp_guard: Some(true),
        vmq_weight: Some(100),
        ip_addresses: Some("10.0.0.5, 10.0.0.6".to_string()),
        ..nic(Some("lab"))
    };

    let outputs = create(&h, &inputs).await;

    assert!(outputs.adapter_id.is_some());
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 1);
    assert_eq!(adapter_ports(&h), 1);
    assert_eq!(h.host.count(classes::PORT_VLAN_SETTINGS), 1);
    assert_eq!(h.host.count(classes::PORT_SECURITY_SETTINGS), 1);
    assert_eq!(h.host.count(classes::PORT_OFFLOAD_SETTINGS), 1);

    let guest = h.host.find(&Query::all(classes::GUEST_NETWORK_CONFIGURATION));
    assert_eq!(guest.len(), 1);
    assert_eq!(guest[0].properties.get_strings("IPAddresses"), ["10.0.0.5", "10.0.0.6"]);
    assert_eq!(guest[0].properties.get_bool("DHCPEnabled"), Some(false));

    let (_, observed) = NetworkAdapterReconciler.read(&h.ctx, "eth0", &inputs, false).await.unwrap();
    assert_eq!(observed.inputs.switch_name.as_deref(), Some("lab"));
    assert_eq!(observed.inputs.vlan_id, Some(10));
    assert_eq!(observed.inputs.dhcp_guard, Some(true));
    assert_eq!(observed.inputs.vmq_weight, Some(100));
    assert_eq!(observed.inputs.mac_address.as_deref(), Some("00:15:5d:01:02:03"));
    assert_eq!(observed.adapter_id, outputs.adapter_id);
}

#[tokio::test]
async fn test_adapter_without_switch_is_disconnected() {
    let h = prepared().await;

    create(&h, &nic(None)).await;

    let ports = h.host.find(&Query::all(classes::ETHERNET_PORT_ALLOCATION));
    let port = ports.iter().find(|p| p.properties.get_path("Parent").is_some()).unwrap();
    assert!(port.properties.get_strings("HostResource").is_empty());

    let (_, observed) = NetworkAdapterReconciler.read(&h.ctx, "eth0", &nic(None), false).await.unwrap();
    assert_eq!(observed.inputs.switch_name, None);
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let h = prepared().await;
    let first = create(&h, &nic(Some("lab"))).await;

    let second = create(&h, &nic(Some("lab"))).await;

    assert_eq!(first.adapter_id, second.adapter_id);
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 1);
}

#[tokio::test]
async fn test_create_requires_existing_machine() {
    let h = prepared().await;

    let missing_vm = NetworkAdapterInputs {
        vm_name: None,
        ..nic(None)
    };
    let err = NetworkAdapterReconciler.create(&h.ctx, "eth0", &missing_vm, true).await.unwrap_err();
    assert!(err.to_string().contains("vmName"));

    let unknown_vm = NetworkAdapterInputs {
        vm_name: Some("db-01".to_string()),
        ..nic(None)
    };
    let err = NetworkAdapterReconciler.create(&h.ctx, "eth0", &unknown_vm, false).await.unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidInput { .. }));
    assert!(err.to_string().contains("db-01"));
    assert_eq!(h.calls_to("AddResourceSettings"), 0);
}

#[tokio::test]
async fn test_invalid_values_are_rejected_before_any_call() {
    let h = prepared().await;

    let bad_vlan = NetworkAdapterInputs {
        vlan_id: Some(5000),
        ..nic(Some("lab"))
    };
    let err = NetworkAdapterReconciler.create(&h.ctx, "eth0", &bad_vlan, false).await.unwrap_err();
    assert!(err.to_string().contains("5000"));

    let bad_mac = NetworkAdapterInputs {
        mac_address: Some("00:15:5d".to_string()),
        ..nic(Some("lab"))
    };
    assert!(NetworkAdapterReconciler.create(&h.ctx, "eth0", &bad_mac, false).await.is_err());
    assert_eq!(h.host.stats().remote_operations(), 0);
}

#[tokio::test]
async fn test_vlan_update_and_removal() {
    let h = prepared().await;
    let inputs = NetworkAdapterInputs {
        vlan_id: Some(10),
        ..nic(Some("lab"))
    };
    let outputs = create(&h, &inputs).await;

    h.host.reset_stats();
    let retagged = NetworkAdapterInputs {
        vlan_id: Some(20),
        ..inputs.clone()
    };
    let outputs = NetworkAdapterReconciler
        .update(&h.ctx, "eth0", &outputs, &retagged, false)
        .await
        .unwrap();
    assert_eq!(h.host.stats().invocations, ["ModifyFeatureSettings"]);
    let vlan = h.host.find(&Query::all(classes::PORT_VLAN_SETTINGS));
    assert_eq!(vlan[0].properties.get_u64("AccessVlanId"), Some(20));

    h.host.reset_stats();
    NetworkAdapterReconciler
        .update(&h.ctx, "eth0", &outputs, &nic(Some("lab")), false)
        .await
        .unwrap();
    assert_eq!(h.host.stats().invocations, ["RemoveFeatureSettings"]);
    assert_eq!(h.host.count(classes::PORT_VLAN_SETTINGS), 0);
}

#[tokio::test]
async fn test_disconnect_from_switch() {
    let h = prepared().await;
    let outputs = create(&h, &nic(Some("lab"))).await;
    h.host.reset_stats();

    NetworkAdapterReconciler
        .update(&h.ctx, "eth0", &outputs, &nic(None), false)
        .await
        .unwrap();

    assert_eq!(h.host.stats().invocations, ["ModifyResourceSettings"]);
    let (_, observed) = NetworkAdapterReconciler.read(&h.ctx, "eth0", &nic(None), false).await.unwrap();
    assert_eq!(observed.inputs.switch_name, None);
}

#[tokio::test]
async fn test_clearing_addresses_enables_dhcp() {
    let h = prepared().await;
    let inputs = NetworkAdapterInputs {
        ip_addresses: Some("10.0.0.5".to_string()),
        ..nic(Some("lab"))
    };
    let outputs = create(&h, &inputs).await;
    h.host.reset_stats();

    NetworkAdapterReconciler
        .update(&h.ctx, "eth0", &outputs, &nic(Some("lab")), false)
        .await
        .unwrap();

    assert_eq!(h.host.stats().invocations, ["SetGuestNetworkAdapterConfiguration"]);
    let guest = h.host.find(&Query::all(classes::GUEST_NETWORK_CONFIGURATION));
    assert_eq!(guest[0].properties.get_bool("DHCPEnabled"), Some(true));
    assert!(guest[0].properties.get_strings("IPAddresses").is_empty());
}

#[tokio::test]
async fn test_machine_is_immutable() {
    let h = prepared().await;
    let outputs = create(&h, &nic(Some("lab"))).await;
    let moved = NetworkAdapterInputs {
        vm_name: Some("db-01".to_string()),
        ..nic(Some("lab"))
    };

    let err = NetworkAdapterReconciler
        .update(&h.ctx, "eth0", &outputs, &moved, false)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Immutable { field: "vmName", .. }));
}

#[tokio::test]
async fn test_update_of_removed_adapter_fails() {
    let h = prepared().await;
    let outputs = create(&h, &nic(Some("lab"))).await;
    NetworkAdapterReconciler.delete(&h.ctx, "eth0", &outputs, false).await.unwrap();

    let news = NetworkAdapterInputs {
        vlan_id: Some(7),
        ..nic(Some("lab"))
    };
    let err = NetworkAdapterReconciler.update(&h.ctx, "eth0", &outputs, &news, false).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Missing { .. }));
}

#[tokio::test]
async fn test_delete_removes_port_and_features() {
    let h = prepared().await;
    let inputs = NetworkAdapterInputs {
        vlan_id: Some(10),
        router_guard: Some(true),
        ..nic(Some("lab"))
    };
    let outputs = create(&h, &inputs).await;
    h.host.reset_stats();

    NetworkAdapterReconciler.delete(&h.ctx, "eth0", &outputs, false).await.unwrap();

    assert_eq!(h.host.stats().invocations, ["RemoveResourceSettings", "RemoveResourceSettings"]);
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 0);
    assert_eq!(adapter_ports(&h), 0);
    assert_eq!(h.host.count(classes::PORT_VLAN_SETTINGS), 0);
    assert_eq!(h.host.count(classes::PORT_SECURITY_SETTINGS), 0);

    h.host.reset_stats();
    NetworkAdapterReconciler.delete(&h.ctx, "eth0", &outputs, false).await.unwrap();
    assert!(h.host.stats().invocations.is_empty());
}

#[tokio::test]
async fn test_machine_update_adds_and_removes_inline_adapters() {
    let h = prepared().await;
    let inputs = machine("web-01");
    let (_, outputs) = MachineReconciler.read(&h.ctx, "web-01", &inputs, false).await.unwrap();

    let with_nic = hyperv_provider::resources::MachineInputs {
        network_adapters: vec![adapter("lan", Some("lab"))],
        ..inputs.clone()
    };
    let outputs_with_nic = MachineReconciler
        .update(&h.ctx, "web-01", &outputs, &with_nic, false)
        .await
        .unwrap();
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 1);
    assert_eq!(adapter_ports(&h), 1);

    MachineReconciler
        .update(&h.ctx, "web-01", &outputs_with_nic, &inputs, false)
        .await
        .unwrap();
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 0);
    assert_eq!(adapter_ports(&h), 0);
}
