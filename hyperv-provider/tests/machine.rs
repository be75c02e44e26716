mod common;

use common::{Harness, adapter, drive, machine};
use hyperv_mgmt::{Properties, Query, Value, classes};
use hyperv_provider::ReconcileError;
use hyperv_provider::reconciler::{MachineReconciler, Reconciler};
use hyperv_provider::resources::{MachineInputs, MachineOutputs, NetworkAdapterInputs};

async fn create(h: &Harness, inputs: &MachineInputs) -> MachineOutputs {
    let (id, outputs) = MachineReconciler.create(&h.ctx, "fallback", inputs, false).await.unwrap();
    assert_eq!(Some(id.as_str()), inputs.machine_name.as_deref());
    outputs
}

#[tokio::test]
async fn test_missing_disk_is_skipped_and_machine_kept() {
    let h = Harness::new();
    h.host.add_file("C:\\vms\\os.vhdx", 1 << 30);
    let inputs = MachineInputs {
        hard_drives: vec![drive("C:\\vms\\os.vhdx"), drive("C:\\vms\\missing.vhdx")],
        ..machine("web-01")
    };

    let outputs = create(&h, &inputs).await;

    assert!(outputs.vm_id.is_some());
    assert_eq!(outputs.inputs.hard_drives.len(), 2);
    assert_eq!(h.host.count(classes::STORAGE_ALLOCATION), 1);
    assert_eq!(h.host.find(&Query::by_name(classes::COMPUTER_SYSTEM, "ElementName", "web-01")).len(), 1);

    let warnings = h.warnings("web-01");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("missing.vhdx"));
}

#[tokio::test]
async fn test_adapters_follow_drives_in_declared_order() {
    let h = Harness::new();
    h.host.add_file("C:\\vms\\os.vhdx", 1 << 30);
    let inputs = MachineInputs {
        hard_drives: vec![drive("C:\\vms\\os.vhdx")],
        network_adapters: vec![adapter("lan", None), adapter("wan", None)],
        ..machine("web-01")
    };

    let outputs = create(&h, &inputs).await;

    let names: Vec<_> = outputs
        .inputs
        .network_adapters
        .iter()
        .map(|a| a.name.clone().unwrap())
        .collect();
    assert_eq!(names, ["lan", "wan"]);

    let drive_paths: Vec<_> = h
        .host
        .find(&Query::all(classes::STORAGE_ALLOCATION))
        .iter()
        .flat_map(|d| d.properties.get_strings("HostResource"))
        .collect();
    assert_eq!(drive_paths, ["C:\\vms\\os.vhdx"]);
    // Drive, then adapter and port for each adapter.
    assert_eq!(
        h.host.stats().invocations,
        [
            "DefineSystem",
            "AddResourceSettings",
            "AddResourceSettings",
            "AddResourceSettings",
            "AddResourceSettings",
            "AddResourceSettings",
        ]
    );
    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 2);
    assert!(h.warnings("web-01").is_empty());
}

#[tokio::test]
async fn test_unknown_switch_skips_port_but_keeps_adapter() {
    let h = Harness::new();
    let inputs = MachineInputs {
        network_adapters: vec![adapter("lan", Some("no-such-switch"))],
        ..machine("web-01")
    };

    create(&h, &inputs).await;

    assert_eq!(h.host.count(classes::SYNTHETIC_ETHERNET_PORT), 1);
    assert_eq!(h.host.count(classes::ETHERNET_PORT_ALLOCATION), 0);
    let warnings = h.warnings("web-01");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("no-such-switch"));
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let h = Harness::new();
    let inputs = machine("web-01");

    let first = create(&h, &inputs).await;
    let second = create(&h, &inputs).await;

    assert_eq!(h.calls_to("DefineSystem"), 1);
    assert_eq!(first.vm_id, second.vm_id);
    assert_eq!(h.host.count(classes::SYSTEM_SETTINGS), 1);
    assert!(
        h.audit
            .events_for("web-01")
            .iter()
            .any(|e| e.message.contains("already exists"))
    );
}

#[tokio::test]
async fn test_dry_run_never_touches_host() {
    let h = Harness::new();
    let inputs = MachineInputs {
        memory_size: Some(2048),
        ..machine("web-01")
    };
    let (_, preview) = MachineReconciler.create(&h.ctx, "web-01", &inputs, true).await.unwrap();
    assert_eq!(preview.inputs.memory_size, Some(2048));
    assert_eq!(preview.inputs.processor_count, Some(1));
    assert_eq!(preview.vm_id, None);

    MachineReconciler.read(&h.ctx, "web-01", &inputs, true).await.unwrap();

    let news = MachineInputs {
        memory_size: Some(4096),
        ..inputs.clone()
    };
    let updated = MachineReconciler.update(&h.ctx, "web-01", &preview, &news, true).await.unwrap();
    assert_eq!(updated.inputs.memory_size, Some(4096));

    MachineReconciler.delete(&h.ctx, "web-01", &preview, true).await.unwrap();

    assert_eq!(h.host.stats().remote_operations(), 0);
    assert_eq!(h.host.count(classes::SYSTEM_SETTINGS), 0);
}

#[tokio::test]
async fn test_delete_starts_stops_then_destroys() {
    let h = Harness::new();
    let outputs = create(&h, &machine("web-01")).await;
    h.host.reset_stats();

    MachineReconciler.delete(&h.ctx, "web-01", &outputs, false).await.unwrap();

    assert_eq!(
        h.host.stats().invocations,
        ["RequestStateChange", "RequestStateChange", "DestroySystem"]
    );
    assert_eq!(h.host.count(classes::SYSTEM_SETTINGS), 0);
    assert_eq!(h.host.count(classes::MEMORY_SETTINGS), 0);

    h.host.reset_stats();
    MachineReconciler.delete(&h.ctx, "web-01", &outputs, false).await.unwrap();
    assert!(h.host.stats().invocations.is_empty());
    assert!(
        h.audit
            .events_for("web-01")
            .iter()
            .any(|e| e.message.contains("does not exist"))
    );
}

#[tokio::test]
async fn test_delete_running_machine_skips_start() {
    let h = Harness::new();
    let outputs = create(&h, &machine("web-01")).await;
    let system = h.host.find(&Query::by_name(classes::COMPUTER_SYSTEM, "ElementName", "web-01"));
    assert!(h.host.set_property(&system[0].path, "EnabledState", Value::from(2u16)));
    h.host.reset_stats();

    MachineReconciler.delete(&h.ctx, "web-01", &outputs, false).await.unwrap();

    assert_eq!(h.host.stats().invocations, ["RequestStateChange", "DestroySystem"]);
}

#[tokio::test]
async fn test_failed_state_change_aborts_delete() {
    let h = Harness::new();
    let outputs = create(&h, &machine("web-01")).await;
    h.host.fail_method("RequestStateChange", 32775);
    h.host.reset_stats();

    let err = MachineReconciler.delete(&h.ctx, "web-01", &outputs, false).await.unwrap_err();

    assert!(err.remote().is_some());
    assert!(err.to_string().contains("RequestStateChange"));
    assert_eq!(h.calls_to("DestroySystem"), 0);
    assert_eq!(h.host.count(classes::SYSTEM_SETTINGS), 1);
}

#[tokio::test]
async fn test_update_without_changes_makes_no_calls() {
    let h = Harness::new();
    let inputs = MachineInputs {
        memory_size: Some(1024),
        ..machine("web-01")
    };
    let outputs = create(&h, &inputs).await;
    h.host.reset_stats();

    let updated = MachineReconciler.update(&h.ctx, "web-01", &outputs, &inputs, false).await.unwrap();

    assert_eq!(h.host.stats().remote_operations(), 0);
    assert_eq!(updated.vm_id, outputs.vm_id);
}

#[tokio::test]
async fn test_memory_update_modifies_only_memory() {
    let h = Harness::new();
    let inputs = machine("web-01");
    let outputs = create(&h, &inputs).await;
    h.host.reset_stats();

    let news = MachineInputs {
        memory_size: Some(2048),
        ..inputs
    };
    let updated = MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap();

    assert_eq!(updated.inputs.memory_size, Some(2048));
    assert_eq!(h.host.stats().invocations, ["ModifyResourceSettings"]);
    let memory = h.host.find(&Query::all(classes::MEMORY_SETTINGS));
    assert_eq!(memory[0].properties.get_u64("VirtualQuantity"), Some(2048));
}

#[tokio::test]
async fn test_update_swaps_drives() {
    let h = Harness::new();
    h.host.add_file("C:\\vms\\a.vhdx", 1 << 30);
    h.host.add_file("C:\\vms\\b.vhdx", 1 << 30);
    let inputs = MachineInputs {
        hard_drives: vec![drive("C:\\vms\\a.vhdx")],
        ..machine("web-01")
    };
    let outputs = create(&h, &inputs).await;
    h.host.reset_stats();

    let news = MachineInputs {
        hard_drives: vec![drive("C:\\vms\\b.vhdx")],
        ..inputs
    };
    MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap();

    assert_eq!(h.host.stats().invocations, ["RemoveResourceSettings", "AddResourceSettings"]);
    let drives = h.host.find(&Query::all(classes::STORAGE_ALLOCATION));
    assert_eq!(drives.len(), 1);
    assert_eq!(drives[0].properties.get_strings("HostResource"), ["C:\\vms\\b.vhdx"]);
}

#[tokio::test]
async fn test_generation_is_immutable() {
    let h = Harness::new();
    let outputs = create(&h, &machine("web-01")).await;

    let news = MachineInputs {
        generation: Some(1),
        ..machine("web-01")
    };
    let err = MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Immutable { field: "generation", .. }));
}

#[tokio::test]
async fn test_read_reports_host_values() {
    let h = Harness::new();
    let inputs = machine("web-01");
    create(&h, &inputs).await;
    let memory = h.host.find(&Query::all(classes::MEMORY_SETTINGS));
    h.host.set_property(&memory[0].path, "VirtualQuantity", Value::from(4096u64));

    let (id, observed) = MachineReconciler.read(&h.ctx, "web-01", &inputs, false).await.unwrap();

    assert_eq!(id, "web-01");
    assert_eq!(observed.inputs.memory_size, Some(4096));
    assert!(observed.vm_id.is_some());
}

#[tokio::test]
async fn test_read_of_absent_machine_returns_declared_view() {
    let h = Harness::new();
    let inputs = MachineInputs {
        processor_count: Some(4),
        ..machine("ghost")
    };

    let (_, observed) = MachineReconciler.read(&h.ctx, "ghost", &inputs, false).await.unwrap();

    assert_eq!(observed.vm_id, None);
    assert_eq!(observed.inputs.processor_count, Some(4));
    assert_eq!(observed.inputs.memory_size, Some(1024));
}

/// Create `inputs`, then mark the machine running.
async fn running(h: &Harness, inputs: &MachineInputs) -> MachineOutputs {
    let outputs = create(h, inputs).await;
    let system = h.host.find(&Query::by_name(classes::COMPUTER_SYSTEM, "ElementName", "web-01"));
    assert!(h.host.set_property(&system[0].path, "EnabledState", Value::from(2u16)));
    h.host.reset_stats();
    outputs
}

fn enabled_state(h: &Harness) -> Option<u64> {
    let system = h.host.find(&Query::by_name(classes::COMPUTER_SYSTEM, "ElementName", "web-01"));
    system[0].properties.get_u64("EnabledState")
}

#[tokio::test]
async fn test_create_leaves_machine_off() {
    let h = Harness::new();

    create(&h, &machine("web-01")).await;

    assert_eq!(h.calls_to("RequestStateChange"), 0);
    assert_eq!(enabled_state(&h), Some(3));
}

#[tokio::test]
async fn test_update_of_running_machine_stops_and_restarts() {
    let h = Harness::new();
    let inputs = machine("web-01");
    let outputs = running(&h, &inputs).await;

    let news = MachineInputs {
        processor_count: Some(4),
        ..inputs
    };
    let updated = MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap();

    assert_eq!(updated.inputs.processor_count, Some(4));
    assert_eq!(
        h.host.stats().invocations,
        ["RequestStateChange", "ModifyResourceSettings", "RequestStateChange"]
    );
    assert_eq!(enabled_state(&h), Some(2));
    let processor = h.host.find(&Query::all(classes::PROCESSOR_SETTINGS));
    assert_eq!(processor[0].properties.get_u64("VirtualQuantity"), Some(4));
}

#[tokio::test]
async fn test_startup_action_change_keeps_machine_running() {
    let h = Harness::new();
    let inputs = machine("web-01");
    let outputs = running(&h, &inputs).await;

    let news = MachineInputs {
        auto_start_action: Some("Start".to_string()),
        ..inputs
    };
    MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap();

    assert_eq!(h.host.stats().invocations, ["ModifySystemSettings"]);
    assert_eq!(enabled_state(&h), Some(2));
}

#[tokio::test]
async fn test_failed_stop_aborts_update() {
    let h = Harness::new();
    let inputs = machine("web-01");
    let outputs = running(&h, &inputs).await;
    h.host.fail_method("RequestStateChange", 32768);

    let news = MachineInputs {
        memory_size: Some(2048),
        ..inputs
    };
    let err = MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap_err();

    assert!(err.to_string().contains("RequestStateChange"));
    assert_eq!(h.calls_to("ModifyResourceSettings"), 0);
    let memory = h.host.find(&Query::all(classes::MEMORY_SETTINGS));
    assert_eq!(memory[0].properties.get_u64("VirtualQuantity"), Some(1024));
}

#[tokio::test]
async fn test_failed_restart_is_only_a_warning() {
    let h = Harness::new();
    let inputs = machine("web-01");
    let outputs = running(&h, &inputs).await;
    // Requests for state 2 (Enabled) fail; the stop goes through.
    h.host.fail_method_when("RequestStateChange", "2", 32768);

    let news = MachineInputs {
        memory_size: Some(2048),
        ..inputs
    };
    let updated = MachineReconciler.update(&h.ctx, "web-01", &outputs, &news, false).await.unwrap();

    assert_eq!(updated.inputs.memory_size, Some(2048));
    assert_eq!(enabled_state(&h), Some(3));
    let warnings = h.warnings("web-01");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("restart"));
}

#[tokio::test]
async fn test_huge_memory_preview_does_not_overflow() {
    let h = Harness::new();
    let inputs = MachineInputs {
        memory_size: Some(u64::MAX / 2 + 1),
        dynamic_memory: Some(true),
        ..machine("big")
    };

    let (_, preview) = MachineReconciler.create(&h.ctx, "big", &inputs, true).await.unwrap();

    assert_eq!(preview.inputs.maximum_memory, Some(u64::MAX));
    assert_eq!(h.host.stats().remote_operations(), 0);
}

#[tokio::test]
async fn test_invalid_inline_adapter_fails_preview() {
    let h = Harness::new();
    let inputs = MachineInputs {
        network_adapters: vec![NetworkAdapterInputs {
            mac_address: Some("00:15:5d".to_string()),
            ..adapter("lan", None)
        }],
        ..machine("web-01")
    };

    let err = MachineReconciler.create(&h.ctx, "web-01", &inputs, true).await.unwrap_err();

    assert!(matches!(err, ReconcileError::InvalidInput { .. }));
    assert!(err.to_string().contains("lan"));
    assert_eq!(h.host.stats().remote_operations(), 0);
}
