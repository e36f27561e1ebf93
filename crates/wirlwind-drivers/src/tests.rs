use crate::registry::DriverRegistry;
use crate::transforms::{
    compute_memory_pct, normalize_bgp_peers, parse_rate_to_bps, post_process_log,
    shorten_interface, strip_fqdn,
};
use crate::{DriverError, VendorDriver};
use serde_json::{json, Value};
use std::sync::Arc;
use wirlwind_common::{Envelope, StateReader};

/// Store stand-in: serves canned envelopes to post-process.
#[derive(Default)]
struct FakeStore {
    memory: Option<Envelope>,
}

impl StateReader for FakeStore {
    fn latest(&self, collection: &str) -> Option<Arc<Envelope>> {
        match collection {
            "memory" => self.memory.clone().map(Arc::new),
            _ => None,
        }
    }
}

// ── Registry ──

#[test]
fn builtins_cover_the_supported_vendors() {
    let registry = DriverRegistry::with_builtins().unwrap();
    assert_eq!(
        registry.vendor_ids(),
        vec!["arista_eos", "cisco_ios", "cisco_ios_xe", "cisco_nxos", "juniper_junos"]
    );
}

#[test]
fn duplicate_registration_is_fatal() {
    let mut registry = DriverRegistry::with_builtins().unwrap();
    let err = registry
        .register(Arc::new(crate::vendors::cisco_ios::CiscoIosDriver))
        .unwrap_err();
    assert!(matches!(err, DriverError::DuplicateVendor(v) if v == "cisco_ios"));
}

#[test]
fn lookup_falls_back_one_segment_then_default() {
    let registry = DriverRegistry::with_builtins().unwrap();
    // cisco_ios_xe registers as an alias; exact hit.
    assert_eq!(registry.get("cisco_ios_xe").vendor_id(), "cisco_ios");
    // A hypothetical sub-platform falls back to the base driver.
    assert_eq!(registry.get("arista_eos_lab").vendor_id(), "arista_eos");
    // Nothing matches: the default driver with no pagination command.
    let driver = registry.get("vyos");
    assert_eq!(driver.vendor_id(), "vyos");
    assert_eq!(driver.pagination_command(), "");
}

// ── Shared transforms ──

#[test]
fn memory_pct_from_kb_pair() {
    let mut obj = json!({"total_kb": "8192000", "used_kb": "2048000"})
        .as_object()
        .cloned()
        .unwrap();
    compute_memory_pct(&mut obj);
    assert_eq!(obj["used_pct"], json!(25.0));
    assert_eq!(obj["total_display"], "7.8 MB");
}

#[test]
fn memory_used_derives_from_total_minus_free() {
    let mut obj = json!({"total": "1000", "free": "250"})
        .as_object()
        .cloned()
        .unwrap();
    compute_memory_pct(&mut obj);
    assert_eq!(obj["used_pct"], json!(75.0));
}

#[test]
fn bgp_state_pfx_splits_into_state_and_count() {
    let mut peers = vec![
        json!({"neighbor": " 10.0.0.1 ", "as": "65001", "state_pfx": "42"}),
        json!({"neighbor": "10.0.0.2", "as": "65002", "state_pfx": "Idle"}),
        json!({"neighbor": "10.0.0.3", "as": "65003"}),
    ];
    normalize_bgp_peers(&mut peers);
    assert_eq!(peers[0]["state"], "Established");
    assert_eq!(peers[0]["prefixes_rcvd"], 42);
    assert_eq!(peers[0]["neighbor"], "10.0.0.1");
    assert_eq!(peers[1]["state"], "Idle");
    assert_eq!(peers[1]["prefixes_rcvd"], 0);
    assert_eq!(peers[2]["state"], "Unknown");
}

#[test]
fn log_assembles_timestamp_only_when_all_components_present() {
    let mut obj = json!({"entries": [
        {"month": "Mar", "day": "14", "time": "09:26:53", "severity": "5", "message": "a"},
        {"month": "Mar", "day": "", "time": "09:27:00", "timestamp": "raw-ts", "severity": "9", "message": "b"},
    ]})
    .as_object()
    .cloned()
    .unwrap();
    post_process_log(&mut obj);
    let entries = obj["entries"].as_array().unwrap();
    // Reversed to newest-first.
    assert_eq!(entries[0]["timestamp"], "raw-ts");
    assert_eq!(entries[0]["severity"], 7); // clamped
    assert_eq!(entries[1]["timestamp"], "Mar 14 09:26:53");
    assert_eq!(entries[1]["severity"], 5);
}

#[test]
fn log_trims_to_fifty_newest() {
    let entries: Vec<Value> = (0..80)
        .map(|i| json!({"timestamp": format!("t{i}"), "severity": "6", "message": "m"}))
        .collect();
    let mut obj = json!({"entries": entries}).as_object().cloned().unwrap();
    post_process_log(&mut obj);
    let entries = obj["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0]["timestamp"], "t79");
}

#[test]
fn rate_strings_convert_to_integer_bps() {
    assert_eq!(parse_rate_to_bps(&json!("1.23 Mbps")), 1_230_000);
    assert_eq!(parse_rate_to_bps(&json!("456 Kbps")), 456_000);
    assert_eq!(parse_rate_to_bps(&json!("0 bps")), 0);
    assert_eq!(parse_rate_to_bps(&json!("1.2 Gbps")), 1_200_000_000);
    assert_eq!(parse_rate_to_bps(&json!("1234")), 1234);
    assert_eq!(parse_rate_to_bps(&json!(5000)), 5000);
    assert_eq!(parse_rate_to_bps(&json!("garbage")), 0);
}

#[test]
fn interface_and_fqdn_helpers() {
    assert_eq!(shorten_interface("GigabitEthernet0/1"), "Gi0/1");
    assert_eq!(shorten_interface("Ethernet49/1"), "Et49/1");
    assert_eq!(shorten_interface("ae0"), "ae0");
    assert_eq!(strip_fqdn("switch1.example.com"), "switch1");
    assert_eq!(strip_fqdn("10.0.0.1"), "10.0.0.1");
}

// ── Cisco IOS ──

#[test]
fn cisco_cpu_normalizes_and_drops_idle_processes() {
    let driver = crate::vendors::cisco_ios::CiscoIosDriver;
    let envelope = json!({
        "cpu_usage_5_sec": "13",
        "cpu_usage_1_min": "11",
        "cpu_usage_5_min": "10",
        "processes": [
            {"process_pid": "1", "process_name": "Chunk Manager", "process_cpu_usage_5_sec": "0.00"},
            {"process_pid": "2", "process_name": "IP Input", "process_cpu_usage_5_sec": "4.15",
             "process_cpu_usage_1_min": "3.90", "process_cpu_usage_5_min": "3.80"},
        ],
    });
    let out = driver
        .post_process("cpu", envelope, &FakeStore::default())
        .unwrap();
    assert_eq!(out["five_sec_total"], json!(13.0));
    assert_eq!(out["one_min"], json!(11.0));
    assert_eq!(out["five_min"], json!(10.0));

    let processes = out["processes"].as_array().unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0]["name"], "IP Input");
    assert_eq!(processes[0]["cpu_pct"], json!(4.15));
    assert_eq!(processes[0]["five_sec"], json!(4.15));
    assert_eq!(processes[0]["cpu_1min"], json!(3.9));
}

#[test]
fn cisco_cpu_merges_memory_holdings_by_pid() {
    let driver = crate::vendors::cisco_ios::CiscoIosDriver;
    let store = FakeStore {
        memory: Some(json!({
            "process_id": ["2", "3"],
            "process_holding": ["11200", "18600"],
        })),
    };
    let envelope = json!({
        "cpu_usage_5_sec": "5",
        "processes": [
            {"pid": "2", "name": "IP Input", "cpu_pct": "4.15"},
        ],
    });
    let out = driver.post_process("cpu", envelope, &store).unwrap();
    assert_eq!(out["processes"][0]["holding"], 11200);
}

#[test]
fn cisco_interface_detail_computes_utilization() {
    let driver = crate::vendors::cisco_ios::CiscoIosDriver;
    let envelope = json!({"interfaces": [{
        "interface": "GigabitEthernet1",
        "bandwidth_raw": "1000000 Kbit",
        "input_rate_bps": "250000000",
        "output_rate_bps": "100000000",
        "in_errors": "0",
        "mtu": "1500",
    }]});
    let out = driver
        .post_process("interface_detail", envelope, &FakeStore::default())
        .unwrap();
    let intf = &out["interfaces"][0];
    assert_eq!(intf["bandwidth_kbps"], 1_000_000);
    assert_eq!(intf["input_rate_bps"], 250_000_000);
    assert_eq!(intf["utilization_pct"], json!(25.0));
    assert_eq!(intf["mtu"], 1500);
    assert!(intf.get("bandwidth_raw").is_none());
}

// ── Arista EOS ──

#[test]
fn arista_cpu_from_idle_keeps_zero_cpu_processes() {
    let driver = crate::vendors::arista_eos::AristaEosDriver;
    let envelope = json!({
        "global_cpu_percent_idle": "82.4",
        "processes": [
            {"pid": "1817", "command": "Rib", "percent_cpu": "5.9", "percent_memory": "2.1",
             "resident_memory_size": "120m"},
            {"pid": "2021", "command": "Etba", "percent_cpu": "0.0", "percent_memory": "4.0",
             "resident_memory_size": "250m"},
        ],
    });
    let out = driver
        .post_process("cpu", envelope, &FakeStore::default())
        .unwrap();
    // 100 - 82.4, kept to one decimal.
    assert_eq!(out["five_sec_total"], json!(17.6));
    assert_eq!(out["one_min"], json!(17.6));

    let processes = out["processes"].as_array().unwrap();
    assert_eq!(processes.len(), 2, "zero-CPU rows stay in a top snapshot");
    assert_eq!(processes[0]["name"], "Rib");
    assert_eq!(processes[0]["holding"], 120 * 1024 * 1024);
    assert_eq!(processes[0]["holding_display"], "122880K");
}

#[test]
fn arista_rate_conversion_to_bps() {
    let driver = crate::vendors::arista_eos::AristaEosDriver;
    let envelope = json!({"interfaces": [{
        "interface": "Ethernet1",
        "input_rate_raw": "1.23 Mbps",
        "output_rate_raw": "456 Kbps",
        "bandwidth_raw": "10000000 Kbit",
    }]});
    let out = driver
        .post_process("interface_detail", envelope, &FakeStore::default())
        .unwrap();
    let intf = &out["interfaces"][0];
    assert_eq!(intf["input_rate_bps"], 1_230_000);
    assert_eq!(intf["output_rate_bps"], 456_000);
    assert!(intf.get("input_rate_raw").is_none());
}

#[test]
fn arista_process_list_sorts_by_cpu_then_memory() {
    let driver = crate::vendors::arista_eos::AristaEosDriver;
    let processes: Vec<Value> = (0..30)
        .map(|i| {
            json!({"pid": i.to_string(), "command": format!("p{i}"),
                   "percent_cpu": "0.0", "percent_memory": format!("{}.0", i % 10)})
        })
        .chain(std::iter::once(json!(
            {"pid": "99", "command": "busy", "percent_cpu": "9.9", "percent_memory": "1.0"}
        )))
        .collect();
    let envelope = json!({"global_cpu_percent_idle": "90.0", "processes": processes});
    let out = driver
        .post_process("cpu", envelope, &FakeStore::default())
        .unwrap();
    let processes = out["processes"].as_array().unwrap();
    assert_eq!(processes.len(), 20);
    assert_eq!(processes[0]["name"], "busy");
}

#[test]
fn arista_neighbors_get_short_labels_and_inferred_caps() {
    let driver = crate::vendors::arista_eos::AristaEosDriver;
    let envelope = json!({"neighbors": [{
        "device_id": "spine1.example.com",
        "local_intf": "Ethernet49/1",
        "remote_intf": "GigabitEthernet0/0/1",
        "neighbor_description": "Arista Networks EOS version 4.28.3M running on DCS-7050X Switch",
    }]});
    let out = driver
        .post_process("neighbors", envelope, &FakeStore::default())
        .unwrap();
    let nbr = &out["neighbors"][0];
    assert_eq!(nbr["device_id"], "spine1");
    assert_eq!(nbr["local_intf"], "Et49/1");
    assert_eq!(nbr["remote_intf"], "Gi0/0/1");
    assert_eq!(nbr["platform"], "Arista EOS");
}

// ── Cisco NX-OS ──

#[test]
fn nxos_cpu_from_idle_pct() {
    let driver = crate::vendors::cisco_nxos::CiscoNxosDriver;
    let out = driver
        .post_process("cpu", json!({"idle_pct": "93.5"}), &FakeStore::default())
        .unwrap();
    assert_eq!(out["five_sec_total"], json!(6.5));
}

// ── Juniper JunOS ──

#[test]
fn junos_memory_promotes_master_re() {
    let driver = crate::vendors::juniper_junos::JuniperJunosDriver;
    let envelope = json!({
        "slot": "0",
        "status": "Backup",
        "memory_utilization": "20",
        "processes": [
            {"slot": "1", "status": "Master", "memory_utilization": "41", "dram": "16384"},
        ],
    });
    let out = driver
        .post_process("memory", envelope, &FakeStore::default())
        .unwrap();
    assert_eq!(out["slot"], "1");
    assert_eq!(out["used_pct"], json!(41.0));
    assert_eq!(out["total_display"], "16.0 GB");
    assert_eq!(out["processes"].as_array().unwrap().len(), 0);
}

#[test]
fn junos_log_infers_severity_and_mnemonic() {
    let driver = crate::vendors::juniper_junos::JuniperJunosDriver;
    let envelope = json!({"entries": [
        {"month": "Mar", "day": "14", "time": "09:00:01", "facility": "sshd",
         "message": "UI_CHILD_EXITED: child exited with status 1"},
        {"month": "Mar", "day": "14", "time": "09:00:02", "facility": "/kernel",
         "message": "link down on ge-0/0/0"},
    ]});
    let out = driver
        .post_process("log", envelope, &FakeStore::default())
        .unwrap();
    let entries = out["entries"].as_array().unwrap();
    // Newest first.
    assert_eq!(entries[0]["facility"], "kernel");
    assert_eq!(entries[0]["severity"], 2); // "down" keyword
    assert_eq!(entries[1]["mnemonic"], "UI_CHILD_EXITED");
    assert_eq!(entries[1]["severity"], 4); // "exited"
    assert_eq!(entries[1]["timestamp"], "Mar 14 09:00:01");
}

#[test]
fn junos_processes_filter_kernel_threads_and_rank() {
    let driver = crate::vendors::juniper_junos::JuniperJunosDriver;
    let envelope = json!({
        "pid": "1471", "name": "rpd", "wcpu": "5.12", "res": "45M",
        "processes": [
            {"pid": "11", "name": "[idle]", "wcpu": "97.0", "res": "0"},
            {"pid": "1493", "name": "mgd", "wcpu": "0.50", "res": "95432"},
        ],
    });
    let out = driver
        .post_process("cpu", envelope, &FakeStore::default())
        .unwrap();
    let processes = out["processes"].as_array().unwrap();
    assert_eq!(processes.len(), 2, "idle kernel thread dropped");
    assert_eq!(processes[0]["name"], "rpd");
    assert_eq!(processes[0]["cpu_pct"], json!(5.12));
    assert_eq!(processes[0]["holding"], 45 * 1024 * 1024);
    // Bare ps RSS integers are KB.
    assert_eq!(processes[1]["holding"], 95432 * 1024);
}

#[test]
fn junos_interface_maps_unlimited_mtu_and_status() {
    let driver = crate::vendors::juniper_junos::JuniperJunosDriver;
    let envelope = json!({"interfaces": [{
        "interface": "ge-0/0/0",
        "link_status": "up",
        "admin_state": "Enabled",
        "mtu": "unlimited",
        "input_rate": "1.5 Mbps",
    }]});
    let out = driver
        .post_process("interface_detail", envelope, &FakeStore::default())
        .unwrap();
    let intf = &out["interfaces"][0];
    assert_eq!(intf["mtu"], 65535);
    assert_eq!(intf["status"], "up");
    assert_eq!(intf["input_rate_bps"], 1_500_000);
    assert_eq!(intf["output_rate_bps"], 0);
}
