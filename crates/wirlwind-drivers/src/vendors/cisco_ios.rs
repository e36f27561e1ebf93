//! Cisco IOS / IOS-XE driver.
//!
//! Field quirks handled here:
//! - CPU: TextFSM reports `cpu_usage_5_sec`/`cpu_usage_1_min`/`cpu_usage_5_min`;
//!   the published contract wants `five_sec_total`/`one_min`/`five_min`.
//! - Memory: the system template reports parallel per-process lists
//!   (`process_id`, `process_holding`) merged into CPU process rows.
//! - Interface detail: bandwidth arrives as `"1000000 Kbit"`, rates are
//!   already bps but stringly typed.

use crate::error::Result;
use crate::transforms::{
    compute_memory_pct, filter_cpu_processes, finish_interface_row, for_each_row, json_f64,
    merge_memory_into_processes, normalize_bgp_peers, parse_bandwidth_kbps, post_process_log,
};
use crate::VendorDriver;
use serde_json::{Map, Value};
use wirlwind_common::num::{to_f64, to_i64};
use wirlwind_common::{Envelope, StateReader};

pub struct CiscoIosDriver;

impl VendorDriver for CiscoIosDriver {
    fn vendor_id(&self) -> &str {
        "cisco_ios"
    }

    fn aliases(&self) -> &[&str] {
        &["cisco_ios_xe"]
    }

    fn pagination_command(&self) -> &str {
        "terminal length 0"
    }

    fn post_process(
        &self,
        collection: &str,
        mut envelope: Envelope,
        store: &dyn StateReader,
    ) -> Result<Envelope> {
        let Some(obj) = envelope.as_object_mut() else {
            return Ok(envelope);
        };

        match collection {
            "cpu" => {
                normalize_cpu(obj);
                filter_cpu_processes(obj);
                merge_memory_into_processes(obj, store);
            }
            "memory" => compute_memory_pct(obj),
            "log" => post_process_log(obj),
            "bgp_summary" => {
                if let Some(peers) = obj.get_mut("peers").and_then(Value::as_array_mut) {
                    normalize_bgp_peers(peers);
                }
            }
            "interface_detail" => {
                for_each_row(obj, "interfaces", |intf| {
                    let bw_raw = intf
                        .get("bandwidth_raw")
                        .or_else(|| intf.get("bandwidth"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let bw_kbps = parse_bandwidth_kbps(&bw_raw);

                    // Rates are already bps on IOS, just stringly typed.
                    for field in ["input_rate_bps", "output_rate_bps"] {
                        let v = intf.get(field).and_then(to_i64).unwrap_or(0);
                        intf.insert(field.into(), Value::from(v));
                    }
                    finish_interface_row(intf, bw_kbps);
                });
            }
            _ => {}
        }
        Ok(envelope)
    }
}

/// Map IOS CPU fields to the canonical keys, accepting both the normalize
/// map's output and the raw TextFSM names.
fn normalize_cpu(obj: &mut Map<String, Value>) {
    if obj.contains_key("five_sec_total") {
        return;
    }
    for (canonical, candidates) in [
        ("five_sec_total", ["five_sec", "cpu_usage_5_sec"]),
        ("one_min", ["one_min", "cpu_usage_1_min"]),
        ("five_min", ["five_min", "cpu_usage_5_min"]),
    ] {
        let value = candidates
            .iter()
            .filter_map(|k| obj.get(*k))
            .find_map(to_f64);
        if let Some(v) = value {
            obj.insert(canonical.into(), json_f64(v));
        }
    }
}
