//! Cisco NX-OS driver.
//!
//! NX-OS CPU comes from `show system resources`, which reports user/kernel/
//! idle percentages instead of the IOS 5-sec/1-min/5-min averages.

use crate::error::Result;
use crate::transforms::{
    compute_memory_pct, filter_cpu_processes, json_f64, normalize_bgp_peers, post_process_log,
    round1,
};
use crate::VendorDriver;
use serde_json::{Map, Value};
use wirlwind_common::num::to_f64;
use wirlwind_common::{Envelope, StateReader};

pub struct CiscoNxosDriver;

impl VendorDriver for CiscoNxosDriver {
    fn vendor_id(&self) -> &str {
        "cisco_nxos"
    }

    fn pagination_command(&self) -> &str {
        "terminal length 0"
    }

    fn post_process(
        &self,
        collection: &str,
        mut envelope: Envelope,
        _store: &dyn StateReader,
    ) -> Result<Envelope> {
        let Some(obj) = envelope.as_object_mut() else {
            return Ok(envelope);
        };

        match collection {
            "cpu" => {
                normalize_cpu(obj);
                filter_cpu_processes(obj);
            }
            "memory" => compute_memory_pct(obj),
            "log" => post_process_log(obj),
            "bgp_summary" => {
                if let Some(peers) = obj.get_mut("peers").and_then(Value::as_array_mut) {
                    normalize_bgp_peers(peers);
                }
            }
            _ => {}
        }
        Ok(envelope)
    }
}

/// Total CPU from the idle percentage; user + kernel as the fallback. The
/// same instantaneous value backs all three gauge keys.
fn normalize_cpu(obj: &mut Map<String, Value>) {
    let total = if let Some(idle) = obj.get("idle_pct").and_then(to_f64) {
        Some(round1(100.0 - idle))
    } else {
        obj.get("user_pct").and_then(to_f64).map(|user| {
            let system = obj.get("system_pct").and_then(to_f64).unwrap_or(0.0);
            round1(user + system)
        })
    };

    if let Some(total) = total {
        for key in ["five_sec_total", "one_min", "five_min"] {
            if !obj.contains_key(key) {
                obj.insert(key.into(), json_f64(total));
            }
        }
    }
}
