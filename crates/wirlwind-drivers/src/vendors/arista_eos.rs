//! Arista EOS driver.
//!
//! EOS telemetry is Linux underneath: CPU and memory come from `show
//! processes top once`, so the driver derives the gauge values from the
//! idle percentage and keeps a top-N process snapshot instead of
//! Cisco-style drop-zero filtering. A `top` snapshot legitimately shows
//! 0.0% for processes idle at the capture instant, and filtering those
//! would empty the table on most polls.

use crate::error::Result;
use crate::transforms::{
    finish_interface_row, for_each_row, infer_capabilities, json_f64, normalize_bgp_peers,
    parse_bandwidth_kbps, parse_rate_to_bps, post_process_log, round1, short_platform_label,
    shorten_interface, strip_fqdn,
};
use crate::VendorDriver;
use serde_json::{Map, Value};
use wirlwind_common::num::{first_numeric, to_f64};
use wirlwind_common::{Envelope, StateReader};

/// Processes kept in the dashboard snapshot.
const TOP_PROCESSES: usize = 20;

pub struct AristaEosDriver;

impl VendorDriver for AristaEosDriver {
    fn vendor_id(&self) -> &str {
        "arista_eos"
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
                build_process_list(obj);
            }
            "memory" => normalize_memory(obj),
            "log" => post_process_log(obj),
            "bgp_summary" => {
                if let Some(peers) = obj.get_mut("peers").and_then(Value::as_array_mut) {
                    normalize_bgp_peers(peers);
                }
            }
            "neighbors" => {
                for_each_row(obj, "neighbors", clean_neighbor);
            }
            "interface_detail" => {
                for_each_row(obj, "interfaces", |intf| {
                    let bw_raw = intf
                        .get("bandwidth_raw")
                        .or_else(|| intf.get("bandwidth"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let bw_kbps = parse_bandwidth_kbps(&bw_raw);

                    // Rates arrive as unit strings ("1.23 Mbps"); the
                    // normalize map parks them in *_raw.
                    for (raw_field, bps_field) in [
                        ("input_rate_raw", "input_rate_bps"),
                        ("output_rate_raw", "output_rate_bps"),
                    ] {
                        let raw = intf
                            .get(raw_field)
                            .or_else(|| intf.get(bps_field))
                            .cloned()
                            .unwrap_or(Value::Null);
                        intf.insert(bps_field.into(), Value::from(parse_rate_to_bps(&raw)));
                        intf.remove(raw_field);
                    }
                    finish_interface_row(intf, bw_kbps);
                });
            }
            _ => {}
        }
        Ok(envelope)
    }
}

/// Gauge values from the `top` header. All field-name spellings are
/// probed: raw TextFSM (`global_cpu_percent_idle`), regex (`idle_pct`) and
/// normalized (`cpu_idle`).
fn normalize_cpu(obj: &mut Map<String, Value>) {
    let idle = first_numeric(obj, &["global_cpu_percent_idle", "idle_pct", "cpu_idle"]);
    let user = first_numeric(obj, &["global_cpu_percent_user", "user_pct", "cpu_usr"]);
    let system = first_numeric(obj, &["global_cpu_percent_system", "system_pct", "cpu_sys"]);

    let total = match (idle, user) {
        (Some(idle), _) => Some(round1(100.0 - idle)),
        (None, Some(user)) => Some(round1(user + system.unwrap_or(0.0))),
        _ => None,
    };

    if let Some(total) = total {
        obj.insert("five_sec_total".into(), json_f64(total));
        for key in ["one_min", "five_min"] {
            if !obj.contains_key(key) {
                obj.insert(key.into(), json_f64(total));
            }
        }
    }
}

/// KiB totals from the `top` header.
fn normalize_memory(obj: &mut Map<String, Value>) {
    let total = first_numeric(obj, &["global_mem_total", "mem_total", "total_kb"]);
    let used = first_numeric(obj, &["global_mem_used", "mem_used", "used_kb"]);
    let free = first_numeric(obj, &["global_mem_free", "mem_free", "free_kb"]);

    let used = match (total, used, free) {
        (Some(t), None, Some(f)) => Some(t - f),
        _ => used,
    };

    let (Some(total), Some(used)) = (total, used) else {
        return;
    };
    if total <= 0.0 {
        return;
    }

    obj.insert("used_pct".into(), json_f64(round1(used / total * 100.0)));
    obj.insert("used".into(), Value::from(used as i64));
    obj.insert("total".into(), Value::from(total as i64));
    let free = free.unwrap_or(total - used);
    obj.insert("free".into(), Value::from(free as i64));
    obj.insert(
        "total_display".into(),
        Value::String(format!("{:.1} GB", total / 1024.0 / 1024.0)),
    );
    obj.insert(
        "used_display".into(),
        Value::String(format!("{:.1} GB", used / 1024.0 / 1024.0)),
    );
}

/// Alias `top` per-process fields to the published contract and keep the
/// top N sorted by CPU then memory. Zero-CPU rows stay.
fn build_process_list(obj: &mut Map<String, Value>) {
    let Some(processes) = obj.get_mut("processes").and_then(Value::as_array_mut) else {
        return;
    };

    for proc in processes.iter_mut() {
        let Some(p) = proc.as_object_mut() else {
            continue;
        };
        let cpu_pct = first_numeric(p, &["percent_cpu", "cpu_pct", "cpu"]).unwrap_or(0.0);
        let name = p
            .get("command")
            .or_else(|| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        p.insert("name".into(), Value::String(name));
        p.insert("cpu_pct".into(), json_f64(cpu_pct));
        p.insert("five_sec".into(), json_f64(cpu_pct));

        if let Some(mem_pct) = first_numeric(p, &["percent_memory", "mem_pct"]) {
            p.insert("mem_pct".into(), json_f64(mem_pct));
        }

        // RES column: KiB, or with a g/m suffix.
        let res = p
            .get("resident_memory_size")
            .or_else(|| p.get("res"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let res_kb = parse_res_kb(&res);
        if res_kb > 0.0 {
            let display = if res_kb > 1_000_000.0 {
                format!("{:.0}M", res_kb / 1024.0)
            } else if res_kb > 1000.0 {
                format!("{res_kb:.0}K")
            } else {
                format!("{res_kb:.0}")
            };
            p.insert("holding_display".into(), Value::String(display));
            p.insert("holding".into(), Value::from((res_kb * 1024.0) as i64));
        }
    }

    processes.sort_by(|a, b| {
        let key = |v: &Value| {
            (
                v.get("cpu_pct").and_then(to_f64).unwrap_or(0.0),
                v.get("mem_pct").and_then(to_f64).unwrap_or(0.0),
            )
        };
        key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal)
    });
    processes.truncate(TOP_PROCESSES);
}

fn parse_res_kb(res: &str) -> f64 {
    let s = res.trim();
    if let Some(num) = s.strip_suffix(['g', 'G']) {
        num.parse::<f64>().unwrap_or(0.0) * 1024.0 * 1024.0
    } else if let Some(num) = s.strip_suffix(['m', 'M']) {
        num.parse::<f64>().unwrap_or(0.0) * 1024.0
    } else {
        s.parse().unwrap_or(0.0)
    }
}

/// LLDP rows for the neighbor graph: bare hostname, short platform label,
/// abbreviated interface names, normalized capabilities.
fn clean_neighbor(nbr: &mut wirlwind_common::Row) {
    let device_id = nbr
        .get("device_id")
        .and_then(Value::as_str)
        .map(strip_fqdn);
    if let Some(device_id) = device_id {
        nbr.insert("device_id".into(), Value::String(device_id));
    }

    let mut platform = nbr
        .get("platform")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if platform.is_empty() {
        platform = nbr
            .get("neighbor_description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
    }
    if let Some(label) = short_platform_label(&platform) {
        platform = label.to_string();
    }
    if !platform.is_empty() {
        nbr.insert("platform".into(), Value::String(platform.clone()));
    }

    for field in ["local_intf", "remote_intf"] {
        let short = nbr
            .get(field)
            .and_then(Value::as_str)
            .map(shorten_interface);
        if let Some(short) = short {
            nbr.insert(field.into(), Value::String(short));
        }
    }

    let caps = match nbr.get("capabilities") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    if !caps.is_empty() {
        nbr.insert("capabilities".into(), Value::String(caps));
    } else if let Some(inferred) = infer_capabilities(&platform) {
        nbr.insert("capabilities".into(), Value::String(inferred.to_string()));
    }
}
