//! Vendor-agnostic transforms shared by the drivers.
//!
//! The normalize map in the collection YAML should already have mapped
//! vendor fields to canonical names; these helpers still probe the raw
//! TextFSM names so an unmapped field does not lose the metric.

use serde_json::{Map, Value};
use std::sync::LazyLock;
use wirlwind_common::num::{first_numeric, to_f64, to_i64};
use wirlwind_common::{Envelope, Row, StateReader};

/// Newest-first log entries kept after post-processing.
pub const MAX_LOG_ENTRIES: usize = 50;

/// Rate strings: `"1234 bps"`, `"1.23 Kbps"`, `"5.67 Mbps"`, `"1.2 Gbps"`.
static RATE_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)([\d.]+)\s*([KMG]?bps)").expect("static pattern"));

/// Numeric Kbps out of a bandwidth field: `"1000000 Kbit"`, `"100000 Kbit/sec"`.
static BW_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d+)\s*[Kk]").expect("static pattern"));

/// Structured syslog event names: `ALL_CAPS_WITH_UNDERSCORES: ...`.
static MNEMONIC_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^([A-Z][A-Z0-9_]{2,}):\s*").expect("static pattern"));

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn json_f64(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// The common transforms every driver applies unless it overrides the
/// collection entirely. Also the whole behavior of the fallback driver.
pub fn common_post_process(collection: &str, mut envelope: Envelope) -> Envelope {
    if let Some(obj) = envelope.as_object_mut() {
        match collection {
            "memory" => compute_memory_pct(obj),
            "log" => post_process_log(obj),
            "bgp_summary" => {
                if let Some(peers) = obj.get_mut("peers").and_then(Value::as_array_mut) {
                    normalize_bgp_peers(peers);
                }
            }
            _ => {}
        }
    }
    envelope
}

// ── Memory ──────────────────────────────────────────────────────────

/// Compute `used_pct` from whichever memory fields are present:
/// `{total_bytes, used_bytes}`, `{total_kb, used_kb}` or
/// `{total, used, free}`; used derives from total minus free when missing.
pub fn compute_memory_pct(obj: &mut Map<String, Value>) {
    let total = first_numeric(obj, &["total_bytes", "total_kb", "total_mb", "total", "memory_total"]);
    let used = first_numeric(obj, &["used_bytes", "used_kb", "used_mb", "used", "memory_used"]);
    let free = first_numeric(obj, &["free_bytes", "free", "free_kb", "memory_free"]);

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

    let (divisor, unit) = if total > 1_000_000_000.0 {
        (1024f64.powi(3), "GB")
    } else if total > 1_000_000.0 {
        (1024f64.powi(2), "MB")
    } else if total > 1_000.0 {
        (1024.0, "KB")
    } else {
        return;
    };
    obj.insert(
        "total_display".into(),
        Value::String(format!("{:.1} {unit}", total / divisor)),
    );
    obj.insert(
        "used_display".into(),
        Value::String(format!("{:.1} {unit}", used / divisor)),
    );
}

// ── BGP ─────────────────────────────────────────────────────────────

/// Normalize peer rows: the `state_pfx` field is either a state word
/// ("Idle", "Active") or a number, which means established with that many
/// prefixes received.
pub fn normalize_bgp_peers(peers: &mut [Value]) {
    for peer in peers.iter_mut() {
        let Some(obj) = peer.as_object_mut() else {
            continue;
        };
        if let Some(neighbor) = obj.get("neighbor").and_then(Value::as_str) {
            let trimmed = neighbor.trim().to_string();
            obj.insert("neighbor".into(), Value::String(trimmed));
        }
        let state_pfx = obj
            .get("state_pfx")
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        match state_pfx.parse::<i64>() {
            Ok(count) => {
                obj.insert("state".into(), Value::String("Established".into()));
                obj.insert("prefixes_rcvd".into(), Value::from(count));
            }
            Err(_) => {
                let state = if state_pfx.is_empty() {
                    "Unknown".to_string()
                } else {
                    state_pfx
                };
                obj.insert("state".into(), Value::String(state));
                obj.insert("prefixes_rcvd".into(), Value::from(0));
            }
        }
    }
}

// ── Log ─────────────────────────────────────────────────────────────

/// Assemble timestamps, coerce severity, order newest-first, trim.
///
/// Timestamp assembly only fires when `month`, `day` and `time` are all
/// present; with any component missing the raw `timestamp` field (if one
/// exists) passes through untouched.
pub fn post_process_log(obj: &mut Map<String, Value>) {
    let Some(entries) = obj.get_mut("entries").and_then(Value::as_array_mut) else {
        return;
    };

    for entry in entries.iter_mut() {
        let Some(e) = entry.as_object_mut() else {
            continue;
        };

        if !e.contains_key("timestamp") {
            let parts: Vec<String> = ["month", "day", "time"]
                .iter()
                .filter_map(|k| e.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if parts.len() == 3 {
                let mut ts = parts.join(" ");
                if let Some(tz) = e.get("timezone").and_then(Value::as_str) {
                    if !tz.is_empty() {
                        ts = format!("{ts} {tz}");
                    }
                }
                e.insert("timestamp".into(), Value::String(ts));
            }
        }

        // Multi-line messages arrive as arrays from some templates.
        if let Some(Value::Array(parts)) = e.get("message") {
            let joined = parts
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            e.insert("message".into(), Value::String(joined));
        }

        if let Some(sev) = e.get("severity").and_then(to_i64) {
            e.insert("severity".into(), Value::from(sev.clamp(0, 7)));
        }
    }

    entries.reverse();
    entries.truncate(MAX_LOG_ENTRIES);
}

/// Extract a structured mnemonic (`UI_CHILD_EXITED:` style prefix).
pub fn extract_mnemonic(message: &str) -> Option<String> {
    MNEMONIC_PATTERN
        .captures(message)
        .map(|c| c[1].to_string())
}

// ── CPU processes ───────────────────────────────────────────────────

/// Drop idle processes and add the short aliases the published contract
/// expects (`pid`, `name`, `cpu_pct`, `five_sec`).
///
/// This is the Cisco-style filter: `show processes cpu sorted` reports
/// averaged per-process CPU, so zero means genuinely idle. Rows whose CPU
/// cannot be parsed are kept rather than silently discarded.
pub fn filter_cpu_processes(obj: &mut Map<String, Value>) {
    let Some(processes) = obj.get_mut("processes").and_then(Value::as_array_mut) else {
        return;
    };

    processes.retain_mut(|proc| {
        let Some(p) = proc.as_object_mut() else {
            return false;
        };
        let cpu_5s = ["process_cpu_usage_5_sec", "cpu_pct", "five_sec"]
            .iter()
            .filter_map(|k| p.get(*k))
            .find_map(to_f64);

        let Some(cpu_5s) = cpu_5s else {
            return true;
        };
        if cpu_5s <= 0.0 {
            return false;
        }

        let pid = p
            .get("pid")
            .or_else(|| p.get("process_pid"))
            .cloned()
            .unwrap_or(Value::String(String::new()));
        let name = p
            .get("name")
            .or_else(|| p.get("process_name"))
            .cloned()
            .unwrap_or(Value::String(String::new()));
        p.insert("pid".into(), pid);
        p.insert("name".into(), name);
        p.insert("cpu_pct".into(), json_f64(cpu_5s));
        p.insert("five_sec".into(), json_f64(cpu_5s));

        for (alias, raw) in [
            ("cpu_1min", "process_cpu_usage_1_min"),
            ("cpu_5min", "process_cpu_usage_5_min"),
        ] {
            let v = p
                .get(alias)
                .or_else(|| p.get(raw))
                .and_then(to_f64)
                .unwrap_or(0.0);
            p.insert(alias.into(), json_f64(v));
        }
        true
    });
}

/// Join per-process memory holdings from the `memory` collection into CPU
/// process rows by PID. The memory template reports parallel lists
/// (`process_id`, `process_holding`); mismatched lengths abort quietly.
pub fn merge_memory_into_processes(obj: &mut Map<String, Value>, store: &dyn StateReader) {
    let Some(memory) = store.latest("memory") else {
        return;
    };
    let (Some(pids), Some(holdings)) = (
        memory.get("process_id").and_then(Value::as_array),
        memory.get("process_holding").and_then(Value::as_array),
    ) else {
        return;
    };
    if pids.is_empty() || pids.len() != holdings.len() {
        return;
    }

    let by_pid: std::collections::HashMap<String, i64> = pids
        .iter()
        .zip(holdings)
        .filter_map(|(pid, holding)| {
            let pid = pid.as_str().map(str::to_string).or_else(|| Some(pid.to_string()))?;
            Some((pid, to_i64(holding)?))
        })
        .collect();

    let Some(processes) = obj.get_mut("processes").and_then(Value::as_array_mut) else {
        return;
    };
    for proc in processes {
        let Some(p) = proc.as_object_mut() else {
            continue;
        };
        let pid = p
            .get("pid")
            .or_else(|| p.get("process_pid"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        if let Some(holding) = by_pid.get(&pid) {
            p.insert("holding".into(), Value::from(*holding));
        }
    }
}

// ── Interfaces ──────────────────────────────────────────────────────

/// Convert a rate value with units to integer bits/second.
///
/// Accepts bare integers and floats (already bps) and strings with
/// `bps`/`Kbps`/`Mbps`/`Gbps` suffixes. Unparseable input becomes 0.
pub fn parse_rate_to_bps(value: &Value) -> i64 {
    let s = match value {
        Value::Null => return 0,
        Value::Number(n) => return n.as_f64().map(|f| f as i64).unwrap_or(0),
        Value::String(s) => s.trim(),
        _ => return 0,
    };
    if s.is_empty() {
        return 0;
    }
    if let Ok(n) = s.parse::<i64>() {
        return n;
    }
    if let Ok(f) = s.parse::<f64>() {
        return f as i64;
    }
    if let Some(caps) = RATE_PATTERN.captures(s) {
        let value: f64 = caps[1].parse().unwrap_or(0.0);
        let multiplier = match caps[2].to_lowercase().as_str() {
            "kbps" => 1_000.0,
            "mbps" => 1_000_000.0,
            "gbps" => 1_000_000_000.0,
            _ => 1.0,
        };
        return (value * multiplier) as i64;
    }
    0
}

/// Numeric Kbps out of a bandwidth string like `"1000000 Kbit"`.
pub fn parse_bandwidth_kbps(value: &Value) -> i64 {
    let s = match value {
        Value::Number(n) => return n.as_f64().map(|f| f as i64).unwrap_or(0),
        Value::String(s) => s,
        _ => return 0,
    };
    BW_PATTERN
        .captures(s)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// Final pass over one interface_detail row: integer error counters and
/// MTU, utilization from the peak rate, intermediate fields dropped.
///
/// Expects `input_rate_bps`/`output_rate_bps` already set by the caller
/// (rate unit handling is vendor-specific).
pub fn finish_interface_row(intf: &mut Map<String, Value>, bw_kbps: i64) {
    intf.insert("bandwidth_kbps".into(), Value::from(bw_kbps));

    for field in ["in_errors", "out_errors", "crc_errors"] {
        let v = intf.get(field).and_then(to_i64).unwrap_or(0);
        intf.insert(field.into(), Value::from(v));
    }

    let mtu = intf.get("mtu").and_then(to_i64).unwrap_or(0);
    intf.insert("mtu".into(), Value::from(mtu));

    let input = intf.get("input_rate_bps").and_then(to_i64).unwrap_or(0);
    let output = intf.get("output_rate_bps").and_then(to_i64).unwrap_or(0);
    let utilization = if bw_kbps > 0 {
        round1(input.max(output) as f64 / (bw_kbps * 1000) as f64 * 100.0)
    } else {
        0.0
    };
    intf.insert("utilization_pct".into(), json_f64(utilization));

    intf.remove("bandwidth_raw");
}

// ── Neighbors ───────────────────────────────────────────────────────

const INTF_SHORT: &[(&str, &str)] = &[
    ("TwentyFiveGigE", "Twe"),
    ("TenGigabitEthernet", "Te"),
    ("HundredGigE", "Hu"),
    ("FortyGigabitEthernet", "Fo"),
    ("GigabitEthernet", "Gi"),
    ("FastEthernet", "Fa"),
    ("Port-Channel", "Po"),
    ("Management", "Ma"),
    ("Loopback", "Lo"),
    ("Ethernet", "Et"),
    ("Vlan", "Vl"),
];

/// Abbreviate a long-form interface name for graph edge labels.
pub fn shorten_interface(intf: &str) -> String {
    for &(long, short) in INTF_SHORT {
        if intf.starts_with(long) {
            return intf.replacen(long, short, 1);
        }
    }
    intf.to_string()
}

/// Strip the domain suffix from an LLDP/CDP system name, leaving bare IP
/// addresses alone.
pub fn strip_fqdn(device_id: &str) -> String {
    if device_id.contains('.') && !device_id.replace('.', "").chars().all(|c| c.is_ascii_digit()) {
        device_id
            .split('.')
            .next()
            .unwrap_or(device_id)
            .to_string()
    } else {
        device_id.to_string()
    }
}

/// Derive a short platform label from a verbose LLDP system description.
pub fn short_platform_label(description: &str) -> Option<&'static str> {
    let lower = description.to_lowercase();
    if lower.contains("arista") {
        Some("Arista EOS")
    } else if lower.contains("cisco") && lower.contains("nx-os") {
        Some("Cisco NX-OS")
    } else if lower.contains("cisco") && lower.contains("ios-xe") {
        Some("Cisco IOS-XE")
    } else if lower.contains("cisco") {
        Some("Cisco IOS")
    } else if lower.contains("juniper") || lower.contains("junos") {
        Some("Juniper JunOS")
    } else {
        None
    }
}

/// Infer a capability class from the platform string.
///
/// Lossy heuristic: LLDP summaries on some vendors carry no capability
/// TLV, so "Router"/"Switch" substrings in the platform are the only
/// signal. Neither matching leaves the field absent and the consumer
/// renders an unknown node type.
pub fn infer_capabilities(platform: &str) -> Option<&'static str> {
    let lower = platform.to_lowercase();
    if lower.contains("router") {
        Some("Router")
    } else if lower.contains("switch") {
        Some("Switch")
    } else {
        None
    }
}

/// Helper for drivers: mutate each object in a list field.
pub fn for_each_row(obj: &mut Map<String, Value>, key: &str, mut f: impl FnMut(&mut Row)) {
    if let Some(list) = obj.get_mut(key).and_then(Value::as_array_mut) {
        for item in list {
            if let Some(row) = item.as_object_mut() {
                f(row);
            }
        }
    }
}
