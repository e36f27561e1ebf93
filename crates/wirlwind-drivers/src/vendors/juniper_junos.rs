//! Juniper JunOS driver.
//!
//! Differences from the Cisco/Arista drivers:
//! - CPU and memory both come from `show chassis routing-engine`; process
//!   data needs its own `show system processes extensive` poll.
//! - Dual routing engines produce two rows; the master RE wins.
//! - `show log messages` is BSD syslog with no numeric severity; severity
//!   is inferred from keywords.
//! - JunOS reports instantaneous CPU only, so the 1-min/5-min gauges reuse
//!   the 5-second value.

use crate::error::Result;
use crate::transforms::{
    extract_mnemonic, finish_interface_row, for_each_row, json_f64, normalize_bgp_peers,
    parse_bandwidth_kbps, parse_rate_to_bps, round1, shorten_interface, strip_fqdn,
    MAX_LOG_ENTRIES,
};
use crate::VendorDriver;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use wirlwind_common::num::{first_numeric, to_f64, to_i64};
use wirlwind_common::{Envelope, Row, StateReader};

/// Processes kept for the dashboard widget.
const TOP_PROCESSES: usize = 15;

/// Keyword → BSD severity, most severe first. First match wins per tier;
/// the lowest severity seen anywhere in the line is kept.
const SEVERITY_KEYWORDS: &[(&str, i64)] = &[
    ("kernel panic", 0),
    ("panic", 0),
    ("core dumped", 1),
    ("fatal", 1),
    ("abort", 1),
    ("down", 2),
    ("failed", 3),
    ("failure", 3),
    ("error", 3),
    ("warning", 4),
    ("warn", 4),
    ("exceeded", 4),
    ("threshold", 4),
    ("mismatch", 4),
    ("timeout", 4),
    ("closed", 4),
    ("exited", 4),
    ("accepted", 5),
    ("established", 5),
    ("logged in", 5),
];

/// Kernel threads and system idle filtered out of the process list.
const KERNEL_NAMES: &[&str] = &["idle", "swapper", "kernel", "init"];
const KERNEL_PREFIXES: &[&str] = &[
    "swi", "irq", "g_", "em0", "em1", "kqueue", "thread", "mastersh", "yarrow", "busdma",
];

/// Memory sizes with a unit suffix from top(1): `"45M"`, `"1.5G"`. Bare
/// integers are BSD ps RSS values in KB.
static RES_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)^([\d.]+)\s*([KMGT])B?$").expect("static pattern"));

pub struct JuniperJunosDriver;

impl VendorDriver for JuniperJunosDriver {
    fn vendor_id(&self) -> &str {
        "juniper_junos"
    }

    fn pagination_command(&self) -> &str {
        "set cli screen-length 0"
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
                post_process_processes(obj);
            }
            "memory" => {
                pick_master_re(obj);
                normalize_memory(obj);
            }
            "log" => post_process_log_junos(obj),
            "bgp_summary" => {
                if let Some(peers) = obj.get_mut("peers").and_then(Value::as_array_mut) {
                    normalize_bgp_peers(peers);
                }
            }
            "neighbors" => {
                for_each_row(obj, "neighbors", clean_neighbor);
            }
            "interface_detail" => {
                for_each_row(obj, "interfaces", post_process_interface);
            }
            _ => {}
        }
        Ok(envelope)
    }
}

// ── CPU ─────────────────────────────────────────────────────────────

fn normalize_cpu(obj: &mut Map<String, Value>) {
    let idle = obj.get("cpu_idle").and_then(to_f64);
    let user = obj.get("cpu_user").and_then(to_f64);
    let kernel = first_numeric(obj, &["cpu_kernel", "cpu_sys"]);
    let interrupt = obj.get("cpu_interrupt").and_then(to_f64);
    let background = obj.get("cpu_background").and_then(to_f64);

    let total = match (idle, user) {
        (Some(idle), _) => Some(round1(100.0 - idle)),
        (None, Some(user)) => Some(round1(
            user + kernel.unwrap_or(0.0) + interrupt.unwrap_or(0.0) + background.unwrap_or(0.0),
        )),
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

// ── Memory ──────────────────────────────────────────────────────────

/// Dual-RE handling. The shaper hoists row 0 and parks the other RE rows
/// under `processes`; when row 0 is the backup and a parked row is the
/// master, the master row takes over. `show chassis routing-engine` has no
/// real process data, so `processes` is cleared either way.
fn pick_master_re(obj: &mut Map<String, Value>) {
    let parked = obj
        .remove("processes")
        .and_then(|v| match v {
            Value::Array(rows) => Some(rows),
            _ => None,
        })
        .unwrap_or_default();

    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase();

    if status == "backup" {
        for row in parked {
            let Some(master) = row.as_object() else {
                continue;
            };
            let row_status = master
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
            if row_status == "master" {
                let slot = master.get("slot").and_then(Value::as_str).unwrap_or("?");
                tracing::info!(
                    slot,
                    "Dual-RE: promoting master routing engine over backup"
                );
                obj.clear();
                obj.extend(master.clone());
                break;
            }
        }
    }
    obj.insert("processes".into(), Value::Array(Vec::new()));
}

/// `memory_utilization` is already a percentage; `dram` is total MB.
fn normalize_memory(obj: &mut Map<String, Value>) {
    let Some(pct) = first_numeric(obj, &["memory_utilization", "used_pct"]) else {
        return;
    };
    obj.insert("used_pct".into(), json_f64(round1(pct)));

    let Some(dram_mb) = first_numeric(obj, &["dram", "mem_total"]) else {
        return;
    };
    if dram_mb <= 0.0 {
        return;
    }
    let used_mb = round1(dram_mb * pct / 100.0);
    let display = |mb: f64| {
        if mb >= 1024.0 {
            format!("{:.1} GB", mb / 1024.0)
        } else {
            format!("{} MB", mb as i64)
        }
    };
    obj.insert("total_display".into(), Value::String(display(dram_mb)));
    obj.insert("used_display".into(), Value::String(display(used_mb)));
    obj.insert("total".into(), Value::from((dram_mb * 1024.0) as i64));
    obj.insert("used".into(), Value::from((used_mb * 1024.0) as i64));
    obj.insert(
        "free".into(),
        Value::from(((dram_mb - used_mb) * 1024.0) as i64),
    );
}

// ── Processes ───────────────────────────────────────────────────────

/// top(1) `"45M"` → bytes; bare integers are ps RSS in KB.
fn parse_res_to_bytes(res: &str) -> i64 {
    let s = res.trim();
    if s.is_empty() || s == "0" {
        return 0;
    }
    if let Some(caps) = RES_PATTERN.captures(s) {
        let value: f64 = caps[1].parse().unwrap_or(0.0);
        let multiplier: f64 = match caps[2].to_lowercase().as_str() {
            "k" => 1024.0,
            "m" => 1024f64.powi(2),
            "g" => 1024f64.powi(3),
            _ => 1024f64.powi(4),
        };
        return (value * multiplier) as i64;
    }
    s.parse::<i64>().map(|kb| kb * 1024).unwrap_or(0)
}

const ROW0_PROCESS_FIELDS: &[&str] = &[
    "pid", "username", "pri", "nice", "size", "res", "rss", "state", "time", "wcpu", "name",
    "command", "uid", "ppid", "cpu_sched", "stat", "started", "tt", "wchan",
];

/// Rebuild the full process list (the shaper flattened row 0 into the top
/// level), filter kernel threads, keep the top N by CPU then memory.
fn post_process_processes(obj: &mut Map<String, Value>) {
    let mut all_rows: Vec<Value> = obj
        .get("processes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if obj.get("pid").is_some_and(|v| !v.is_null()) {
        let mut row0 = Map::new();
        for key in ROW0_PROCESS_FIELDS {
            if let Some(v) = obj.get(*key) {
                row0.insert(key.to_string(), v.clone());
            }
        }
        all_rows.insert(0, Value::Object(row0));
    }

    let mut normalized: Vec<(f64, i64, Value)> = Vec::new();
    for proc in &all_rows {
        let Some(p) = proc.as_object() else {
            continue;
        };
        let name = p
            .get("name")
            .or_else(|| p.get("command"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let clean_name = name.trim_matches(['[', ']']).trim();
        let lower = clean_name.to_lowercase();
        if KERNEL_NAMES.contains(&lower.as_str())
            || KERNEL_PREFIXES.iter().any(|pfx| lower.starts_with(pfx))
        {
            continue;
        }

        let cpu_pct = p
            .get("wcpu")
            .or_else(|| p.get("cpu_pct"))
            .and_then(to_f64)
            .unwrap_or(0.0);
        let res = p
            .get("res")
            .or_else(|| p.get("rss"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let holding = parse_res_to_bytes(&res);

        let pid = p
            .get("pid")
            .and_then(to_i64)
            .map(Value::from)
            .or_else(|| p.get("pid").cloned())
            .unwrap_or(Value::String(String::new()));

        let mut row = Map::new();
        row.insert("pid".into(), pid);
        row.insert("name".into(), Value::String(clean_name.to_string()));
        row.insert("cpu_pct".into(), json_f64((cpu_pct * 100.0).round() / 100.0));
        row.insert("holding".into(), Value::from(holding));
        normalized.push((cpu_pct, holding, Value::Object(row)));
    }

    normalized.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
    });
    let top: Vec<Value> = normalized
        .into_iter()
        .take(TOP_PROCESSES)
        .map(|(_, _, row)| row)
        .collect();
    obj.insert("processes".into(), Value::Array(top));
}

// ── Log ─────────────────────────────────────────────────────────────

/// BSD syslog rows into the published log contract: assembled timestamp,
/// mnemonic from the structured event name (or the daemon), severity
/// inferred from keywords.
fn post_process_log_junos(obj: &mut Map<String, Value>) {
    let Some(entries) = obj.get_mut("entries").and_then(Value::as_array_mut) else {
        return;
    };

    let mut processed: Vec<Value> = Vec::with_capacity(entries.len());
    for entry in entries.iter() {
        let Some(e) = entry.as_object() else {
            continue;
        };
        let field = |k: &str| e.get(k).and_then(Value::as_str).unwrap_or("").to_string();

        let timestamp = format!("{} {} {}", field("month"), field("day"), field("time"))
            .trim()
            .to_string();
        let facility = field("facility");
        let message = field("message");

        let mnemonic = extract_mnemonic(&message).unwrap_or_else(|| {
            let daemon = facility.trim_matches('/').to_uppercase();
            if daemon.is_empty() {
                "SYSTEM".to_string()
            } else {
                daemon
            }
        });

        let text = format!("{facility} {message}").to_lowercase();
        let mut severity: i64 = if facility == "/kernel" { 4 } else { 6 };
        for (keyword, sev) in SEVERITY_KEYWORDS {
            if *sev < severity && text.contains(keyword) {
                severity = *sev;
            }
        }

        let facility = facility.trim_matches('/');
        processed.push(serde_json::json!({
            "timestamp": timestamp,
            "facility": if facility.is_empty() { "system" } else { facility },
            "severity": severity,
            "mnemonic": mnemonic,
            "message": message,
        }));
    }

    processed.reverse();
    processed.truncate(MAX_LOG_ENTRIES);
    *entries = processed;
}

// ── Neighbors ───────────────────────────────────────────────────────

/// JunOS LLDP summaries carry no platform or capability TLVs; both are
/// inferred, lossily, from whatever description is present.
fn clean_neighbor(nbr: &mut Row) {
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
        let desc = nbr
            .get("neighbor_description")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !desc.is_empty() {
            platform = crate::transforms::short_platform_label(desc)
                .map(str::to_string)
                .unwrap_or_else(|| desc.chars().take(40).collect());
        }
        if !platform.is_empty() {
            nbr.insert("platform".into(), Value::String(platform.clone()));
        }
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

    let caps = nbr
        .get("capabilities")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if caps.is_empty() && !platform.is_empty() {
        let lower = platform.to_lowercase();
        let inferred = if ["router", "mx", "srx", "ptx"].iter().any(|k| lower.contains(k)) {
            Some("Router")
        } else if ["switch", "ex", "qfx"].iter().any(|k| lower.contains(k)) {
            Some("Switch")
        } else {
            None
        };
        if let Some(caps) = inferred {
            nbr.insert("capabilities".into(), Value::String(caps.to_string()));
        }
    } else if !caps.is_empty() {
        nbr.insert("capabilities".into(), Value::String(caps));
    }
}

// ── Interface detail ────────────────────────────────────────────────

fn post_process_interface(intf: &mut Row) {
    let bw_raw = intf
        .get("bandwidth_raw")
        .or_else(|| intf.get("bandwidth"))
        .cloned()
        .unwrap_or(Value::Null);
    let bw_kbps = parse_bandwidth_kbps(&bw_raw);

    for field in ["input_rate_bps", "output_rate_bps"] {
        let raw = intf
            .get(field)
            .or_else(|| intf.get(field.trim_end_matches("_bps")))
            .cloned()
            .unwrap_or(Value::Null);
        intf.insert(field.into(), Value::from(parse_rate_to_bps(&raw)));
    }

    // "unlimited" MTU on internal interfaces.
    if intf
        .get("mtu")
        .and_then(Value::as_str)
        .is_some_and(|m| m.eq_ignore_ascii_case("unlimited"))
    {
        intf.insert("mtu".into(), Value::from(65535));
    }

    if !intf.contains_key("status") {
        let admin = intf
            .get("admin_state")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let link = intf
            .get("link_status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let status = if admin == "disabled" || admin == "down" {
            "admin down".to_string()
        } else {
            link
        };
        intf.insert("status".into(), Value::String(status));
    }

    finish_interface_row(intf, bw_kbps);
}
