//! Structured audit log for the parser chain.
//!
//! One [`ParseTrace`] accumulates per poll cycle and collection: what was
//! sent, what came back, what sanitization removed, every template tried
//! and why it failed, what normalize/coerce changed, and what was finally
//! delivered. Completed traces land in a [`TraceStore`] ring buffer and are
//! emitted through `tracing`: a one-line summary at info/warn, the full
//! record as JSON at debug.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;
use wirlwind_common::ParserKind;

const RAW_PREVIEW_CHARS: usize = 200;

/// One step in the pipeline, in execution order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TraceStep {
    Raw {
        length: usize,
        command: String,
    },
    Sanitize {
        original_len: usize,
        cleaned_len: usize,
        lines_stripped: usize,
    },
    Resolve {
        template: String,
        resolved: Option<String>,
        tier: Option<String>,
    },
    Parse {
        parser: ParserKind,
        template: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        resolved_path: Option<String>,
        success: bool,
        rows: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<String>,
    },
    Normalize {
        before: Vec<String>,
        after: Vec<String>,
    },
    Coerce {
        changes: BTreeMap<String, String>,
    },
    PostProcess {
        transform: String,
    },
}

/// Final outcome delivered to the state store.
#[derive(Debug, Clone, Serialize)]
pub struct TraceResult {
    pub parsed_by: ParserKind,
    pub template: Option<String>,
    pub fields: Vec<String>,
    pub rows: usize,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A completed, serializable trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub collection: String,
    pub vendor: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub raw_len: usize,
    pub raw_preview: String,
    pub steps: Vec<TraceStep>,
    pub result: TraceResult,
}

/// Accumulates parse provenance for one collection poll.
pub struct ParseTrace {
    collection: String,
    vendor: String,
    command: String,
    started: Instant,
    timestamp: DateTime<Utc>,
    raw_len: usize,
    raw_preview: String,
    steps: Vec<TraceStep>,
    result: Option<TraceResult>,
}

impl ParseTrace {
    pub fn new(collection: &str, vendor: &str) -> Self {
        Self {
            collection: collection.to_string(),
            vendor: vendor.to_string(),
            command: String::new(),
            started: Instant::now(),
            timestamp: Utc::now(),
            raw_len: 0,
            raw_preview: String::new(),
            steps: Vec::new(),
            result: None,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    // ── Recording steps ──────────────────────────────────────────

    pub fn raw_received(&mut self, raw: &str, command: &str) {
        self.command = command.to_string();
        self.raw_len = raw.len();
        self.raw_preview = raw
            .chars()
            .take(RAW_PREVIEW_CHARS)
            .collect::<String>()
            .replace('\n', "\\n");
        self.steps.push(TraceStep::Raw {
            length: self.raw_len,
            command: command.to_string(),
        });
    }

    pub fn sanitized(&mut self, cleaned_len: usize, lines_stripped: usize) {
        self.steps.push(TraceStep::Sanitize {
            original_len: self.raw_len,
            cleaned_len,
            lines_stripped,
        });
    }

    pub fn template_resolved(
        &mut self,
        template: &str,
        resolved: Option<&std::path::Path>,
        tier: Option<String>,
    ) {
        self.steps.push(TraceStep::Resolve {
            template: template.to_string(),
            resolved: resolved.map(|p| p.display().to_string()),
            tier,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn parser_tried(
        &mut self,
        parser: ParserKind,
        template: &str,
        resolved_path: Option<String>,
        success: bool,
        rows: usize,
        reason: Option<String>,
        fields: Vec<String>,
    ) {
        self.steps.push(TraceStep::Parse {
            parser,
            template: template.to_string(),
            resolved_path,
            success,
            rows,
            reason,
            fields,
        });
    }

    pub fn normalized(&mut self, before: Vec<String>, after: Vec<String>) {
        self.steps.push(TraceStep::Normalize { before, after });
    }

    pub fn coerced(&mut self, changes: BTreeMap<String, String>) {
        self.steps.push(TraceStep::Coerce { changes });
    }

    pub fn post_processed(&mut self, transform: &str) {
        self.steps.push(TraceStep::PostProcess {
            transform: transform.to_string(),
        });
    }

    /// Record final delivery. Must be called exactly once, last.
    pub fn delivered(
        &mut self,
        parsed_by: ParserKind,
        template: Option<String>,
        fields: Vec<String>,
        rows: usize,
        error: Option<String>,
    ) {
        self.result = Some(TraceResult {
            parsed_by,
            template,
            fields,
            rows,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            error,
        });
    }

    // ── Queries used by the chain and tests ──────────────────────

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn parsers_tried(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, TraceStep::Parse { .. }))
            .count()
    }

    pub fn parsers_failed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, TraceStep::Parse { success: false, .. }))
            .count()
    }

    // ── Output ───────────────────────────────────────────────────

    pub fn into_record(self) -> TraceRecord {
        let result = self.result.unwrap_or(TraceResult {
            parsed_by: ParserKind::None,
            template: None,
            fields: Vec::new(),
            rows: 0,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            error: Some("trace incomplete".to_string()),
        });
        TraceRecord {
            collection: self.collection,
            vendor: self.vendor,
            command: self.command,
            timestamp: self.timestamp,
            raw_len: self.raw_len,
            raw_preview: self.raw_preview,
            steps: self.steps,
            result,
        }
    }
}

impl TraceRecord {
    /// Emit the one-line summary plus the full record at debug level.
    pub fn emit(&self) {
        let r = &self.result;
        if r.parsed_by == ParserKind::None || r.error.is_some() {
            tracing::warn!(
                collection = %self.collection,
                parsed_by = %r.parsed_by,
                rows = r.rows,
                duration_ms = r.duration_ms,
                error = r.error.as_deref().unwrap_or(""),
                "TRACE"
            );
        } else {
            tracing::info!(
                collection = %self.collection,
                parsed_by = %r.parsed_by,
                template = r.template.as_deref().unwrap_or(""),
                rows = r.rows,
                fields = r.fields.len(),
                duration_ms = r.duration_ms,
                "TRACE"
            );
        }
        if let Ok(detail) = serde_json::to_string(self) {
            tracing::debug!(detail = %detail, "TRACE_DETAIL");
        }
    }

    pub fn failed(&self) -> bool {
        self.result.parsed_by == ParserKind::None || self.result.error.is_some()
    }
}

/// Per-collection parse health, for the diagnostic summary.
#[derive(Debug, Clone, Serialize)]
pub struct TraceHealth {
    pub last_parsed_by: ParserKind,
    pub last_template: Option<String>,
    pub last_error: Option<String>,
    pub last_duration_ms: f64,
    pub recent_failures: usize,
    pub total_traces: usize,
}

/// Ring buffer of recent traces per collection.
///
/// Writes happen on the engine's hot path and must not block; the mutex is
/// only ever contended by diagnostic readers.
pub struct TraceStore {
    max_per_collection: usize,
    traces: Mutex<HashMap<String, VecDeque<TraceRecord>>>,
}

impl TraceStore {
    pub fn new(max_per_collection: usize) -> Self {
        Self {
            max_per_collection,
            traces: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, record: TraceRecord) {
        let mut traces = self.traces.lock().expect("trace store poisoned");
        let ring = traces.entry(record.collection.clone()).or_default();
        if ring.len() >= self.max_per_collection {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// The N most recent traces for a collection, oldest first.
    pub fn recent(&self, collection: &str, n: usize) -> Vec<TraceRecord> {
        let traces = self.traces.lock().expect("trace store poisoned");
        traces
            .get(collection)
            .map(|ring| ring.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    /// All retained failures, optionally restricted to one collection.
    pub fn failures(&self, collection: Option<&str>) -> Vec<TraceRecord> {
        let traces = self.traces.lock().expect("trace store poisoned");
        traces
            .iter()
            .filter(|(name, _)| collection.is_none_or(|c| c == name.as_str()))
            .flat_map(|(_, ring)| ring.iter())
            .filter(|t| t.failed())
            .cloned()
            .collect()
    }

    /// The latest trace per collection.
    pub fn latest_all(&self) -> BTreeMap<String, TraceRecord> {
        let traces = self.traces.lock().expect("trace store poisoned");
        traces
            .iter()
            .filter_map(|(name, ring)| ring.back().map(|t| (name.clone(), t.clone())))
            .collect()
    }

    /// Parse health across all collections.
    pub fn summary(&self) -> BTreeMap<String, TraceHealth> {
        let traces = self.traces.lock().expect("trace store poisoned");
        traces
            .iter()
            .filter_map(|(name, ring)| {
                let latest = ring.back()?;
                Some((
                    name.clone(),
                    TraceHealth {
                        last_parsed_by: latest.result.parsed_by,
                        last_template: latest.result.template.clone(),
                        last_error: latest.result.error.clone(),
                        last_duration_ms: latest.result.duration_ms,
                        recent_failures: ring.iter().filter(|t| t.failed()).count(),
                        total_traces: ring.len(),
                    },
                ))
            })
            .collect()
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_trace(collection: &str, ok: bool) -> TraceRecord {
        let mut trace = ParseTrace::new(collection, "cisco_ios");
        trace.raw_received("raw output", "show version");
        if ok {
            trace.delivered(ParserKind::Textfsm, Some("t.textfsm".into()), vec![], 1, None);
        } else {
            trace.delivered(ParserKind::None, None, vec![], 0, Some("all parsers failed".into()));
        }
        trace.into_record()
    }

    #[test]
    fn ring_trims_to_capacity() {
        let store = TraceStore::new(3);
        for _ in 0..5 {
            store.store(finished_trace("cpu", true));
        }
        assert_eq!(store.recent("cpu", 10).len(), 3);
    }

    #[test]
    fn failures_filter_by_collection() {
        let store = TraceStore::default();
        store.store(finished_trace("cpu", false));
        store.store(finished_trace("cpu", true));
        store.store(finished_trace("memory", false));

        assert_eq!(store.failures(None).len(), 2);
        assert_eq!(store.failures(Some("cpu")).len(), 1);
    }

    #[test]
    fn summary_counts_recent_failures() {
        let store = TraceStore::default();
        store.store(finished_trace("cpu", false));
        store.store(finished_trace("cpu", true));

        let summary = store.summary();
        let cpu = &summary["cpu"];
        assert_eq!(cpu.last_parsed_by, ParserKind::Textfsm);
        assert_eq!(cpu.recent_failures, 1);
        assert_eq!(cpu.total_traces, 2);
    }

    #[test]
    fn incomplete_trace_records_a_result() {
        let trace = ParseTrace::new("cpu", "arista_eos");
        let record = trace.into_record();
        assert_eq!(record.result.parsed_by, ParserKind::None);
        assert_eq!(record.result.error.as_deref(), Some("trace incomplete"));
    }
}
