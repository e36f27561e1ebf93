//! The collection definition model.

use crate::shape::Shape;
use serde::Deserialize;
use std::collections::BTreeMap;
use wirlwind_parse::{NormalizeMap, ParserSpec, Schema};

/// Default ring-buffer capacity: 24 hours of samples at a 30s interval.
pub const DEFAULT_HISTORY_CAPACITY: usize = 2880;

/// Poll interval applied when a collection file omits `interval`.
pub fn default_interval(collection: &str) -> u64 {
    match collection {
        "cpu" | "memory" | "log" => 30,
        "interfaces" | "interface_detail" | "bgp_summary" => 60,
        "environment" => 120,
        "neighbors" => 300,
        _ => 60,
    }
}

/// On-disk form of `collections/<name>/<vendor>.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionFile {
    pub command: String,
    #[serde(default)]
    pub interval: Option<u64>,
    pub parsers: Vec<ParserSpec>,
    #[serde(default)]
    pub normalize: NormalizeMap,
    #[serde(default)]
    pub history: Option<HistorySettings>,
}

/// Ring-buffer overrides for a collection's time series.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// A validated, load-time-resolved collection definition.
///
/// The normalize map is already inverted to the runtime `source →
/// canonical` direction, the shape is resolved from the name table, and the
/// interval has its default applied. Immutable for the session.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub name: String,
    /// The vendor file that actually supplied the definition (after the
    /// one-step fallback, this may be the base vendor).
    pub vendor: String,
    pub command: String,
    /// `0` means one-shot: run once at connect, never re-polled.
    pub interval_seconds: u64,
    pub parsers: Vec<ParserSpec>,
    pub remap: BTreeMap<String, String>,
    pub schema: Option<Schema>,
    pub shape: Shape,
    pub history_capacity: usize,
}

impl CollectionConfig {
    pub fn is_one_shot(&self) -> bool {
        self.interval_seconds == 0
    }
}
