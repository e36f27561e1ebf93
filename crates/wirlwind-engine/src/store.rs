//! In-memory device state.
//!
//! Single writer (the poll engine), many readers. Envelopes are immutable
//! `Arc`s swapped under a short lock, so readers never observe a torn
//! publish. Each publish bumps the collection's sequence number and fans
//! out a [`TelemetryEvent`] to every subscriber over a bounded queue; a
//! slow subscriber drops its newest events rather than blocking the
//! engine.
//!
//! Numeric headline values additionally land in per-series ring buffers
//! for trend rendering: fixed capacity, FIFO eviction, timestamps from the
//! engine clock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use wirlwind_common::types::error_envelope;
use wirlwind_common::{
    ConnectionEvent, ConnectionState, Envelope, ParserKind, StateReader, TelemetryEvent,
    UpdateEvent,
};

/// Cycles a per-interface series may go unseen before its buffer drops.
pub const DEFAULT_SERIES_GRACE: u32 = 10;

/// Samples included per series in a full snapshot.
const SNAPSHOT_HISTORY_TAIL: usize = 360;

/// One trend sample. The timestamp comes from the engine clock, never the
/// device clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Where a series value lives inside an envelope.
enum SeriesPath {
    /// Top-level numeric field.
    Field(&'static str),
    /// Numeric field on each row of a list, keyed by another field.
    PerRow {
        list_key: &'static str,
        key_field: &'static str,
        field: &'static str,
    },
}

struct SeriesSpec {
    path: SeriesPath,
}

/// Built-in headline series per collection.
fn default_series(collection: &str) -> &'static [SeriesSpec] {
    const CPU: &[SeriesSpec] = &[
        SeriesSpec { path: SeriesPath::Field("five_sec_total") },
        SeriesSpec { path: SeriesPath::Field("one_min") },
        SeriesSpec { path: SeriesPath::Field("five_min") },
    ];
    const MEMORY: &[SeriesSpec] = &[SeriesSpec { path: SeriesPath::Field("used_pct") }];
    const INTERFACE_DETAIL: &[SeriesSpec] = &[
        SeriesSpec {
            path: SeriesPath::PerRow {
                list_key: "interfaces",
                key_field: "interface",
                field: "input_rate_bps",
            },
        },
        SeriesSpec {
            path: SeriesPath::PerRow {
                list_key: "interfaces",
                key_field: "interface",
                field: "output_rate_bps",
            },
        },
        SeriesSpec {
            path: SeriesPath::PerRow {
                list_key: "interfaces",
                key_field: "interface",
                field: "utilization_pct",
            },
        },
    ];
    match collection {
        "cpu" => CPU,
        "memory" => MEMORY,
        "interface_detail" => INTERFACE_DETAIL,
        _ => &[],
    }
}

/// Fixed-capacity FIFO of samples.
struct RingBuffer {
    capacity: usize,
    data: std::collections::VecDeque<Sample>,
    /// Consecutive publishes without a sighting (per-row series only).
    missed_cycles: u32,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: std::collections::VecDeque::with_capacity(capacity.min(1024)),
            missed_cycles: 0,
        }
    }

    fn push(&mut self, sample: Sample) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
        self.missed_cycles = 0;
    }
}

#[derive(Default)]
struct CollectionState {
    latest: Option<Arc<Envelope>>,
    error: Option<Arc<Envelope>>,
    sequence: u64,
    last_error: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    series: HashMap<String, RingBuffer>,
}

/// Metadata accompanying one publish.
pub struct PublishMeta {
    pub parsed_by: ParserKind,
    pub template: Option<String>,
    pub history_capacity: usize,
}

struct Subscriber {
    name: String,
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: AtomicU64,
}

pub struct StateStore {
    collections: RwLock<HashMap<String, CollectionState>>,
    device_info: RwLock<wirlwind_common::Row>,
    subscribers: Mutex<Vec<Subscriber>>,
    series_grace: u32,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            device_info: RwLock::new(wirlwind_common::Row::new()),
            subscribers: Mutex::new(Vec::new()),
            series_grace: DEFAULT_SERIES_GRACE,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a subscriber with its own bounded queue. Events for a
    /// collection arrive in sequence order; when the queue is full the
    /// newest event is dropped for that subscriber and counted.
    pub fn subscribe(&self, name: &str, capacity: usize) -> mpsc::Receiver<TelemetryEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(Subscriber {
                name: name.to_string(),
                tx,
                dropped: AtomicU64::new(0),
            });
        rx
    }

    fn publish(&self, event: TelemetryEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(subscriber = %sub.name, dropped, "Subscriber queue full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Emit a connection-state transition to all subscribers.
    pub fn publish_connection(&self, state: ConnectionState, attempt: Option<u32>) {
        self.publish(TelemetryEvent::Connection(ConnectionEvent { state, attempt }));
    }

    // ── Writes (poll engine only) ────────────────────────────────

    /// Publish a successful envelope: swap the latest value, bump the
    /// sequence, append headline samples, fan out the update event.
    pub fn put(&self, collection: &str, envelope: Envelope, meta: PublishMeta) {
        let envelope = Arc::new(envelope);
        let sequence;
        {
            let mut collections = self.collections.write().expect("state store poisoned");
            let state = collections.entry(collection.to_string()).or_default();
            state.sequence += 1;
            sequence = state.sequence;
            state.latest = Some(Arc::clone(&envelope));
            state.error = None;
            state.last_error = None;
            state.updated_at = Some(Utc::now());
            extract_series(
                collection,
                state,
                &envelope,
                meta.history_capacity,
                self.series_grace,
            );
        }

        self.publish(TelemetryEvent::Update(UpdateEvent {
            collection: collection.to_string(),
            envelope: (*envelope).clone(),
            sequence,
            parsed_by: meta.parsed_by,
            template: meta.template,
            error: None,
        }));
        tracing::debug!(collection, sequence, "State updated");
    }

    /// Publish an error envelope. The last good envelope stays available
    /// alongside the error marker.
    pub fn put_error(&self, collection: &str, kind: &str, detail: &str) {
        let envelope = Arc::new(error_envelope(collection, kind, detail));
        let sequence;
        {
            let mut collections = self.collections.write().expect("state store poisoned");
            let state = collections.entry(collection.to_string()).or_default();
            state.sequence += 1;
            sequence = state.sequence;
            state.error = Some(Arc::clone(&envelope));
            state.last_error = Some(format!("{kind}: {detail}"));
        }

        self.publish(TelemetryEvent::Update(UpdateEvent {
            collection: collection.to_string(),
            envelope: (*envelope).clone(),
            sequence,
            parsed_by: ParserKind::None,
            template: None,
            error: Some(format!("{kind}: {detail}")),
        }));
        tracing::warn!(collection, kind, detail, "Error envelope published");
    }

    /// Record a failure without publishing anything (transport errors:
    /// connection events carry the signal instead).
    pub fn mark_error(&self, collection: &str, reason: &str) {
        let mut collections = self.collections.write().expect("state store poisoned");
        let state = collections.entry(collection.to_string()).or_default();
        state.last_error = Some(reason.to_string());
    }

    pub fn set_device_info(&self, info: wirlwind_common::Row) {
        *self.device_info.write().expect("device info poisoned") = info;
    }

    /// Reset everything. Called on disconnect; the store itself outlives
    /// the session object but not its contents.
    pub fn clear(&self) {
        self.collections
            .write()
            .expect("state store poisoned")
            .clear();
        self.device_info
            .write()
            .expect("device info poisoned")
            .clear();
        tracing::info!("State store cleared");
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Latest successfully published envelope.
    pub fn get(&self, collection: &str) -> Option<Arc<Envelope>> {
        self.collections
            .read()
            .expect("state store poisoned")
            .get(collection)
            .and_then(|s| s.latest.clone())
    }

    /// Latest error envelope, if the most recent cycle failed.
    pub fn get_error(&self, collection: &str) -> Option<Arc<Envelope>> {
        self.collections
            .read()
            .expect("state store poisoned")
            .get(collection)
            .and_then(|s| s.error.clone())
    }

    pub fn sequence(&self, collection: &str) -> u64 {
        self.collections
            .read()
            .expect("state store poisoned")
            .get(collection)
            .map_or(0, |s| s.sequence)
    }

    /// Ring-buffer contents for one series, oldest first. Per-row series
    /// use keys like `input_rate_bps[Ethernet1]`.
    pub fn history(&self, collection: &str, series: &str) -> Vec<Sample> {
        self.collections
            .read()
            .expect("state store poisoned")
            .get(collection)
            .and_then(|s| s.series.get(series))
            .map(|ring| ring.data.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Names of every live series for a collection.
    pub fn series_names(&self, collection: &str) -> Vec<String> {
        let collections = self.collections.read().expect("state store poisoned");
        let mut names: Vec<String> = collections
            .get(collection)
            .map(|s| s.series.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Full JSON snapshot for bulk consumption: device info, latest
    /// envelopes, per-collection metadata and recent flat-series history.
    pub fn snapshot(&self) -> Value {
        let collections = self.collections.read().expect("state store poisoned");
        let device_info = self.device_info.read().expect("device info poisoned");

        let mut colls = serde_json::Map::new();
        let mut metadata = serde_json::Map::new();
        let mut history = serde_json::Map::new();
        for (name, state) in collections.iter() {
            if let Some(latest) = &state.latest {
                colls.insert(name.clone(), (**latest).clone());
            }
            metadata.insert(
                name.clone(),
                serde_json::json!({
                    "sequence": state.sequence,
                    "last_updated": state.updated_at,
                    "last_error": state.last_error,
                    "success": state.last_error.is_none(),
                }),
            );
            let mut series_map = serde_json::Map::new();
            for (series, ring) in &state.series {
                let tail: Vec<&Sample> = ring
                    .data
                    .iter()
                    .rev()
                    .take(SNAPSHOT_HISTORY_TAIL)
                    .rev()
                    .collect();
                series_map.insert(series.clone(), serde_json::to_value(tail).unwrap_or_default());
            }
            if !series_map.is_empty() {
                history.insert(name.clone(), Value::Object(series_map));
            }
        }

        serde_json::json!({
            "device": Value::Object(device_info.clone()),
            "collections": colls,
            "metadata": metadata,
            "history": history,
            "snapshot_time": Utc::now(),
        })
    }
}

impl StateReader for StateStore {
    fn latest(&self, collection: &str) -> Option<Arc<Envelope>> {
        self.get(collection)
    }
}

/// Pull headline samples out of a fresh envelope into the ring buffers.
/// Per-row buffers appear on first sighting and disappear after the grace
/// window of consecutive misses.
fn extract_series(
    collection: &str,
    state: &mut CollectionState,
    envelope: &Envelope,
    capacity: usize,
    grace: u32,
) {
    let specs = default_series(collection);
    if specs.is_empty() {
        return;
    }
    let now = Utc::now();
    let mut seen: Vec<String> = Vec::new();

    for spec in specs {
        match &spec.path {
            SeriesPath::Field(field) => {
                if let Some(value) = envelope.get(*field).and_then(wirlwind_common::num::to_f64) {
                    seen.push(field.to_string());
                    state
                        .series
                        .entry(field.to_string())
                        .or_insert_with(|| RingBuffer::new(capacity))
                        .push(Sample {
                            timestamp: now,
                            value,
                        });
                }
            }
            SeriesPath::PerRow {
                list_key,
                key_field,
                field,
            } => {
                let Some(rows) = envelope.get(*list_key).and_then(Value::as_array) else {
                    continue;
                };
                for row in rows {
                    let Some(key) = row.get(*key_field).and_then(Value::as_str) else {
                        continue;
                    };
                    let Some(value) = row.get(*field).and_then(wirlwind_common::num::to_f64) else {
                        continue;
                    };
                    let series = format!("{field}[{key}]");
                    seen.push(series.clone());
                    state
                        .series
                        .entry(series)
                        .or_insert_with(|| RingBuffer::new(capacity))
                        .push(Sample {
                            timestamp: now,
                            value,
                        });
                }
            }
        }
    }

    // Age out series that stopped appearing (an interface went away).
    state.series.retain(|name, ring| {
        if seen.contains(name) {
            true
        } else {
            ring.missed_cycles += 1;
            ring.missed_cycles <= grace
        }
    });
}
