use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One parsed record: field name → scalar value.
///
/// Keys are always lowercase once a parser has run. Values start out as JSON
/// strings and may be replaced by numbers/bools during schema coercion, so
/// the map stays deliberately untyped.
pub type Row = serde_json::Map<String, Value>;

/// The published value for one collection, always a JSON object.
pub type Envelope = Value;

/// Which parser in the chain produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Textfsm,
    Ttp,
    Regex,
    /// No parser succeeded (error envelopes, empty output).
    None,
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParserKind::Textfsm => write!(f, "textfsm"),
            ParserKind::Ttp => write!(f, "ttp"),
            ParserKind::Regex => write!(f, "regex"),
            ParserKind::None => write!(f, "none"),
        }
    }
}

/// The device a session is bound to. Host and vendor are fixed for the
/// lifetime of the session; changing vendor means a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub vendor: String,
    pub display_name: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl DeviceTarget {
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.host)
    }
}

/// Connection lifecycle of the poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// One state-store update, delivered to every subscriber in sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub collection: String,
    pub envelope: Envelope,
    pub sequence: u64,
    pub parsed_by: ParserKind,
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection-state transition emitted by the poll engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

/// Everything a subscriber can receive from one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TelemetryEvent {
    Update(UpdateEvent),
    Connection(ConnectionEvent),
}

/// Read-only view of the state store.
///
/// Driver post-processing receives this to look at prior envelopes (rate
/// deltas, cross-collection joins) without being able to mutate the store.
pub trait StateReader: Send + Sync {
    /// Latest successfully published envelope for a collection, if any.
    fn latest(&self, collection: &str) -> Option<Arc<Envelope>>;
}

/// Build the sentinel envelope published when a collection fails.
///
/// Consumers route on `_collection` and render an error indicator instead of
/// a stalled panel.
pub fn error_envelope(collection: &str, kind: &str, detail: &str) -> Envelope {
    serde_json::json!({
        "error": format!("{kind}: {detail}"),
        "_collection": collection,
    })
}
