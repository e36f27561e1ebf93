//! Shared types for the wirlwind telemetry crates.
//!
//! Everything that crosses a crate boundary lives here: the runtime row and
//! envelope model, the published event payloads, vendor-id handling, and the
//! lenient numeric coercion helpers used by drivers and the state store.

pub mod num;
pub mod types;
pub mod vendor;

pub use types::{
    ConnectionEvent, ConnectionState, DeviceTarget, Envelope, ParserKind, Row, StateReader,
    TelemetryEvent, UpdateEvent,
};
