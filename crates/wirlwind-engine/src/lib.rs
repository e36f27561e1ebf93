//! The device session: transport seam, state store and poll engine.
//!
//! One session owns one command channel and one scheduler task. The engine
//! drives `execute → sanitize → parse → shape → post-process → publish` for
//! every enabled collection on its own interval, contains per-collection
//! failures to a single cycle, and pauses the whole session for reconnect
//! backoff when the transport itself dies.

pub mod engine;
pub mod error;
pub mod store;
pub mod transport;

pub use engine::{EngineOptions, PollEngine};
pub use error::{EngineError, TransportError};
pub use store::{Sample, StateStore};
pub use transport::{CommandChannel, Transport};
