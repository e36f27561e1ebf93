use std::time::Duration;

/// Failures of the command channel. Any of these counts toward the
/// session's consecutive-failure threshold and the reconnect path.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport: connect to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Transport: channel I/O failed: {0}")]
    Io(String),

    #[error("Transport: command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport: channel closed")]
    Closed,
}

/// Fatal engine errors. Everything else is contained to a collection and a
/// cycle, or handled by reconnect backoff.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The initial connect failed; there is no session to run.
    #[error("Engine: {0}")]
    InitialConnect(#[source] TransportError),
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
