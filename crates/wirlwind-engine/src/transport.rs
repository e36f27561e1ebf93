//! The command-execution seam.
//!
//! The SSH machinery itself (cipher negotiation, prompt detection, ANSI
//! stripping) lives outside the core. The engine only needs something that
//! connects to a target and runs one command at a time, returning raw
//! stdout. A session owns its channel exclusively and never overlaps
//! commands.

use crate::error::TransportError;
use async_trait::async_trait;
use wirlwind_common::DeviceTarget;

/// An open, authenticated command channel to one device.
#[async_trait]
pub trait CommandChannel: Send {
    /// Send one CLI command and return its raw output (echo and prompt
    /// still included; the sanitizer strips them).
    async fn execute(&mut self, command: &str) -> std::result::Result<String, TransportError>;

    /// The detected session prompt, when the transport knows it. Used by
    /// the sanitizer for exact trailing-prompt matching.
    fn prompt(&self) -> Option<&str> {
        None
    }

    /// Close the channel. Errors on teardown are not interesting.
    async fn close(&mut self);
}

/// Builds command channels. The engine holds one of these for the initial
/// connect and every reconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        target: &DeviceTarget,
    ) -> std::result::Result<Box<dyn CommandChannel>, TransportError>;
}
