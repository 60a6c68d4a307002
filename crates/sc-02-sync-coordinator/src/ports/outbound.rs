//! # Outbound Ports
//!
//! Traits for external dependencies (protocol bridges).

use crate::domain::{BridgeError, ProtocolKind};
use async_trait::async_trait;

/// A connection to one virtual-world protocol.
///
/// Implementations own their transport. The relay only hands them bytes and
/// asks for whatever they have received.
#[async_trait]
pub trait ProtocolBridge: Send + Sync {
    /// Protocol name used in `OutboundMessage::protocol` and state writes.
    fn name(&self) -> &str;

    fn kind(&self) -> ProtocolKind;

    /// Send raw protocol bytes.
    async fn send(&self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Next received message, if any. Must not wait for the network.
    async fn poll_inbound(&self) -> Result<Option<Vec<u8>>, BridgeError>;

    fn is_connected(&self) -> bool;
}
