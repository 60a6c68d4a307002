//! # Coordinator Errors

use sc_01_state_store::StateError;
use shared_bus::BusError;
use shared_types::{HasStatus, PayloadError, StatusCode};
use thiserror::Error;

/// Failure reported by a protocol bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Bridge is not connected")]
    NotConnected,

    #[error("Network timeout")]
    Timeout,

    #[error("Message parsing failed: {0}")]
    MessageParsing(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Buffer overflow")]
    BufferOverflow,
}

impl HasStatus for BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed(_) | Self::NotConnected | Self::Timeout => {
                StatusCode::NetworkError
            }
            Self::MessageParsing(_) | Self::ProtocolViolation(_) | Self::BufferOverflow => {
                StatusCode::ProtocolError
            }
        }
    }
}

/// Errors from coordinator operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid protocol name {name:?}: {reason}")]
    InvalidProtocolName { name: String, reason: &'static str },

    #[error("Protocol already registered: {0}")]
    ProtocolAlreadyRegistered(String),

    #[error("Protocol not registered: {0}")]
    ProtocolNotFound(String),

    #[error("No bridge for protocol {0}")]
    BridgeNotFound(String),

    #[error("Bridge {protocol} failed: {source}")]
    Bridge {
        protocol: String,
        #[source]
        source: BridgeError,
    },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl HasStatus for SyncError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidProtocolName { .. }
            | Self::ProtocolAlreadyRegistered(_)
            | Self::ProtocolNotFound(_) => StatusCode::InvalidParameters,
            Self::BridgeNotFound(_) => StatusCode::ProtocolError,
            Self::Bridge { source, .. } => source.status(),
            Self::Payload(e) => e.status(),
            Self::State(e) => e.status(),
            Self::Bus(e) => e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_status_mapping() {
        assert_eq!(BridgeError::Timeout.status(), StatusCode::NetworkError);
        assert_eq!(
            BridgeError::ProtocolViolation("bad header".into()).status(),
            StatusCode::ProtocolError
        );
    }

    #[test]
    fn test_sync_error_delegates_status() {
        let err = SyncError::Bridge {
            protocol: "opensim".into(),
            source: BridgeError::NotConnected,
        };
        assert_eq!(err.status(), StatusCode::NetworkError);

        let err: SyncError = BusError::QueueFull { capacity: 1 }.into();
        assert_eq!(err.status(), StatusCode::OutOfMemory);

        let err: SyncError = StateError::NotFound { path: "/a".into() }.into();
        assert_eq!(err.status(), StatusCode::InvalidParameters);
    }
}
