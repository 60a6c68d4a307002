//! # Event Payloads
//!
//! Typed payloads carried inside envelope bytes. All of them use bincode so
//! that a bridge written against this crate can decode them without guessing
//! a wire format.

use crate::entities::AiEnhancementLevel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload encode/decode failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Failed to encode {kind} payload: {reason}")]
    Encode { kind: &'static str, reason: String },

    #[error("Failed to decode {kind} payload: {reason}")]
    Decode { kind: &'static str, reason: String },
}

fn encode<T: Serialize>(kind: &'static str, value: &T) -> Result<Vec<u8>, PayloadError> {
    bincode::serialize(value).map_err(|e| PayloadError::Encode {
        kind,
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(kind: &'static str, bytes: &[u8]) -> Result<T, PayloadError> {
    bincode::deserialize(bytes).map_err(|e| PayloadError::Decode {
        kind,
        reason: e.to_string(),
    })
}

macro_rules! impl_payload {
    ($ty:ty, $kind:literal) => {
        impl $ty {
            /// Encode as envelope payload bytes.
            pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
                encode($kind, self)
            }

            /// Decode from envelope payload bytes.
            pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
                decode($kind, bytes)
            }
        }
    };
}

// =============================================================================
// STATE PAYLOADS
// =============================================================================

/// Write request carried by a `StateMutation` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMutation {
    /// Target state path (validated by the store, not here).
    pub path: String,
    /// New value bytes.
    pub data: Vec<u8>,
    /// Writer protocol name.
    pub protocol: String,
}

impl StateMutation {
    pub fn new(path: impl Into<String>, data: Vec<u8>, protocol: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data,
            protocol: protocol.into(),
        }
    }
}

impl_payload!(StateMutation, "state-mutation");

/// Notification carried by a `StateChanged` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub path: String,
    pub data: Vec<u8>,
    pub version: u64,
    pub protocol: String,
    pub confidence: f32,
    pub timestamp: u64,
}

impl_payload!(StateChange, "state-change");

// =============================================================================
// NETWORK PAYLOADS
// =============================================================================

/// Bytes to hand to a named protocol bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub protocol: String,
    pub bytes: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(protocol: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            protocol: protocol.into(),
            bytes,
        }
    }
}

impl_payload!(OutboundMessage, "outbound-message");

/// Bytes received by a protocol bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub protocol: String,
    pub bytes: Vec<u8>,
    pub received_at: u64,
}

impl_payload!(InboundMessage, "inbound-message");

// =============================================================================
// AI PAYLOADS
// =============================================================================

/// Request for the AI orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAnalysisRequest {
    /// Analysis task name understood by the orchestrator.
    pub task: String,
    /// Opaque task input.
    pub input: Vec<u8>,
    pub level: AiEnhancementLevel,
}

impl AiAnalysisRequest {
    pub fn new(task: impl Into<String>, input: Vec<u8>, level: AiEnhancementLevel) -> Self {
        Self {
            task: task.into(),
            input,
            level,
        }
    }
}

impl_payload!(AiAnalysisRequest, "ai-analysis-request");

/// Result published by the AI orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysisResult {
    pub task: String,
    pub output: Vec<u8>,
    pub confidence: f32,
}

impl_payload!(AiAnalysisResult, "ai-analysis-result");
