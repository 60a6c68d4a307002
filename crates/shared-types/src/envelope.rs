//! # Event Envelope
//!
//! `NewEvent` is what callers hand to the bus; `EventEnvelope` is what the bus
//! hands to subscribers. The envelope gains its id when the bus accepts it and
//! has no mutators after that point.

use crate::entities::{AiEnhancementLevel, ComponentId, EventId, EventType, Priority, ProcessingFlags};
use crate::ipc::{
    AiAnalysisRequest, InboundMessage, OutboundMessage, PayloadError, StateChange, StateMutation,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall clock in microseconds since the Unix epoch.
#[must_use]
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Clamp a writer-supplied confidence into `[0, 1]`.
///
/// Returns `None` for NaN, which has no meaningful position in the order.
/// Negative zero becomes `0.0` so equal confidences compare equal bitwise.
#[must_use]
pub fn normalize_confidence(confidence: f32) -> Option<f32> {
    if confidence.is_nan() {
        None
    } else if confidence == 0.0 {
        Some(0.0)
    } else {
        Some(confidence.clamp(0.0, 1.0))
    }
}

// =============================================================================
// NEW EVENT (pre-publish)
// =============================================================================

/// An event that has not been published yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub priority: Priority,
    pub ai_level: AiEnhancementLevel,
    pub timestamp: u64,
    pub source: ComponentId,
    pub target: ComponentId,
    pub payload: Vec<u8>,
    pub ai_confidence: f32,
    pub flags: ProcessingFlags,
}

impl NewEvent {
    /// Broadcast event with background priority, stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, source: ComponentId) -> Self {
        Self {
            event_type,
            priority: Priority::Background,
            ai_level: AiEnhancementLevel::None,
            timestamp: now_micros(),
            source,
            target: ComponentId::BROADCAST,
            payload: Vec::new(),
            ai_confidence: 1.0,
            flags: ProcessingFlags::EMPTY,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: ComponentId) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.ai_confidence = confidence;
        self
    }

    #[must_use]
    pub fn with_ai_level(mut self, level: AiEnhancementLevel) -> Self {
        self.ai_level = level;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: ProcessingFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// A write request for the state store.
    ///
    /// The envelope's confidence and timestamp become the write's confidence
    /// and timestamp when the store applies it.
    pub fn state_mutation(
        source: ComponentId,
        mutation: &StateMutation,
        confidence: f32,
    ) -> Result<Self, PayloadError> {
        Ok(Self::new(EventType::StateMutation, source)
            .with_priority(Priority::Realtime)
            .with_target(ComponentId::STATE_STORE)
            .with_payload(mutation.encode()?)
            .with_confidence(confidence)
            .with_flags(ProcessingFlags::STATE_MUTATION))
    }

    /// Broadcast notification that a path's visible value changed.
    pub fn state_changed(change: &StateChange) -> Result<Self, PayloadError> {
        Ok(Self::new(EventType::StateChanged, ComponentId::STATE_STORE)
            .with_priority(Priority::Realtime)
            .with_confidence(change.confidence)
            .with_payload(change.encode()?))
    }

    /// An outbound message for the network manager to hand to a protocol bridge.
    pub fn network_send(source: ComponentId, message: &OutboundMessage) -> Result<Self, PayloadError> {
        Ok(Self::new(EventType::NetworkSend, source)
            .with_priority(Priority::Network)
            .with_target(ComponentId::NETWORK_MANAGER)
            .with_payload(message.encode()?))
    }

    /// Bytes a protocol bridge received, broadcast by the network manager.
    pub fn network_receive(message: &InboundMessage) -> Result<Self, PayloadError> {
        Ok(Self::new(EventType::NetworkReceive, ComponentId::NETWORK_MANAGER)
            .with_priority(Priority::Network)
            .with_payload(message.encode()?))
    }

    /// An analysis request for the AI orchestrator. Results come back as
    /// `AiAnalysisResult` events.
    pub fn ai_analysis_request(
        source: ComponentId,
        request: &AiAnalysisRequest,
    ) -> Result<Self, PayloadError> {
        Ok(Self::new(EventType::AiAnalysisRequest, source)
            .with_priority(Priority::Ai)
            .with_target(ComponentId::AI_ORCHESTRATOR)
            .with_ai_level(request.level)
            .with_payload(request.encode()?))
    }
}

// =============================================================================
// EVENT ENVELOPE (published)
// =============================================================================

/// A published event. Subscribers receive it behind an `Arc` and cannot
/// modify it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    id: EventId,
    event_type: EventType,
    priority: Priority,
    ai_level: AiEnhancementLevel,
    timestamp: u64,
    source: ComponentId,
    target: ComponentId,
    payload: Vec<u8>,
    ai_confidence: f32,
    flags: ProcessingFlags,
}

impl EventEnvelope {
    /// Freeze a new event under the id the bus allocated for it.
    ///
    /// The confidence must already be normalized.
    #[must_use]
    pub fn seal(id: EventId, event: NewEvent) -> Self {
        Self {
            id,
            event_type: event.event_type,
            priority: event.priority,
            ai_level: event.ai_level,
            timestamp: event.timestamp,
            source: event.source,
            target: event.target,
            payload: event.payload,
            ai_confidence: event.ai_confidence,
            flags: event.flags,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn ai_level(&self) -> AiEnhancementLevel {
        self.ai_level
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn source(&self) -> ComponentId {
        self.source
    }

    pub fn target(&self) -> ComponentId {
        self.target
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn ai_confidence(&self) -> f32 {
        self.ai_confidence
    }

    pub fn flags(&self) -> ProcessingFlags {
        self.flags
    }

    /// True if this envelope must pass through the state store first.
    pub fn is_state_mutation(&self) -> bool {
        self.flags.contains(ProcessingFlags::STATE_MUTATION)
    }

    /// True if `component` is an intended recipient.
    pub fn is_addressed_to(&self, component: ComponentId) -> bool {
        self.target.is_broadcast() || self.target == component
    }
}
