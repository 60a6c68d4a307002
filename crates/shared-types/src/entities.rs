//! # Core Entities
//!
//! Identifiers and enumerations carried by every event envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identity of a component attached to the bus.
///
/// `0` is never a valid component. `BROADCAST` is the sentinel target that
/// matches every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u32);

impl ComponentId {
    /// Invalid component id.
    pub const NONE: Self = Self(0);
    /// State store (source of `StateChanged` notifications).
    pub const STATE_STORE: Self = Self(1);
    /// Protocol bridge host.
    pub const PROTOCOL_BRIDGE: Self = Self(2);
    /// Network manager (consumer of `NetworkSend` requests).
    pub const NETWORK_MANAGER: Self = Self(3);
    /// AI orchestrator (consumer of `AiAnalysisRequest` events).
    pub const AI_ORCHESTRATOR: Self = Self(4);
    /// Render subsystem.
    pub const RENDERER: Self = Self(5);
    /// Input subsystem.
    pub const INPUT: Self = Self(6);
    /// Synchronization coordinator.
    pub const SYNC_COORDINATOR: Self = Self(7);
    /// Broadcast sentinel.
    pub const BROADCAST: Self = Self(u32::MAX);

    /// True for the broadcast sentinel.
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    /// True for anything other than the zero id.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "component-{}", self.0)
        }
    }
}

/// Monotonic event identifier assigned by the bus at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

// =============================================================================
// PRIORITY & AI METADATA
// =============================================================================

/// Priority class of an envelope. Declaration order is drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Engine-level control events.
    System,
    /// Frame-critical simulation events.
    Realtime,
    /// AI analysis traffic.
    Ai,
    /// Protocol bridge traffic.
    Network,
    /// Everything that can wait.
    Background,
}

impl Priority {
    /// All classes in drain order.
    pub const ALL: [Priority; 5] = [
        Priority::System,
        Priority::Realtime,
        Priority::Ai,
        Priority::Network,
        Priority::Background,
    ];

    /// Number of priority classes.
    pub const COUNT: usize = Self::ALL.len();

    /// Queue index of this class (0 drains first).
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Realtime => "realtime",
            Self::Ai => "ai",
            Self::Network => "network",
            Self::Background => "background",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Background
    }
}

/// How much AI processing an event has been through (or asks for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum AiEnhancementLevel {
    #[default]
    None,
    Basic,
    Enhanced,
    Predictive,
    Adaptive,
}

impl AiEnhancementLevel {
    /// Map the 0-255 enhancement scale used by protocol bridges.
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1..=63 => Self::Basic,
            64..=127 => Self::Enhanced,
            128..=199 => Self::Predictive,
            _ => Self::Adaptive,
        }
    }
}

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Enumerated event type.
///
/// `All` is a filter wildcard only; publishing it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// Generic protocol message without a more specific mapping.
    ProtocolMessage,
    EntityMovement,
    ChatMessage,
    ObjectUpdate,
    RegionHandshake,
    /// Write request for the state store (payload: `StateMutation`).
    StateMutation,
    /// Visible state changed (payload: `StateChange`).
    StateChanged,
    AiAnalysisRequest,
    AiAnalysisResult,
    /// Outbound network message (payload: `OutboundMessage`).
    NetworkSend,
    /// Inbound network message (payload: `InboundMessage`).
    NetworkReceive,
    Input,
    Render,
    Lifecycle,
    /// Application-defined code.
    Custom(u32),
    /// Subscription wildcard.
    All,
}

impl EventType {
    /// Stable numeric wire code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::All => 0,
            Self::ProtocolMessage => 1000,
            Self::EntityMovement => 1001,
            Self::ChatMessage => 1002,
            Self::ObjectUpdate => 1003,
            Self::RegionHandshake => 1004,
            Self::StateMutation => 2001,
            Self::StateChanged => 2002,
            Self::AiAnalysisRequest => 3001,
            Self::AiAnalysisResult => 3002,
            Self::NetworkSend => 4001,
            Self::NetworkReceive => 4002,
            Self::Input => 5001,
            Self::Render => 5002,
            Self::Lifecycle => 9001,
            Self::Custom(code) => code,
        }
    }

    /// Inverse of [`EventType::code`]. Unknown codes become `Custom`.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::All,
            1000 => Self::ProtocolMessage,
            1001 => Self::EntityMovement,
            1002 => Self::ChatMessage,
            1003 => Self::ObjectUpdate,
            1004 => Self::RegionHandshake,
            2001 => Self::StateMutation,
            2002 => Self::StateChanged,
            3001 => Self::AiAnalysisRequest,
            3002 => Self::AiAnalysisResult,
            4001 => Self::NetworkSend,
            4002 => Self::NetworkReceive,
            5001 => Self::Input,
            5002 => Self::Render,
            9001 => Self::Lifecycle,
            other => Self::Custom(other),
        }
    }

    /// Build a custom type, normalizing codes that name a built-in type.
    #[must_use]
    pub fn custom(code: u32) -> Self {
        Self::from_code(code)
    }

    /// True for the subscription wildcard.
    #[must_use]
    pub fn is_wildcard(self) -> bool {
        self == Self::All
    }
}

// =============================================================================
// PROCESSING FLAGS
// =============================================================================

/// Processing flag bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProcessingFlags(pub u32);

impl ProcessingFlags {
    pub const EMPTY: Self = Self(0);
    /// Payload compressed by the producing bridge.
    pub const COMPRESSED: Self = Self(0x01);
    /// Route through the state store before delivery.
    pub const STATE_MUTATION: Self = Self(0x02);
    /// An AI enhancer already touched this event.
    pub const AI_ENHANCED: Self = Self(0x04);
    /// Re-published from a deferred or replayed source.
    pub const REPLAYED: Self = Self(0x08);

    /// True if every bit of `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ProcessingFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcessingFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
