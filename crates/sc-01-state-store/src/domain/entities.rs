//! # State Store Entities

use super::path::StatePath;
use serde::{Deserialize, Serialize};
use shared_types::{now_micros, StateChange};

/// Default cap on distinct paths.
pub const DEFAULT_MAX_PATHS: usize = 1_000_000;

/// Default number of superseded entries kept per path.
pub const DEFAULT_HISTORY_DEPTH: usize = 16;

/// Default number of undrained audit records before writes are refused.
pub const DEFAULT_AUDIT_CAPACITY: usize = 65_536;

/// Store limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    pub max_paths: usize,
    pub history_depth: usize,
    pub audit_capacity: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_paths: DEFAULT_MAX_PATHS,
            history_depth: DEFAULT_HISTORY_DEPTH,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

/// Visible value at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub data: Vec<u8>,
    /// Starts at 1, +1 per accepted write.
    pub version: u64,
    /// Protocol of the last accepted writer.
    pub protocol: String,
    pub timestamp: u64,
    pub confidence: f32,
    /// Synchronization window the write belongs to.
    pub window: u64,
}

/// `(data, version)` pair returned by reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateValue {
    pub data: Vec<u8>,
    pub version: u64,
}

/// One write request.
#[derive(Debug, Clone, PartialEq)]
pub struct StateWrite {
    pub path: StatePath,
    pub data: Vec<u8>,
    pub confidence: f32,
    pub protocol: String,
    /// Microseconds since the Unix epoch.
    pub timestamp: u64,
}

impl StateWrite {
    /// Write stamped with the current time.
    pub fn new(path: StatePath, data: Vec<u8>, confidence: f32, protocol: impl Into<String>) -> Self {
        Self {
            path,
            data,
            confidence,
            protocol: protocol.into(),
            timestamp: now_micros(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Result of a write that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Visible immediately under the new version.
    Accepted { version: u64 },
    /// Joined a conflict record, or replaced this protocol's candidate in
    /// it; resolved at the next synchronization.
    Conflict { candidates: usize },
    /// The path is being synchronized; the write replays after that pass.
    Queued,
}

impl WriteOutcome {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Conflict { .. } => "conflict",
            Self::Queued => "queued",
        }
    }
}

// =============================================================================
// SYNCHRONIZATION RESULTS
// =============================================================================

/// How one conflict was settled.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub path: StatePath,
    pub window: u64,
    pub winner: String,
    pub losers: Vec<String>,
    /// False when the incumbent value survived.
    pub changed: bool,
}

/// Outcome of one `synchronize` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// The window this pass closed.
    pub window: u64,
    pub resolutions: Vec<Resolution>,
    /// Queued writes applied after resolution.
    pub replayed: usize,
    /// One entry per path whose visible value changed, sorted by path.
    pub changes: Vec<StateChange>,
}

impl SyncReport {
    #[must_use]
    pub fn conflicts_resolved(&self) -> usize {
        self.resolutions.len()
    }
}

// =============================================================================
// AUDIT
// =============================================================================

/// Why a write ended up in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditReason {
    /// Failed validation; never stored.
    Rejected { reason: String },
    /// Lost conflict resolution to `winner`.
    Superseded { winner: String, window: u64 },
}

/// A write that never became (or stopped being) the visible value.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Raw path as submitted (may be invalid).
    pub path: String,
    pub data: Vec<u8>,
    pub confidence: f32,
    pub protocol: String,
    pub timestamp: u64,
    pub reason: AuditReason,
    pub recorded_at: u64,
}

/// Point-in-time store counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub paths: usize,
    pub current_window: u64,
    pub writes_accepted: u64,
    pub writes_rejected: u64,
    /// Refused because the audit trail was full.
    pub writes_refused: u64,
    pub writes_queued: u64,
    pub conflicts_raised: u64,
    pub conflicts_resolved: u64,
    pub pending_conflicts: usize,
    pub sync_passes: u64,
    pub audit_len: usize,
}
