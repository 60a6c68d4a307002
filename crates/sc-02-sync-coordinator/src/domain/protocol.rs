//! # Protocol Registry
//!
//! Named writers of state. Every write carries a protocol name; unknown names
//! are registered on first sight as [`ProtocolKind::External`].

use super::errors::SyncError;
use parking_lot::RwLock;
use sc_01_state_store::{Resolution, WriteOutcome};
use shared_types::now_micros;
use std::collections::HashMap;
use tracing::{debug, info};

/// Longest accepted protocol name, in bytes.
pub const MAX_PROTOCOL_NAME_BYTES: usize = 64;

/// Family of virtual-world protocol behind a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    OpenSimulator,
    MetaVerse,
    WebRtc,
    Custom(u32),
    /// Seen on a write without being registered first.
    External,
}

/// Per-protocol write and conflict counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    pub writes_accepted: u64,
    pub writes_rejected: u64,
    pub writes_queued: u64,
    /// Writes that opened or joined a conflict.
    pub conflicts_raised: u64,
    pub conflicts_won: u64,
    pub conflicts_lost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub name: String,
    pub kind: ProtocolKind,
    pub registered_at: u64,
    pub stats: ProtocolStats,
}

/// Check a protocol name: non-empty, bounded, no whitespace.
pub fn validate_protocol_name(name: &str) -> Result<(), SyncError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_PROTOCOL_NAME_BYTES {
        "longer than 64 bytes"
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "contains whitespace or control characters"
    } else {
        return Ok(());
    };
    Err(SyncError::InvalidProtocolName {
        name: name.to_string(),
        reason,
    })
}

/// Registry of known protocols and their counters.
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: RwLock<HashMap<String, ProtocolInfo>>,
}

impl ProtocolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, kind: ProtocolKind) -> Result<(), SyncError> {
        validate_protocol_name(name)?;
        let mut protocols = self.protocols.write();
        if protocols.contains_key(name) {
            return Err(SyncError::ProtocolAlreadyRegistered(name.to_string()));
        }
        protocols.insert(
            name.to_string(),
            ProtocolInfo {
                name: name.to_string(),
                kind,
                registered_at: now_micros(),
                stats: ProtocolStats::default(),
            },
        );
        info!(protocol = name, ?kind, "Protocol registered");
        Ok(())
    }

    pub fn deregister(&self, name: &str) -> Result<ProtocolInfo, SyncError> {
        let removed = self
            .protocols
            .write()
            .remove(name)
            .ok_or_else(|| SyncError::ProtocolNotFound(name.to_string()))?;
        info!(protocol = name, "Protocol deregistered");
        Ok(removed)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<ProtocolInfo> {
        self.protocols.read().get(name).cloned()
    }

    /// All protocols, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ProtocolInfo> {
        let mut list: Vec<ProtocolInfo> = self.protocols.read().values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.protocols.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `name` as `External` unless it is already known.
    pub fn ensure(&self, name: &str) -> Result<(), SyncError> {
        if self.protocols.read().contains_key(name) {
            return Ok(());
        }
        validate_protocol_name(name)?;
        let mut protocols = self.protocols.write();
        protocols.entry(name.to_string()).or_insert_with(|| {
            debug!(protocol = name, "Unknown protocol registered as external");
            ProtocolInfo {
                name: name.to_string(),
                kind: ProtocolKind::External,
                registered_at: now_micros(),
                stats: ProtocolStats::default(),
            }
        });
        Ok(())
    }

    fn with_stats(&self, name: &str, update: impl FnOnce(&mut ProtocolStats)) {
        if let Some(info) = self.protocols.write().get_mut(name) {
            update(&mut info.stats);
        }
    }

    pub fn record_outcome(&self, name: &str, outcome: WriteOutcome) {
        self.with_stats(name, |stats| match outcome {
            WriteOutcome::Accepted { .. } => stats.writes_accepted += 1,
            WriteOutcome::Conflict { .. } => stats.conflicts_raised += 1,
            WriteOutcome::Queued => stats.writes_queued += 1,
        });
    }

    pub fn record_rejection(&self, name: &str) {
        self.with_stats(name, |stats| stats.writes_rejected += 1);
    }

    pub fn record_resolution(&self, resolution: &Resolution) {
        self.with_stats(&resolution.winner, |stats| stats.conflicts_won += 1);
        for loser in &resolution.losers {
            self.with_stats(loser, |stats| stats.conflicts_lost += 1);
        }
    }
}
