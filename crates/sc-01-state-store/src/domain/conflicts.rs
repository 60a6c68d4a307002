//! # Conflict Records and Resolution Policy
//!
//! Candidates are ranked by:
//!
//! 1. higher confidence
//! 2. later timestamp
//! 3. protocol name that sorts first
//! 4. value bytes that sort first
//!
//! The ranking is a total order over distinct candidates, so the winner does
//! not depend on the order writes arrived in.
//!
//! A record holds at most one candidate per protocol. A protocol that writes
//! again inside the window replaces its own candidate, the same way it would
//! overwrite its own value outside a conflict.

use super::entities::{StateEntry, StateWrite};
use super::path::StatePath;
use std::cmp::Ordering;

/// One competing write.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub data: Vec<u8>,
    pub confidence: f32,
    pub protocol: String,
    pub timestamp: u64,
    /// True for the value that was visible when the conflict opened.
    pub incumbent: bool,
}

impl Candidate {
    pub(crate) fn from_entry(entry: &StateEntry) -> Self {
        Self {
            data: entry.data.clone(),
            confidence: entry.confidence,
            protocol: entry.protocol.clone(),
            timestamp: entry.timestamp,
            incumbent: true,
        }
    }

    pub(crate) fn from_write(write: &StateWrite) -> Self {
        Self {
            data: write.data.clone(),
            confidence: write.confidence,
            protocol: write.protocol.clone(),
            timestamp: write.timestamp,
            incumbent: false,
        }
    }
}

/// `Greater` means `a` beats `b`.
#[must_use]
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    // `0.0` and `-0.0` are a tie; NaN never reaches a candidate.
    a.confidence
        .partial_cmp(&b.confidence)
        .unwrap_or_else(|| a.confidence.total_cmp(&b.confidence))
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| b.protocol.cmp(&a.protocol))
        .then_with(|| b.data.cmp(&a.data))
}

/// Writes from different protocols that met at one path in one window.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub path: StatePath,
    /// Window the competing writes belong to.
    pub window: u64,
    /// Incumbent first, then writes in arrival order. Always two or more,
    /// one per protocol.
    pub candidates: Vec<Candidate>,
    pub opened_at: u64,
}

impl ConflictRecord {
    pub(crate) fn open(
        path: StatePath,
        window: u64,
        incumbent: &StateEntry,
        challenger: &StateWrite,
        opened_at: u64,
    ) -> Self {
        Self {
            path,
            window,
            candidates: vec![Candidate::from_entry(incumbent), Candidate::from_write(challenger)],
            opened_at,
        }
    }

    /// Add `write`, replacing the candidate its protocol already holds.
    ///
    /// Returns the candidate count and the replaced candidate, if any.
    pub(crate) fn add(&mut self, write: &StateWrite) -> (usize, Option<Candidate>) {
        let candidate = Candidate::from_write(write);
        let replaced = match self
            .candidates
            .iter_mut()
            .find(|existing| existing.protocol == write.protocol)
        {
            Some(existing) => Some(std::mem::replace(existing, candidate)),
            None => {
                self.candidates.push(candidate);
                None
            }
        };
        (self.candidates.len(), replaced)
    }

    /// True when some candidate would change the visible `data`.
    #[must_use]
    pub fn is_contested(&self, data: &[u8]) -> bool {
        self.candidates.iter().any(|c| c.data != data)
    }

    /// Split into the winning candidate and the rest.
    #[must_use]
    pub fn resolve(mut self) -> (Candidate, Vec<Candidate>) {
        let best = self
            .candidates
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| rank(a, b))
            .map(|(index, _)| index)
            .unwrap_or(0);
        let winner = self.candidates.swap_remove(best);
        (winner, self.candidates)
    }

    /// Protocols taking part, in arrival order.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.protocol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(confidence: f32, timestamp: u64, protocol: &str, data: &[u8]) -> Candidate {
        Candidate {
            data: data.to_vec(),
            confidence,
            protocol: protocol.to_string(),
            timestamp,
            incumbent: false,
        }
    }

    fn record(candidates: Vec<Candidate>) -> ConflictRecord {
        ConflictRecord {
            path: StatePath::parse("/world/objects/1/position").unwrap(),
            window: 0,
            candidates,
            opened_at: 0,
        }
    }

    #[test]
    fn test_higher_confidence_wins() {
        let (winner, losers) = record(vec![
            candidate(0.4, 10, "opensim", b"a"),
            candidate(0.9, 5, "finalverse", b"b"),
        ])
        .resolve();
        assert_eq!(winner.protocol, "finalverse");
        assert_eq!(losers.len(), 1);
    }

    #[test]
    fn test_confidence_tie_later_timestamp_wins() {
        let (winner, _) = record(vec![
            candidate(0.5, 20, "zeta", b"late"),
            candidate(0.5, 10, "alpha", b"early"),
        ])
        .resolve();
        assert_eq!(winner.data, b"late");
    }

    #[test]
    fn test_full_tie_lexicographic_protocol_wins() {
        let (winner, _) = record(vec![
            candidate(0.5, 10, "opensim", b"x"),
            candidate(0.5, 10, "finalverse", b"y"),
        ])
        .resolve();
        assert_eq!(winner.protocol, "finalverse");
    }

    #[test]
    fn test_same_protocol_smaller_value_wins() {
        let (winner, _) = record(vec![
            candidate(0.5, 10, "opensim", b"b"),
            candidate(0.5, 10, "opensim", b"a"),
        ])
        .resolve();
        assert_eq!(winner.data, b"a");
    }

    #[test]
    fn test_signed_zero_confidences_tie() {
        let (winner, _) = record(vec![
            candidate(0.0, 10, "p1", b"early"),
            candidate(-0.0, 20, "p2", b"late"),
        ])
        .resolve();
        assert_eq!(winner.data, b"late");
    }

    #[test]
    fn test_protocol_rewrite_replaces_its_candidate() {
        let mut conflict = record(vec![
            candidate(0.9, 1, "p1", b"A"),
            candidate(0.4, 2, "p2", b"B"),
        ]);
        let path = conflict.path.clone();
        let (count, replaced) =
            conflict.add(&StateWrite::new(path, b"A2".to_vec(), 0.5, "p1").with_timestamp(3));
        assert_eq!(count, 2);
        assert_eq!(replaced.unwrap().data, b"A");
        assert!(conflict.is_contested(b"A"));

        let (winner, losers) = conflict.resolve();
        assert_eq!(winner.data, b"A2");
        assert_eq!(losers.len(), 1);
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let writes = vec![
            candidate(0.7, 3, "c", b"1"),
            candidate(0.7, 3, "a", b"2"),
            candidate(0.2, 9, "b", b"3"),
            candidate(0.7, 1, "d", b"4"),
        ];
        let expected = record(writes.clone()).resolve().0;

        for rotation in 0..writes.len() {
            let mut rotated = writes.clone();
            rotated.rotate_left(rotation);
            assert_eq!(record(rotated.clone()).resolve().0, expected);
            rotated.reverse();
            assert_eq!(record(rotated).resolve().0, expected);
        }
        assert_eq!(expected.protocol, "a");
    }
}
