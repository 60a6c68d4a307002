//! # State Store Service
//!
//! Owns every state entry. Writes take a short map lock to find the path's
//! slot, then the slot mutex, which is the ownership token for that path.
//! Disjoint paths never contend past the map lookup.
//!
//! ## Windows
//!
//! Time is divided into synchronization windows. Each `synchronize` call
//! closes the current window and resolves every conflict recorded in a
//! closed window. Once two protocols have written a path in one window,
//! every further write from that window joins the path's conflict record,
//! one candidate per protocol. Writes from later windows are queued and
//! replayed once the conflict is settled.
//!
//! ## Audit Backpressure
//!
//! Audit records stay until [`StateStore::drain_audit`] takes them. Once
//! `audit_capacity` records are waiting, new writes are refused with
//! [`StateError::AuditFull`] instead of evicting older records.

use crate::domain::{
    AuditReason, AuditRecord, ConflictRecord, Resolution, StateConfig, StateEntry, StateError,
    StatePath, StateValue, StateWrite, StoreStats, SyncReport, WriteOutcome,
};
use crate::ports::StateStoreApi;
use parking_lot::{Mutex, RwLock};
use shared_types::{normalize_confidence, now_micros, StateChange};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Default)]
struct PathSlot {
    entry: Option<StateEntry>,
    /// Superseded entries, oldest first.
    history: VecDeque<StateEntry>,
    conflict: Option<ConflictRecord>,
    /// Writes waiting for the running synchronization pass.
    deferred: Vec<StateWrite>,
}

struct AuditLog {
    entries: VecDeque<AuditRecord>,
    capacity: usize,
}

impl AuditLog {
    fn full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

#[derive(Default)]
struct StoreCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    refused: AtomicU64,
    queued: AtomicU64,
    conflicts_raised: AtomicU64,
    conflicts_resolved: AtomicU64,
    sync_passes: AtomicU64,
}

/// In-memory hierarchical state store.
pub struct StateStore {
    config: StateConfig,
    paths: RwLock<HashMap<StatePath, Arc<Mutex<PathSlot>>>>,
    window: AtomicU64,
    /// Paths with an open conflict record. Locked after a slot, never before.
    pending: Mutex<BTreeSet<StatePath>>,
    sync_lock: Mutex<()>,
    audit: Mutex<AuditLog>,
    counters: StoreCounters,
}

impl StateStore {
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            window: AtomicU64::new(0),
            pending: Mutex::new(BTreeSet::new()),
            sync_lock: Mutex::new(()),
            audit: Mutex::new(AuditLog {
                entries: VecDeque::new(),
                capacity: config.audit_capacity,
            }),
            counters: StoreCounters::default(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Window that new writes currently belong to.
    #[must_use]
    pub fn current_window(&self) -> u64 {
        self.window.load(Ordering::Acquire)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Write `data` to `path`, stamped with the current time.
    pub fn update(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
    ) -> Result<WriteOutcome, StateError> {
        self.update_at(path, data, confidence, protocol, now_micros())
    }

    /// Write with an explicit timestamp, validating the raw path.
    pub fn update_at(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
        timestamp: u64,
    ) -> Result<WriteOutcome, StateError> {
        self.admit()?;
        let parsed = match StatePath::parse(path) {
            Ok(parsed) => parsed,
            Err(source) => {
                let err = StateError::InvalidPath {
                    path: path.to_string(),
                    source,
                };
                return Err(self.reject(path, &data, confidence, protocol, timestamp, err));
            }
        };
        self.apply_admitted(StateWrite {
            path: parsed,
            data,
            confidence,
            protocol: protocol.to_string(),
            timestamp,
        })
    }

    /// Apply a write that carries its own timestamp.
    pub fn apply(&self, write: StateWrite) -> Result<WriteOutcome, StateError> {
        self.admit()?;
        self.apply_admitted(write)
    }

    fn apply_admitted(&self, mut write: StateWrite) -> Result<WriteOutcome, StateError> {
        if write.protocol.is_empty() {
            return Err(self.reject_write(&write, StateError::EmptyProtocol));
        }
        write.confidence = match normalize_confidence(write.confidence) {
            Some(confidence) => confidence,
            None => return Err(self.reject_write(&write, StateError::InvalidConfidence)),
        };

        let slot = match self.slot_for(&write.path) {
            Ok(slot) => slot,
            Err(err) => return Err(self.reject_write(&write, err)),
        };
        let mut slot = slot.lock();
        let window = self.window.load(Ordering::Acquire);
        Ok(self.apply_locked(&mut slot, write, window))
    }

    /// Refuse writes while the audit trail is full.
    fn admit(&self) -> Result<(), StateError> {
        let capacity = self.audit.lock().full().then_some(self.config.audit_capacity);
        match capacity {
            Some(capacity) => {
                self.counters.refused.fetch_add(1, Ordering::Relaxed);
                warn!(capacity, "Audit trail full, write refused");
                Err(StateError::AuditFull { capacity })
            }
            None => Ok(()),
        }
    }

    fn slot_for(&self, path: &StatePath) -> Result<Arc<Mutex<PathSlot>>, StateError> {
        if let Some(slot) = self.paths.read().get(path) {
            return Ok(Arc::clone(slot));
        }

        let mut paths = self.paths.write();
        if let Some(slot) = paths.get(path) {
            return Ok(Arc::clone(slot));
        }
        if paths.len() >= self.config.max_paths {
            return Err(StateError::CapacityExceeded {
                max_paths: self.config.max_paths,
            });
        }
        let slot = Arc::new(Mutex::new(PathSlot::default()));
        paths.insert(path.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    fn apply_locked(&self, slot: &mut PathSlot, write: StateWrite, window: u64) -> WriteOutcome {
        if let Some(conflict) = slot.conflict.as_mut() {
            if conflict.window >= window {
                let conflict_window = conflict.window;
                let (candidates, replaced) = conflict.add(&write);
                debug!(path = %write.path, protocol = %write.protocol, candidates, "Write joined conflict");
                // A replaced incumbent stays reachable through history.
                if let Some(stale) = replaced.filter(|c| !c.incumbent) {
                    self.record_audit(AuditRecord {
                        path: write.path.to_string(),
                        data: stale.data,
                        confidence: stale.confidence,
                        protocol: stale.protocol,
                        timestamp: stale.timestamp,
                        reason: AuditReason::Superseded {
                            winner: write.protocol.clone(),
                            window: conflict_window,
                        },
                        recorded_at: now_micros(),
                    });
                }
                return WriteOutcome::Conflict { candidates };
            }
            debug!(path = %write.path, protocol = %write.protocol, "Write queued behind synchronization");
            slot.deferred.push(write);
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
            return WriteOutcome::Queued;
        }

        if let Some(entry) = &slot.entry {
            if entry.window == window && entry.protocol != write.protocol {
                let record =
                    ConflictRecord::open(write.path.clone(), window, entry, &write, now_micros());
                debug!(
                    path = %write.path,
                    incumbent = %entry.protocol,
                    challenger = %write.protocol,
                    window,
                    "Conflict opened"
                );
                slot.conflict = Some(record);
                self.pending.lock().insert(write.path);
                self.counters.conflicts_raised.fetch_add(1, Ordering::Relaxed);
                return WriteOutcome::Conflict { candidates: 2 };
            }
        }

        let version = self.commit(
            slot,
            StateEntry {
                data: write.data,
                version: 0,
                protocol: write.protocol,
                timestamp: write.timestamp,
                confidence: write.confidence,
                window,
            },
        );
        debug!(path = %write.path, version, "Write accepted");
        WriteOutcome::Accepted { version }
    }

    /// Make `entry` visible under the next version.
    fn commit(&self, slot: &mut PathSlot, mut entry: StateEntry) -> u64 {
        entry.version = slot.entry.as_ref().map_or(1, |current| current.version + 1);
        let version = entry.version;

        if let Some(previous) = slot.entry.replace(entry) {
            if self.config.history_depth > 0 {
                if slot.history.len() >= self.config.history_depth {
                    slot.history.pop_front();
                }
                slot.history.push_back(previous);
            }
        }
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        version
    }

    fn reject_write(&self, write: &StateWrite, err: StateError) -> StateError {
        self.reject(
            write.path.as_str(),
            &write.data,
            write.confidence,
            &write.protocol,
            write.timestamp,
            err,
        )
    }

    fn reject(
        &self,
        path: &str,
        data: &[u8],
        confidence: f32,
        protocol: &str,
        timestamp: u64,
        err: StateError,
    ) -> StateError {
        warn!(path, protocol, error = %err, "State write rejected");
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        self.record_audit(AuditRecord {
            path: path.to_string(),
            data: data.to_vec(),
            confidence,
            protocol: protocol.to_string(),
            timestamp,
            reason: AuditReason::Rejected {
                reason: err.to_string(),
            },
            recorded_at: now_micros(),
        });
        err
    }

    /// Never evicts. Superseded candidates from a pass may overshoot the
    /// capacity; `admit` holds new writes back until the trail is drained.
    fn record_audit(&self, record: AuditRecord) {
        self.audit.lock().entries.push_back(record);
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn existing_slot(&self, path: &str) -> Result<(StatePath, Arc<Mutex<PathSlot>>), StateError> {
        let parsed = StatePath::parse(path).map_err(|source| StateError::InvalidPath {
            path: path.to_string(),
            source,
        })?;
        let slot = self
            .paths
            .read()
            .get(&parsed)
            .cloned()
            .ok_or_else(|| StateError::NotFound {
                path: path.to_string(),
            })?;
        Ok((parsed, slot))
    }

    /// Visible value and version at `path`.
    pub fn get(&self, path: &str) -> Result<StateValue, StateError> {
        let (_, slot) = self.existing_slot(path)?;
        let slot = slot.lock();
        slot.entry
            .as_ref()
            .map(|entry| StateValue {
                data: entry.data.clone(),
                version: entry.version,
            })
            .ok_or_else(|| StateError::NotFound {
                path: path.to_string(),
            })
    }

    /// Like [`StateStore::get`], but refuses to read a contested path.
    pub fn get_consistent(&self, path: &str) -> Result<StateValue, StateError> {
        let (_, slot) = self.existing_slot(path)?;
        let slot = slot.lock();
        let visible = slot.entry.as_ref().map_or(&[][..], |entry| entry.data.as_slice());
        if let Some(conflict) = slot.conflict.as_ref().filter(|c| c.is_contested(visible)) {
            return Err(StateError::Conflict {
                path: path.to_string(),
                candidates: conflict.candidates.len(),
            });
        }
        slot.entry
            .as_ref()
            .map(|entry| StateValue {
                data: entry.data.clone(),
                version: entry.version,
            })
            .ok_or_else(|| StateError::NotFound {
                path: path.to_string(),
            })
    }

    /// Full entry at `path`.
    pub fn entry(&self, path: &str) -> Result<StateEntry, StateError> {
        let (_, slot) = self.existing_slot(path)?;
        let entry = slot.lock().entry.clone();
        entry.ok_or_else(|| StateError::NotFound {
            path: path.to_string(),
        })
    }

    /// Superseded entries followed by the current one, oldest first.
    pub fn history(&self, path: &str) -> Result<Vec<StateEntry>, StateError> {
        let (_, slot) = self.existing_slot(path)?;
        let slot = slot.lock();
        let current = slot.entry.clone().ok_or_else(|| StateError::NotFound {
            path: path.to_string(),
        })?;
        let mut entries: Vec<StateEntry> = slot.history.iter().cloned().collect();
        entries.push(current);
        Ok(entries)
    }

    /// Every visible value at or beneath `prefix`, sorted by path.
    pub fn subtree(&self, prefix: &str) -> Result<Vec<(StatePath, StateValue)>, StateError> {
        let prefix = StatePath::parse(prefix).map_err(|source| StateError::InvalidPath {
            path: prefix.to_string(),
            source,
        })?;
        let slots: Vec<(StatePath, Arc<Mutex<PathSlot>>)> = self
            .paths
            .read()
            .iter()
            .filter(|(path, _)| path.is_within(&prefix))
            .map(|(path, slot)| (path.clone(), Arc::clone(slot)))
            .collect();

        let mut values: Vec<(StatePath, StateValue)> = slots
            .into_iter()
            .filter_map(|(path, slot)| {
                let slot = slot.lock();
                let entry = slot.entry.as_ref()?;
                Some((
                    path,
                    StateValue {
                        data: entry.data.clone(),
                        version: entry.version,
                    },
                ))
            })
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(values)
    }

    /// Open conflict records, sorted by path.
    pub fn pending_conflicts(&self) -> Vec<ConflictRecord> {
        let paths: Vec<StatePath> = self.pending.lock().iter().cloned().collect();
        paths
            .iter()
            .filter_map(|path| {
                let slot = self.paths.read().get(path).cloned()?;
                let record = slot.lock().conflict.clone();
                record
            })
            .collect()
    }

    /// Rejected and superseded writes, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditRecord> {
        self.audit.lock().entries.iter().cloned().collect()
    }

    /// Take the audit trail, oldest first.
    pub fn drain_audit(&self) -> Vec<AuditRecord> {
        self.audit.lock().entries.drain(..).collect()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let audit_len = self.audit.lock().entries.len();
        StoreStats {
            paths: self.paths.read().len(),
            current_window: self.current_window(),
            writes_accepted: self.counters.accepted.load(Ordering::Relaxed),
            writes_rejected: self.counters.rejected.load(Ordering::Relaxed),
            writes_refused: self.counters.refused.load(Ordering::Relaxed),
            writes_queued: self.counters.queued.load(Ordering::Relaxed),
            conflicts_raised: self.counters.conflicts_raised.load(Ordering::Relaxed),
            conflicts_resolved: self.counters.conflicts_resolved.load(Ordering::Relaxed),
            pending_conflicts: self.pending.lock().len(),
            sync_passes: self.counters.sync_passes.load(Ordering::Relaxed),
            audit_len,
        }
    }

    // =========================================================================
    // SYNCHRONIZATION
    // =========================================================================

    /// Close the current window and settle every conflict from closed windows.
    ///
    /// Passes are serialized. Writes to unrelated paths proceed while a pass
    /// runs.
    pub fn synchronize(&self) -> SyncReport {
        let _pass = self.sync_lock.lock();
        let started = Instant::now();
        let closing = self.window.fetch_add(1, Ordering::AcqRel);
        let mut report = SyncReport {
            window: closing,
            ..SyncReport::default()
        };

        // A writer that read the old window just before it closed may open
        // a conflict after the first snapshot, so rescan until nothing new.
        let mut visited: HashSet<StatePath> = HashSet::new();
        loop {
            let batch: Vec<StatePath> = self
                .pending
                .lock()
                .iter()
                .filter(|path| !visited.contains(*path))
                .cloned()
                .collect();
            if batch.is_empty() {
                break;
            }

            for path in batch {
                visited.insert(path.clone());
                let Some(slot) = self.paths.read().get(&path).cloned() else {
                    self.pending.lock().remove(&path);
                    continue;
                };
                let mut slot = slot.lock();
                self.settle(&path, &mut slot, closing, &mut report);
            }
        }

        report.changes.sort_by(|a, b| a.path.cmp(&b.path));
        self.counters.sync_passes.fetch_add(1, Ordering::Relaxed);

        if report.resolutions.is_empty() {
            debug!(window = closing, "Synchronization pass complete");
        } else {
            info!(
                window = closing,
                resolved = report.resolutions.len(),
                changed = report.changes.len(),
                replayed = report.replayed,
                elapsed_us = started.elapsed().as_micros() as u64,
                "Synchronization pass complete"
            );
        }
        report
    }

    fn settle(&self, path: &StatePath, slot: &mut PathSlot, closing: u64, report: &mut SyncReport) {
        let due = slot
            .conflict
            .as_ref()
            .is_some_and(|conflict| conflict.window <= closing);
        if !due {
            return;
        }
        let Some(record) = slot.conflict.take() else {
            return;
        };

        let version_before = slot.entry.as_ref().map_or(0, |entry| entry.version);
        let record_window = record.window;
        let (winner, losers) = record.resolve();

        let changed = !winner.incumbent
            && slot
                .entry
                .as_ref()
                .map_or(true, |entry| entry.data != winner.data);
        if changed {
            self.commit(
                slot,
                StateEntry {
                    data: winner.data.clone(),
                    version: 0,
                    protocol: winner.protocol.clone(),
                    timestamp: winner.timestamp,
                    confidence: winner.confidence,
                    window: record_window,
                },
            );
        } else if let Some(entry) = slot.entry.as_mut().filter(|_| !winner.incumbent) {
            // Same bytes, stronger claim: keep the version, take the winner's metadata.
            entry.protocol = winner.protocol.clone();
            entry.timestamp = winner.timestamp;
            entry.confidence = winner.confidence;
        }

        let recorded_at = now_micros();
        let loser_protocols = losers.iter().map(|c| c.protocol.clone()).collect();
        for loser in losers {
            self.record_audit(AuditRecord {
                path: path.to_string(),
                data: loser.data,
                confidence: loser.confidence,
                protocol: loser.protocol,
                timestamp: loser.timestamp,
                reason: AuditReason::Superseded {
                    winner: winner.protocol.clone(),
                    window: record_window,
                },
                recorded_at,
            });
        }
        self.counters.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
        debug!(%path, winner = %winner.protocol, changed, "Conflict resolved");

        report.resolutions.push(Resolution {
            path: path.clone(),
            window: record_window,
            winner: winner.protocol,
            losers: loser_protocols,
            changed,
        });

        let deferred = std::mem::take(&mut slot.deferred);
        if !deferred.is_empty() {
            let window = self.window.load(Ordering::Acquire);
            for write in deferred {
                self.apply_locked(slot, write, window);
                report.replayed += 1;
            }
        }

        if slot.conflict.is_none() {
            self.pending.lock().remove(path);
        }

        if let Some(entry) = &slot.entry {
            if entry.version != version_before {
                report.changes.push(StateChange {
                    path: path.to_string(),
                    data: entry.data.clone(),
                    version: entry.version,
                    protocol: entry.protocol.clone(),
                    confidence: entry.confidence,
                    timestamp: entry.timestamp,
                });
            }
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StateConfig::default())
    }
}

impl StateStoreApi for StateStore {
    fn update(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
    ) -> Result<WriteOutcome, StateError> {
        StateStore::update(self, path, data, confidence, protocol)
    }

    fn update_at(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
        timestamp: u64,
    ) -> Result<WriteOutcome, StateError> {
        StateStore::update_at(self, path, data, confidence, protocol, timestamp)
    }

    fn apply(&self, write: StateWrite) -> Result<WriteOutcome, StateError> {
        StateStore::apply(self, write)
    }

    fn get(&self, path: &str) -> Result<StateValue, StateError> {
        StateStore::get(self, path)
    }

    fn get_consistent(&self, path: &str) -> Result<StateValue, StateError> {
        StateStore::get_consistent(self, path)
    }

    fn synchronize(&self) -> SyncReport {
        StateStore::synchronize(self)
    }
}
