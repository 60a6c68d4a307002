//! # Synchronization Coordinator
//!
//! Drives `synchronize` on the state store, announces every changed path on
//! the bus and keeps the protocol win/loss counters current.

use crate::domain::ProtocolRegistry;
use sc_01_state_store::{StateStoreApi, SyncReport};
use shared_bus::EventPublisher;
use shared_types::NewEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default time between synchronization passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Periodic synchronization driver.
pub struct SyncCoordinator {
    store: Arc<dyn StateStoreApi>,
    registry: Arc<ProtocolRegistry>,
    publisher: Arc<dyn EventPublisher>,
    passes: AtomicU64,
    notify_failures: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn StateStoreApi>,
        registry: Arc<ProtocolRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
            passes: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
        }
    }

    /// Run one pass and publish a `StateChanged` event per changed path.
    pub fn synchronize_once(&self) -> SyncReport {
        let report = self.store.synchronize();
        self.passes.fetch_add(1, Ordering::Relaxed);

        for resolution in &report.resolutions {
            self.registry.record_resolution(resolution);
        }

        for change in &report.changes {
            let published = NewEvent::state_changed(change)
                .map_err(|e| e.to_string())
                .and_then(|event| self.publisher.publish(event).map_err(|e| e.to_string()));
            if let Err(error) = published {
                self.notify_failures.fetch_add(1, Ordering::Relaxed);
                warn!(path = %change.path, %error, "Failed to publish state change");
            }
        }

        if !report.changes.is_empty() {
            debug!(
                window = report.window,
                changed = report.changes.len(),
                "State changes published"
            );
        }
        report
    }

    /// Passes run so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }

    /// Synchronize every `interval` until `shutdown` turns true or its
    /// sender is dropped. `on_pass` sees each report and how long the pass
    /// took.
    pub async fn run<F>(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        mut on_pass: F,
    ) where
        F: FnMut(&SyncReport, Duration) + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, "Sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let report = self.synchronize_once();
                    let elapsed = started.elapsed();
                    if report.conflicts_resolved() > 0 || report.replayed > 0 {
                        info!(
                            window = report.window,
                            resolved = report.conflicts_resolved(),
                            replayed = report.replayed,
                            "Synchronization pass"
                        );
                    }
                    on_pass(&report, elapsed);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(passes = self.passes(), "Sync loop stopped");
                        break;
                    }
                }
            }
        }
    }
}
