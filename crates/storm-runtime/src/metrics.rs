//! Feeds component counters into the Prometheus collectors.
//!
//! Bus and store keep cumulative counters; the recorder remembers the last
//! snapshot and adds only the difference.

use sc_01_state_store::{StoreStats, SyncReport};
use shared_bus::{BusStats, DeliveryFailure, TickReport};
use shared_types::Priority;
use storm_telemetry::{
    CONFLICTS_RESOLVED, DELIVERY_FAILURES, EVENTS_DELIVERED, EVENTS_DISPATCHED, EVENTS_PUBLISHED,
    EVENTS_REJECTED, QUEUE_DEPTH, STATE_WRITES, SUBSCRIPTIONS, TRACKED_PATHS,
};

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    bus: BusStats,
    store: StoreStats,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&mut self, report: &TickReport, stats: &BusStats) {
        for priority in Priority::ALL {
            let dispatched = report.dispatched[priority.index()];
            if dispatched > 0 {
                EVENTS_DISPATCHED
                    .with_label_values(&[priority.as_str()])
                    .inc_by(dispatched as u64);
            }
            QUEUE_DEPTH
                .with_label_values(&[priority.as_str()])
                .set(stats.queue_depths[priority.index()] as i64);
        }

        EVENTS_PUBLISHED.inc_by(stats.published.saturating_sub(self.bus.published));
        EVENTS_DELIVERED.inc_by(stats.delivered.saturating_sub(self.bus.delivered));
        EVENTS_REJECTED
            .with_label_values(&["invalid"])
            .inc_by(stats.rejected_invalid.saturating_sub(self.bus.rejected_invalid));
        EVENTS_REJECTED
            .with_label_values(&["queue_full"])
            .inc_by(stats.rejected_queue_full.saturating_sub(self.bus.rejected_queue_full));
        SUBSCRIPTIONS.set(stats.subscriptions as i64);

        self.bus = stats.clone();
    }

    pub fn record_failures(&self, failures: &[DeliveryFailure]) {
        for failure in failures {
            DELIVERY_FAILURES
                .with_label_values(&[failure.reason.as_str()])
                .inc();
        }
    }

    pub fn record_sync(&mut self, report: &SyncReport, stats: &StoreStats) {
        CONFLICTS_RESOLVED.inc_by(report.conflicts_resolved() as u64);
        self.record_store(stats);
    }

    pub fn record_store(&mut self, stats: &StoreStats) {
        let outcomes = [
            ("accepted", stats.writes_accepted, self.store.writes_accepted),
            ("conflict", stats.conflicts_raised, self.store.conflicts_raised),
            ("queued", stats.writes_queued, self.store.writes_queued),
            ("rejected", stats.writes_rejected, self.store.writes_rejected),
            ("refused", stats.writes_refused, self.store.writes_refused),
        ];
        for (outcome, now, before) in outcomes {
            let delta = now.saturating_sub(before);
            if delta > 0 {
                STATE_WRITES.with_label_values(&[outcome]).inc_by(delta);
            }
        }
        TRACKED_PATHS.set(stats.paths as i64);

        self.store = stats.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_deltas_are_incremental() {
        let accepted = || STATE_WRITES.with_label_values(&["accepted"]).get();
        let mut recorder = MetricsRecorder::new();
        let before = accepted();

        let mut stats = StoreStats {
            writes_accepted: 3,
            ..StoreStats::default()
        };
        recorder.record_store(&stats);
        stats.writes_accepted = 5;
        recorder.record_store(&stats);

        // Other tests may write to the same global counter concurrently.
        assert!(accepted() >= before + 5);
    }

    #[test]
    fn test_queue_depth_tracks_latest_snapshot() {
        let mut recorder = MetricsRecorder::new();
        let mut stats = BusStats::default();
        stats.queue_depths[Priority::Background.index()] = 4;
        recorder.record_tick(&TickReport::default(), &stats);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["background"]).get(), 4);
    }
}
