//! Prometheus metrics for the Storm core.
//!
//! All metrics follow the naming convention: `storm_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., bus_events_published_total)
//! - **Gauge**: Value that can go up or down (e.g., bus_queue_depth)
//! - **Histogram**: Distribution of values (e.g., bus_tick_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

use crate::TelemetryError;

/// Tick and sync durations: 10µs to ~80ms.
const DURATION_BUCKETS: &[f64] = &[
    0.000_01, 0.000_02, 0.000_04, 0.000_08, 0.000_16, 0.000_32, 0.000_64, 0.001_28, 0.002_56,
    0.005_12, 0.010_24, 0.020_48, 0.040_96, 0.081_92,
];

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    /// Events accepted by `publish`
    pub static ref EVENTS_PUBLISHED: IntCounter = IntCounter::new(
        "storm_bus_events_published_total",
        "Total events accepted by the event bus"
    ).expect("metric creation failed");

    /// Events refused at publish time
    pub static ref EVENTS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("storm_bus_events_rejected_total", "Events refused at publish time"),
        &["reason"]  // reason: invalid/queue_full
    ).expect("metric creation failed");

    /// Events drained by a tick
    pub static ref EVENTS_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("storm_bus_events_dispatched_total", "Events drained from the queues by ticks"),
        &["priority"]
    ).expect("metric creation failed");

    /// Envelopes placed in a subscriber mailbox
    pub static ref EVENTS_DELIVERED: IntCounter = IntCounter::new(
        "storm_bus_deliveries_total",
        "Total envelopes delivered to subscriber mailboxes"
    ).expect("metric creation failed");

    /// Failed deliveries
    pub static ref DELIVERY_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("storm_bus_delivery_failures_total", "Deliveries that did not reach a mailbox"),
        &["reason"]  // reason: mailbox_full/mailbox_closed/mutation_rejected
    ).expect("metric creation failed");

    /// Pending events per priority class
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("storm_bus_queue_depth", "Events waiting for the next tick"),
        &["priority"]
    ).expect("metric creation failed");

    /// Live subscriptions
    pub static ref SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "storm_bus_subscriptions",
        "Number of live subscriptions"
    ).expect("metric creation failed");

    /// Tick duration histogram
    pub static ref TICK_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "storm_bus_tick_duration_seconds",
            "Time spent draining and dispatching one tick"
        ).buckets(DURATION_BUCKETS.to_vec())
    ).expect("metric creation failed");

    // =========================================================================
    // STATE METRICS
    // =========================================================================

    /// State writes by outcome
    pub static ref STATE_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new("storm_state_writes_total", "State writes by outcome"),
        &["outcome"]  // outcome: accepted/conflict/queued/rejected/refused
    ).expect("metric creation failed");

    /// Conflicts settled by synchronization
    pub static ref CONFLICTS_RESOLVED: IntCounter = IntCounter::new(
        "storm_state_conflicts_resolved_total",
        "Total conflicts settled by synchronization passes"
    ).expect("metric creation failed");

    /// Paths holding a value
    pub static ref TRACKED_PATHS: IntGauge = IntGauge::new(
        "storm_state_paths",
        "Number of state paths holding a value"
    ).expect("metric creation failed");

    /// Synchronization pass duration
    pub static ref SYNC_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "storm_state_sync_duration_seconds",
            "Time spent in one synchronization pass"
        ).buckets(DURATION_BUCKETS.to_vec())
    ).expect("metric creation failed");
}

/// Proof that the collectors are registered.
#[derive(Debug)]
pub struct MetricsHandle {
    collectors: usize,
}

impl MetricsHandle {
    /// Number of registered collectors.
    #[must_use]
    pub fn collectors(&self) -> usize {
        self.collectors
    }
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless; already registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_REJECTED.clone()),
        Box::new(EVENTS_DISPATCHED.clone()),
        Box::new(EVENTS_DELIVERED.clone()),
        Box::new(DELIVERY_FAILURES.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(SUBSCRIPTIONS.clone()),
        Box::new(TICK_DURATION.clone()),
        // State
        Box::new(STATE_WRITES.clone()),
        Box::new(CONFLICTS_RESOLVED.clone()),
        Box::new(TRACKED_PATHS.clone()),
        Box::new(SYNC_DURATION.clone()),
    ];
    let collectors = metrics.len();

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { collectors })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let first = register_metrics().unwrap();
        let second = register_metrics().unwrap();
        assert_eq!(first.collectors(), second.collectors());
    }

    #[test]
    fn test_encode_contains_registered_metrics() {
        register_metrics().unwrap();
        EVENTS_PUBLISHED.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("storm_bus_events_published_total"));
    }

    #[test]
    fn test_gauge_vec_set() {
        QUEUE_DEPTH.with_label_values(&["realtime"]).set(7);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["realtime"]).get(), 7);
    }

    #[test]
    fn test_histogram_timer() {
        let before = SYNC_DURATION.get_sample_count();
        {
            let _timer = HistogramTimer::new(&SYNC_DURATION);
        }
        assert!(SYNC_DURATION.get_sample_count() > before);
    }
}
