//! # Storm Telemetry
//!
//! Logging and metrics for the Storm core.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter` and pretty or JSON output
//! - **Metrics**: Prometheus collectors on a process-wide registry, rendered
//!   with [`encode_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storm_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // tracing macros and metrics are live until the guard drops
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STORM_SERVICE_NAME` | `storm-core` | Service name in the startup log |
//! | `STORM_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `STORM_JSON_LOGS` | `false` | JSON formatted logs |
//! | `STORM_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `STORM_METRICS_ENABLED` | `true` | Register Prometheus collectors |

mod config;
mod logging;
mod metrics;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{build_filter, init_logging};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, CONFLICTS_RESOLVED,
    DELIVERY_FAILURES, EVENTS_DELIVERED, EVENTS_DISPATCHED, EVENTS_PUBLISHED, EVENTS_REJECTED,
    QUEUE_DEPTH, REGISTRY, STATE_WRITES, SUBSCRIPTIONS, SYNC_DURATION, TICK_DURATION,
    TRACKED_PATHS,
};

use shared_types::{HasStatus, StatusCode};
use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl HasStatus for TelemetryError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::InvalidParameters,
            Self::LoggingInit(_) | Self::MetricsInit(_) => StatusCode::InitializationFailed,
        }
    }
}

/// Initialize logging and, when enabled, metrics.
///
/// Returns a guard that should be held for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first; they need no subscriber.
    let metrics = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };

    logging::init_logging(&config)?;

    if let Some(handle) = &metrics {
        tracing::debug!(collectors = handle.collectors(), "Prometheus metrics registered");
    }

    Ok(TelemetryGuard {
        service_name: config.service_name,
        metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    metrics: Option<MetricsHandle>,
}

impl TelemetryGuard {
    #[must_use]
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
