//! # Storm Runtime Library
//!
//! Wiring for the Storm core: configuration, the runtime that owns the bus,
//! store, coordinator and relay, and the metrics recorder.
//! The main entry point is the `main.rs` binary.

pub mod config;
pub mod metrics;
pub mod runtime;

pub use config::{ConfigError, RuntimeConfig, DEFAULT_TICK_INTERVAL};
pub use metrics::MetricsRecorder;
pub use runtime::StormRuntime;
