//! # Runtime Configuration
//!
//! Defaults with environment overrides. Every knob maps onto one of the
//! component configs; the runtime only adds the tick interval.

use sc_01_state_store::StateConfig;
use sc_02_sync_coordinator::SyncConfig;
use shared_bus::BusConfig;
use shared_types::{HasStatus, StatusCode};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default time between bus ticks (about 60 per second).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid number")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl HasStatus for ConfigError {
    fn status(&self) -> StatusCode {
        StatusCode::InitializationFailed
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub tick_interval: Duration,
    pub bus: BusConfig,
    pub state: StateConfig,
    pub sync: SyncConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            bus: BusConfig::default(),
            state: StateConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `STORM_TICK_INTERVAL_MS` (default: 16)
    /// - `STORM_SYNC_INTERVAL_MS` (default: 100)
    /// - `STORM_MAX_PAYLOAD_BYTES` (default: 65536)
    /// - `STORM_QUEUE_CAPACITY` (default: 65536)
    /// - `STORM_MAILBOX_CAPACITY` (default: 1024)
    /// - `STORM_MAX_PATHS` (default: 1000000)
    /// - `STORM_HISTORY_DEPTH` (default: 16)
    /// - `STORM_AUDIT_CAPACITY` (default: 65536)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "STORM_TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "STORM_SYNC_INTERVAL_MS")? {
            config.sync.interval = Duration::from_millis(ms);
        }
        if let Some(bytes) = parse_var(&lookup, "STORM_MAX_PAYLOAD_BYTES")? {
            config.bus.max_payload_bytes = bytes;
        }
        if let Some(capacity) = parse_var(&lookup, "STORM_QUEUE_CAPACITY")? {
            config.bus.queue_capacity = capacity;
        }
        if let Some(capacity) = parse_var(&lookup, "STORM_MAILBOX_CAPACITY")? {
            config.bus.mailbox_capacity = capacity;
        }
        if let Some(paths) = parse_var(&lookup, "STORM_MAX_PATHS")? {
            config.state.max_paths = paths;
        }
        if let Some(depth) = parse_var(&lookup, "STORM_HISTORY_DEPTH")? {
            config.state.history_depth = depth;
        }
        if let Some(capacity) = parse_var(&lookup, "STORM_AUDIT_CAPACITY")? {
            config.state.audit_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero intervals and capacities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.tick_interval.is_zero(), "tick interval"),
            (self.sync.interval.is_zero(), "sync interval"),
            (self.bus.max_payload_bytes == 0, "max payload bytes"),
            (self.bus.queue_capacity == 0, "queue capacity"),
            (self.bus.mailbox_capacity == 0, "mailbox capacity"),
            (self.bus.failure_log_capacity == 0, "failure log capacity"),
            (self.state.max_paths == 0, "max paths"),
            (self.state.audit_capacity == 0, "audit capacity"),
        ];
        match checks.iter().find(|(zero, _)| *zero) {
            Some((_, name)) => Err(ConfigError::Zero(*name)),
            None => Ok(()),
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}
