//! # Storm Runtime
//!
//! Runs the Storm core until Ctrl-C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging, metrics)
//! 2. Load configuration from the environment
//! 3. Build and start the runtime
//! 4. Wait for Ctrl-C, then shut down gracefully

use anyhow::{Context, Result};
use storm_runtime::{RuntimeConfig, StormRuntime};
use storm_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_service("storm-runtime"))
        .context("failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;

    let runtime = StormRuntime::new(config).context("failed to build runtime")?;
    runtime.start()?;

    info!("Storm core is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    match storm_telemetry::encode_metrics() {
        Ok(metrics) => debug!("Final metrics:\n{metrics}"),
        Err(e) => warn!("Failed to encode metrics: {}", e),
    }

    Ok(())
}
