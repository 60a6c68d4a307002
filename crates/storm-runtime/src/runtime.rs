//! # Storm Runtime
//!
//! Owns every component and the tasks that drive them.
//!
//! ## Wiring
//!
//! ```text
//!            ┌──────── tick loop (tick_interval) ────────┐
//!            ↓                                            │
//!       [Event Bus] ──route──→ [StateBridge] ──→ [State Store]
//!        │      ↑                                         ↑
//!        │      └──StateChanged── [SyncCoordinator] ──────┘
//!        │                              ↑
//!        │                  sync loop (sync.interval)
//!        ↓
//!   [NetworkRelay] ←→ protocol bridges
//! ```
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown to all loops
//! 2. Wait for them (bounded)
//! 3. Final synchronization pass and tick so settled values are announced

use crate::config::{ConfigError, RuntimeConfig};
use crate::metrics::MetricsRecorder;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use sc_01_state_store::StateStore;
use sc_02_sync_coordinator::{NetworkRelay, ProtocolRegistry, StateBridge, SyncCoordinator};
use shared_bus::EventBus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storm_telemetry::{HistogramTimer, SYNC_DURATION, TICK_DURATION};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How long `shutdown` waits for each loop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The Storm core with its background tasks.
pub struct StormRuntime {
    config: RuntimeConfig,
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    registry: Arc<ProtocolRegistry>,
    bridge: Arc<StateBridge>,
    coordinator: Arc<SyncCoordinator>,
    relay: Arc<NetworkRelay>,
    recorder: Arc<Mutex<MetricsRecorder>>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl StormRuntime {
    /// Build every component. Nothing runs until [`start`](Self::start).
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            tick_ms = config.tick_interval.as_millis() as u64,
            sync_ms = config.sync.interval.as_millis() as u64,
            "Creating Storm runtime"
        );

        let bus = Arc::new(EventBus::with_config(config.bus.clone()));
        let store = Arc::new(StateStore::new(config.state.clone()));
        let registry = Arc::new(ProtocolRegistry::new());

        let bridge = StateBridge::attach(&bus, store.clone(), Arc::clone(&registry));
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            Arc::clone(&registry),
            bus.clone(),
        ));
        let relay = Arc::new(NetworkRelay::new(Arc::clone(&registry), bus.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            store,
            registry,
            bridge,
            coordinator,
            relay,
            recorder: Arc::new(Mutex::new(MetricsRecorder::new())),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Spawn the tick, sync and relay loops.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            bail!("runtime already started");
        }
        if *self.shutdown_rx.borrow() {
            bail!("runtime was shut down");
        }

        let relay_mailbox = NetworkRelay::subscribe(&self.bus)?;

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(tick_loop(
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            Arc::clone(&self.recorder),
            self.config.tick_interval,
            self.shutdown_rx.clone(),
        )));
        let store = Arc::clone(&self.store);
        let recorder = Arc::clone(&self.recorder);
        tasks.push(tokio::spawn(Arc::clone(&self.coordinator).run(
            self.config.sync.interval,
            self.shutdown_rx.clone(),
            move |report, elapsed| {
                SYNC_DURATION.observe(elapsed.as_secs_f64());
                recorder.lock().record_sync(report, &store.stats());
            },
        )));
        tasks.push(tokio::spawn(Arc::clone(&self.relay).run(
            relay_mailbox,
            self.config.tick_interval,
            self.shutdown_rx.clone(),
        )));

        info!(tasks = tasks.len(), "Storm runtime started");
        Ok(())
    }

    /// Stop all loops and flush the last window.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Runtime task failed: {}", e),
                Err(_) => warn!("Runtime task did not stop within {:?}", SHUTDOWN_GRACE),
            }
        }

        if self.running.swap(false, Ordering::AcqRel) {
            let report = self.coordinator.synchronize_once();
            let tick = self.bus.tick(Duration::ZERO);
            debug!(
                resolved = report.conflicts_resolved(),
                dispatched = tick.total_dispatched(),
                "Final window flushed"
            );
        }

        info!("Shutdown complete");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<ProtocolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn bridge(&self) -> Arc<StateBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn relay(&self) -> Arc<NetworkRelay> {
        Arc::clone(&self.relay)
    }
}

async fn tick_loop(
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    recorder: Arc<Mutex<MetricsRecorder>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last);
                last = now;

                let report = {
                    let _timer = HistogramTimer::new(&TICK_DURATION);
                    bus.tick(delta)
                };
                let failures = bus.drain_failures();
                if !failures.is_empty() {
                    debug!(tick = report.tick, failures = failures.len(), "Delivery failures drained");
                }

                let mut recorder = recorder.lock();
                recorder.record_tick(&report, &bus.stats());
                recorder.record_failures(&failures);
                if report.mutations_routed > 0 {
                    recorder.record_store(&store.stats());
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Tick loop stopped");
                    break;
                }
            }
        }
    }
}
