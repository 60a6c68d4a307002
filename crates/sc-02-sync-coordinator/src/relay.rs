//! # Network Relay
//!
//! Plays the network manager on the bus: consumes `NetworkSend` envelopes,
//! hands their bytes to the named [`ProtocolBridge`], and republishes
//! whatever the bridges receive as `NetworkReceive` events.
//!
//! Bridge failures are logged and counted here; they never reach the tick.

use crate::domain::{BridgeError, ProtocolKind, ProtocolRegistry, SyncError};
use crate::ports::ProtocolBridge;
use parking_lot::RwLock;
use shared_bus::{BusError, EventBus, EventPublisher, Mailbox};
use shared_types::{
    now_micros, ComponentId, EventEnvelope, EventType, InboundMessage, NewEvent, OutboundMessage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub forwarded: u64,
    pub forward_failures: u64,
    pub received: u64,
    pub receive_failures: u64,
}

#[derive(Default)]
struct Counters {
    forwarded: AtomicU64,
    forward_failures: AtomicU64,
    received: AtomicU64,
    receive_failures: AtomicU64,
}

pub struct NetworkRelay {
    bridges: RwLock<HashMap<String, Arc<dyn ProtocolBridge>>>,
    registry: Arc<ProtocolRegistry>,
    publisher: Arc<dyn EventPublisher>,
    counters: Counters,
}

impl NetworkRelay {
    pub fn new(registry: Arc<ProtocolRegistry>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            bridges: RwLock::new(HashMap::new()),
            registry,
            publisher,
            counters: Counters::default(),
        }
    }

    /// Subscribe as the network manager and claim the mailbox.
    pub fn subscribe(bus: &EventBus) -> Result<Mailbox, BusError> {
        let id = bus.subscribe(ComponentId::NETWORK_MANAGER, &[EventType::NetworkSend])?;
        bus.take_mailbox(id)
    }

    /// Add a bridge, registering its protocol if needed.
    pub fn register_bridge(&self, bridge: Arc<dyn ProtocolBridge>) -> Result<(), SyncError> {
        let name = bridge.name().to_string();
        match self.registry.register(&name, bridge.kind()) {
            Ok(()) | Err(SyncError::ProtocolAlreadyRegistered(_)) => {}
            Err(err) => return Err(err),
        }
        self.bridges.write().insert(name.clone(), bridge);
        info!(protocol = %name, "Protocol bridge attached");
        Ok(())
    }

    pub fn remove_bridge(&self, name: &str) -> Option<Arc<dyn ProtocolBridge>> {
        self.bridges.write().remove(name)
    }

    /// Names of attached bridges, sorted.
    #[must_use]
    pub fn bridges(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bridges.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn bridge(&self, name: &str) -> Option<Arc<dyn ProtocolBridge>> {
        self.bridges.read().get(name).cloned()
    }

    /// Hand one `NetworkSend` envelope to its bridge.
    pub async fn forward(&self, envelope: &EventEnvelope) -> Result<(), SyncError> {
        let result = self.try_forward(envelope).await;
        match &result {
            Ok(()) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.counters.forward_failures.fetch_add(1, Ordering::Relaxed);
                warn!(id = %envelope.id(), %error, "Outbound message not delivered");
            }
        }
        result
    }

    async fn try_forward(&self, envelope: &EventEnvelope) -> Result<(), SyncError> {
        let message = OutboundMessage::decode(envelope.payload())?;
        let bridge = self
            .bridge(&message.protocol)
            .ok_or_else(|| SyncError::BridgeNotFound(message.protocol.clone()))?;

        if !bridge.is_connected() {
            return Err(SyncError::Bridge {
                protocol: message.protocol,
                source: BridgeError::NotConnected,
            });
        }

        bridge
            .send(&message.bytes)
            .await
            .map_err(|source| SyncError::Bridge {
                protocol: message.protocol.clone(),
                source,
            })?;
        debug!(protocol = %message.protocol, bytes = message.bytes.len(), "Outbound message sent");
        Ok(())
    }

    /// Drain every connected bridge's inbound queue onto the bus.
    ///
    /// Returns the number of messages published.
    pub async fn poll_bridges(&self) -> usize {
        let bridges: Vec<Arc<dyn ProtocolBridge>> = self.bridges.read().values().cloned().collect();
        let mut published = 0;

        for bridge in bridges {
            if !bridge.is_connected() {
                continue;
            }
            loop {
                match bridge.poll_inbound().await {
                    Ok(Some(bytes)) => {
                        let message = InboundMessage {
                            protocol: bridge.name().to_string(),
                            bytes,
                            received_at: now_micros(),
                        };
                        if self.publish_inbound(&message) {
                            published += 1;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        self.counters.receive_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(protocol = bridge.name(), %error, "Inbound poll failed");
                        break;
                    }
                }
            }
        }
        published
    }

    fn publish_inbound(&self, message: &InboundMessage) -> bool {
        let result = NewEvent::network_receive(message)
            .map_err(SyncError::from)
            .and_then(|event| self.publisher.publish(event).map_err(SyncError::from));
        match result {
            Ok(_) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(error) => {
                self.counters.receive_failures.fetch_add(1, Ordering::Relaxed);
                warn!(protocol = %message.protocol, %error, "Inbound message dropped");
                false
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            forward_failures: self.counters.forward_failures.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            receive_failures: self.counters.receive_failures.load(Ordering::Relaxed),
        }
    }

    /// Forward mailbox traffic and poll bridges every `poll_interval` until
    /// shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut mailbox: Mailbox,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(bridges = self.bridges.read().len(), "Network relay started");

        loop {
            tokio::select! {
                envelope = mailbox.recv() => {
                    match envelope {
                        // Errors are already counted and logged.
                        Some(envelope) => { let _ = self.forward(&envelope).await; }
                        None => {
                            info!("Relay mailbox closed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.poll_bridges().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Network relay stopped");
                        break;
                    }
                }
            }
        }
    }
}

/// Map a protocol name to the kind used when auto-registering bridges.
#[must_use]
pub fn kind_for_name(name: &str) -> ProtocolKind {
    match name.to_ascii_lowercase().as_str() {
        "opensim" | "opensimulator" => ProtocolKind::OpenSimulator,
        "metaverse" | "finalverse" => ProtocolKind::MetaVerse,
        "webrtc" => ProtocolKind::WebRtc,
        _ => ProtocolKind::External,
    }
}
