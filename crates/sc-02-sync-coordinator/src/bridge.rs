//! # State Bridge
//!
//! Routes `StateMutation` envelopes from the bus into the state store and
//! announces accepted writes as `StateChanged` events.
//!
//! The bus owns the bridge (as its mutation router), so the bridge only
//! keeps a weak handle back to the bus.

use crate::domain::ProtocolRegistry;
use sc_01_state_store::{StateStoreApi, WriteOutcome};
use shared_bus::{EventBus, EventPublisher, MutationRejected, MutationRouter};
use shared_types::{EventEnvelope, HasStatus, NewEvent, StateChange, StateMutation, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Routed-mutation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub routed: u64,
    pub accepted: u64,
    pub conflicts: u64,
    pub queued: u64,
    pub rejected: u64,
    /// `StateChanged` events that could not be published.
    pub notify_failures: u64,
}

#[derive(Default)]
struct Counters {
    routed: AtomicU64,
    accepted: AtomicU64,
    conflicts: AtomicU64,
    queued: AtomicU64,
    rejected: AtomicU64,
    notify_failures: AtomicU64,
}

/// Mutation router between the bus and the state store.
pub struct StateBridge {
    store: Arc<dyn StateStoreApi>,
    registry: Arc<ProtocolRegistry>,
    publisher: Weak<dyn EventPublisher>,
    counters: Counters,
}

impl StateBridge {
    pub fn new(
        store: Arc<dyn StateStoreApi>,
        registry: Arc<ProtocolRegistry>,
        publisher: Weak<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            registry,
            publisher,
            counters: Counters::default(),
        }
    }

    /// Create a bridge and install it as `bus`'s mutation router.
    pub fn attach(
        bus: &Arc<EventBus>,
        store: Arc<dyn StateStoreApi>,
        registry: Arc<ProtocolRegistry>,
    ) -> Arc<Self> {
        let weak_bus: Weak<EventBus> = Arc::downgrade(bus);
        let publisher: Weak<dyn EventPublisher> = weak_bus;
        let bridge = Arc::new(Self::new(store, registry, publisher));
        bus.attach_mutation_router(Arc::clone(&bridge) as Arc<dyn MutationRouter>);
        bridge
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            notify_failures: self.counters.notify_failures.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, status: StatusCode, reason: String) -> MutationRejected {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        MutationRejected::new(status, reason)
    }

    fn notify(&self, change: &StateChange) {
        let Some(publisher) = self.publisher.upgrade() else {
            return;
        };
        let published = NewEvent::state_changed(change)
            .map_err(|e| e.to_string())
            .and_then(|event| publisher.publish(event).map_err(|e| e.to_string()));
        if let Err(error) = published {
            self.counters.notify_failures.fetch_add(1, Ordering::Relaxed);
            warn!(path = %change.path, %error, "Failed to publish state change");
        }
    }
}

impl MutationRouter for StateBridge {
    fn route(&self, envelope: &EventEnvelope) -> Result<(), MutationRejected> {
        self.counters.routed.fetch_add(1, Ordering::Relaxed);

        let mutation = StateMutation::decode(envelope.payload())
            .map_err(|e| self.reject(e.status(), e.to_string()))?;

        if let Err(error) = self.registry.ensure(&mutation.protocol) {
            debug!(protocol = %mutation.protocol, %error, "Protocol not tracked");
        }

        let confidence = envelope.ai_confidence();
        let timestamp = envelope.timestamp();
        let outcome = match self.store.update_at(
            &mutation.path,
            mutation.data.clone(),
            confidence,
            &mutation.protocol,
            timestamp,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.registry.record_rejection(&mutation.protocol);
                return Err(self.reject(err.status(), err.to_string()));
            }
        };

        self.registry.record_outcome(&mutation.protocol, outcome);
        match outcome {
            WriteOutcome::Accepted { version } => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                self.notify(&StateChange {
                    path: mutation.path,
                    data: mutation.data,
                    version,
                    protocol: mutation.protocol,
                    confidence,
                    timestamp,
                });
            }
            WriteOutcome::Conflict { candidates } => {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(path = %mutation.path, candidates, "Routed write is contested");
            }
            WriteOutcome::Queued => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}
