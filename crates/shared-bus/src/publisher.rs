//! # Event Publisher
//!
//! The [`EventBus`]: validation on publish, priority-ordered dispatch on
//! tick, and the hook that lets the state store see mutations first.

use crate::errors::BusError;
use crate::events::{DeliveryFailure, FailureReason, MutationRejected, TickReport};
use crate::queue::PriorityQueues;
use crate::subscriber::{Mailbox, SubscriptionId, SubscriptionInfo, SubscriptionRegistry};
use crate::{
    DEFAULT_FAILURE_LOG_CAPACITY, DEFAULT_MAILBOX_CAPACITY, DEFAULT_MAX_PAYLOAD_BYTES,
    DEFAULT_QUEUE_CAPACITY,
};
use parking_lot::{Mutex, RwLock};
use shared_types::{
    normalize_confidence, ComponentId, EventEnvelope, EventId, EventType, NewEvent, Priority,
    ProcessingFlags,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

/// Trait for publishing events to the bus.
///
/// Components hold this rather than the concrete bus so that tests can
/// substitute a recording publisher.
pub trait EventPublisher: Send + Sync {
    /// Validate and enqueue an event for the next tick.
    fn publish(&self, event: NewEvent) -> Result<EventId, BusError>;

    /// Total events accepted so far.
    fn events_published(&self) -> u64;
}

/// Receives `STATE_MUTATION` envelopes before they are delivered.
///
/// Called on the ticking thread, one envelope at a time, in dispatch order.
pub trait MutationRouter: Send + Sync {
    fn route(&self, envelope: &EventEnvelope) -> Result<(), MutationRejected>;
}

// =============================================================================
// CONFIGURATION & STATS
// =============================================================================

/// Bus limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub max_payload_bytes: usize,
    /// Pending envelopes across all priority classes.
    pub queue_capacity: usize,
    /// Per-subscription mailbox size.
    pub mailbox_capacity: usize,
    pub failure_log_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            failure_log_capacity: DEFAULT_FAILURE_LOG_CAPACITY,
        }
    }
}

/// Point-in-time bus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    /// Publishes refused by validation.
    pub rejected_invalid: u64,
    /// Publishes refused because the queues were at capacity.
    pub rejected_queue_full: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Failures evicted from the failure log before anyone drained them.
    pub failures_dropped: u64,
    pub ticks: u64,
    /// Pending envelopes, indexed by `Priority::index`.
    pub queue_depths: [usize; Priority::COUNT],
    pub subscriptions: usize,
}

impl BusStats {
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue_depths.iter().sum()
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    rejected_invalid: AtomicU64,
    rejected_queue_full: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

struct FailureLog {
    entries: VecDeque<DeliveryFailure>,
    capacity: usize,
    dropped: u64,
}

impl FailureLog {
    fn push(&mut self, failure: DeliveryFailure) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(failure);
    }
}

// =============================================================================
// EVENT BUS
// =============================================================================

/// Prioritized, tick-driven event bus.
///
/// Publishing and subscribing are safe from any thread. `tick` is
/// serialized: a second caller waits for the running tick to finish.
pub struct EventBus {
    config: BusConfig,
    queues: Mutex<PriorityQueues>,
    registry: SubscriptionRegistry,
    router: RwLock<Option<Arc<dyn MutationRouter>>>,
    /// Held for the whole tick; guards the tick counter.
    tick_lock: Mutex<u64>,
    failures: Mutex<FailureLog>,
    counters: Counters,
}

impl EventBus {
    /// Create a bus with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            queues: Mutex::new(PriorityQueues::new(config.queue_capacity)),
            registry: SubscriptionRegistry::new(config.mailbox_capacity),
            router: RwLock::new(None),
            tick_lock: Mutex::new(0),
            failures: Mutex::new(FailureLog {
                entries: VecDeque::new(),
                capacity: config.failure_log_capacity,
                dropped: 0,
            }),
            counters: Counters::default(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Attach the router that sees mutation envelopes before subscribers do.
    /// Replaces any previous router.
    pub fn attach_mutation_router(&self, router: Arc<dyn MutationRouter>) {
        *self.router.write() = Some(router);
        debug!("Mutation router attached");
    }

    pub fn detach_mutation_router(&self) {
        *self.router.write() = None;
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    fn validate(&self, event: &mut NewEvent) -> Result<(), BusError> {
        if !event.target.is_valid() {
            return Err(BusError::InvalidTarget);
        }

        event.event_type = EventType::from_code(event.event_type.code());
        if event.event_type.is_wildcard() {
            return Err(BusError::UnpublishableType(event.event_type));
        }

        if event.payload.len() > self.config.max_payload_bytes {
            return Err(BusError::PayloadTooLarge {
                size: event.payload.len(),
                max: self.config.max_payload_bytes,
            });
        }

        event.ai_confidence =
            normalize_confidence(event.ai_confidence).ok_or(BusError::InvalidConfidence)?;

        if event.event_type == EventType::StateMutation {
            event.flags.insert(ProcessingFlags::STATE_MUTATION);
        }
        Ok(())
    }

    fn publish_inner(&self, mut event: NewEvent) -> Result<EventId, BusError> {
        if let Err(err) = self.validate(&mut event) {
            self.counters.rejected_invalid.fetch_add(1, Ordering::Relaxed);
            debug!(error = %err, source = %event.source, "Publish rejected");
            return Err(err);
        }

        let event_type = event.event_type;
        let priority = event.priority;
        let result = self.queues.lock().push(event);

        match result {
            Ok(id) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                trace!(%id, ?event_type, priority = priority.as_str(), "Event published");
                Ok(id)
            }
            Err(err) => {
                self.counters.rejected_queue_full.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, ?event_type, "Publish rejected: queue at capacity");
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe `component` to `types`. See [`SubscriptionRegistry::subscribe`].
    pub fn subscribe(
        &self,
        component: ComponentId,
        types: &[EventType],
    ) -> Result<SubscriptionId, BusError> {
        self.registry.subscribe(component, types)
    }

    /// Remove a subscription and close its mailbox.
    ///
    /// Takes effect for every envelope whose fan-out starts after this
    /// returns, including later envelopes of a tick already running.
    /// Fan-out snapshots the matching senders per envelope, so an envelope
    /// being fanned out on another thread at the moment of the call may
    /// still land in the mailbox. Anything already delivered stays readable
    /// until the mailbox is drained.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        self.registry.unsubscribe(id).map(|_| ())
    }

    pub fn unsubscribe_component(&self, component: ComponentId) -> Result<SubscriptionId, BusError> {
        self.registry.unsubscribe_component(component)
    }

    pub fn take_mailbox(&self, id: SubscriptionId) -> Result<Mailbox, BusError> {
        self.registry.take_mailbox(id)
    }

    #[must_use]
    pub fn subscription(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.registry.get(id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Drain everything queued at entry, in priority order.
    ///
    /// Events published while this runs (including by the mutation router)
    /// stay queued for the next tick.
    pub fn tick(&self, delta_time: Duration) -> TickReport {
        let mut tick_number = self.tick_lock.lock();
        *tick_number += 1;

        let mut report = TickReport {
            tick: *tick_number,
            delta_time,
            ..TickReport::default()
        };

        let batch = self.queues.lock().take_all();
        let router = self.router.read().clone();

        for (priority, queue) in Priority::ALL.iter().zip(batch) {
            report.dispatched[priority.index()] = queue.len();
            for envelope in queue {
                self.dispatch(&envelope, router.as_deref(), &mut report);
            }
        }

        report.deferred = self.queues.lock().len();

        let dispatched = report.total_dispatched() as u64;
        self.counters.dispatched.fetch_add(dispatched, Ordering::Relaxed);
        self.counters
            .delivered
            .fetch_add(report.deliveries as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failures as u64, Ordering::Relaxed);

        if !report.is_idle() {
            debug!(
                tick = report.tick,
                dispatched,
                deliveries = report.deliveries,
                failures = report.failures,
                deferred = report.deferred,
                "Tick complete"
            );
        }
        report
    }

    fn dispatch(
        &self,
        envelope: &Arc<EventEnvelope>,
        router: Option<&dyn MutationRouter>,
        report: &mut TickReport,
    ) {
        if envelope.is_state_mutation() {
            if let Some(router) = router {
                report.mutations_routed += 1;
                if let Err(rejection) = router.route(envelope) {
                    warn!(
                        id = %envelope.id(),
                        source = %envelope.source(),
                        reason = %rejection,
                        "State mutation rejected"
                    );
                    self.record_failure(
                        DeliveryFailure::new(
                            envelope,
                            None,
                            ComponentId::STATE_STORE,
                            FailureReason::MutationRejected(rejection),
                            report.tick,
                        ),
                        report,
                    );
                }
            }
        }

        let recipients = self.registry.recipients(envelope);
        if recipients.is_empty() {
            trace!(id = %envelope.id(), event_type = ?envelope.event_type(), "No subscribers");
            return;
        }

        for recipient in recipients {
            match recipient.sender.try_send(Arc::clone(envelope)) {
                Ok(()) => report.deliveries += 1,
                Err(err) => {
                    let reason = match err {
                        TrySendError::Full(_) => FailureReason::MailboxFull,
                        TrySendError::Closed(_) => FailureReason::MailboxClosed,
                    };
                    warn!(
                        id = %envelope.id(),
                        subscription = %recipient.id,
                        component = %recipient.component,
                        %reason,
                        "Event delivery failed"
                    );
                    self.record_failure(
                        DeliveryFailure::new(
                            envelope,
                            Some(recipient.id),
                            recipient.component,
                            reason,
                            report.tick,
                        ),
                        report,
                    );
                }
            }
        }
    }

    fn record_failure(&self, failure: DeliveryFailure, report: &mut TickReport) {
        report.failures += 1;
        self.failures.lock().push(failure);
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Take the failure log, oldest first.
    pub fn drain_failures(&self) -> Vec<DeliveryFailure> {
        self.failures.lock().entries.drain(..).collect()
    }

    /// Envelopes waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queues.lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> BusStats {
        let queue_depths = self.queues.lock().depths();
        let failures_dropped = self.failures.lock().dropped;
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            rejected_invalid: self.counters.rejected_invalid.load(Ordering::Relaxed),
            rejected_queue_full: self.counters.rejected_queue_full.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            failures_dropped,
            ticks: *self.tick_lock.lock(),
            queue_depths,
            subscriptions: self.registry.len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: NewEvent) -> Result<EventId, BusError> {
        self.publish_inner(event)
    }

    fn events_published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, event: NewEvent) -> Result<EventId, BusError> {
        (**self).publish(event)
    }

    fn events_published(&self) -> u64 {
        (**self).events_published()
    }
}
