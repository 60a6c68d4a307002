//! # Bus Events
//!
//! Filter, failure and tick report types shared by the publishing and
//! subscribing halves of the bus.

use crate::subscriber::SubscriptionId;
use shared_types::{ComponentId, EventEnvelope, EventId, EventType, Priority, StatusCode};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

// =============================================================================
// EVENT FILTER
// =============================================================================

/// Set of event types a subscription accepts.
///
/// `EventType::All` in the set matches every type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    types: BTreeSet<EventType>,
}

impl EventFilter {
    /// Filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::types([EventType::All])
    }

    /// Filter for specific event types.
    #[must_use]
    pub fn types(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    /// Add every type of `other` to this filter.
    pub fn merge(&mut self, other: &EventFilter) {
        self.types.extend(other.types.iter().copied());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[must_use]
    pub fn accepts_all(&self) -> bool {
        self.types.contains(&EventType::All)
    }

    /// Check if an event type passes this filter.
    #[must_use]
    pub fn matches(&self, event_type: EventType) -> bool {
        self.accepts_all() || self.types.contains(&event_type)
    }

    /// Types in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        self.types.iter().copied()
    }
}

// =============================================================================
// DELIVERY FAILURES
// =============================================================================

/// Why an envelope did not reach a recipient.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The subscriber is not draining its mailbox fast enough.
    MailboxFull,
    /// The subscriber dropped its mailbox.
    MailboxClosed,
    /// The mutation router refused the write. The envelope was still delivered.
    MutationRejected(MutationRejected),
}

impl FailureReason {
    /// Snake-case label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MailboxFull => "mailbox_full",
            Self::MailboxClosed => "mailbox_closed",
            Self::MutationRejected(_) => "mutation_rejected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MailboxFull => f.write_str("mailbox full"),
            Self::MailboxClosed => f.write_str("mailbox closed"),
            Self::MutationRejected(rejection) => write!(f, "mutation rejected: {rejection}"),
        }
    }
}

/// One failed hand-off, kept in the bus failure log.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub event_id: EventId,
    pub event_type: EventType,
    pub priority: Priority,
    /// `None` for router failures, which are not tied to a subscription.
    pub subscription: Option<SubscriptionId>,
    pub component: ComponentId,
    pub reason: FailureReason,
    /// Tick number during which the failure happened.
    pub tick: u64,
}

impl DeliveryFailure {
    pub(crate) fn new(
        envelope: &EventEnvelope,
        subscription: Option<SubscriptionId>,
        component: ComponentId,
        reason: FailureReason,
        tick: u64,
    ) -> Self {
        Self {
            event_id: envelope.id(),
            event_type: envelope.event_type(),
            priority: envelope.priority(),
            subscription,
            component,
            reason,
            tick,
        }
    }
}

/// Refusal returned by a [`crate::MutationRouter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRejected {
    pub status: StatusCode,
    pub reason: String,
}

impl MutationRejected {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MutationRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.status)
    }
}

// =============================================================================
// TICK REPORT
// =============================================================================

/// Outcome of one `tick`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Monotonic tick number, starting at 1.
    pub tick: u64,
    /// Host-supplied time since the previous tick.
    pub delta_time: Duration,
    /// Envelopes drained, per priority class.
    pub dispatched: [usize; Priority::COUNT],
    /// Successful mailbox hand-offs.
    pub deliveries: usize,
    /// Failed hand-offs and router rejections.
    pub failures: usize,
    /// Mutation envelopes routed to the state store.
    pub mutations_routed: usize,
    /// Envelopes published during this tick, left for the next one.
    pub deferred: usize,
}

impl TickReport {
    /// Total envelopes drained.
    #[must_use]
    pub fn total_dispatched(&self) -> usize {
        self.dispatched.iter().sum()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.total_dispatched() == 0
    }
}
