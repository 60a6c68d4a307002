//! # Shared Bus - Prioritized Event Bus
//!
//! Publishes envelopes into per-priority queues and drains them once per
//! tick, delivering each envelope to every matching subscriber's mailbox.
//!
//! ## Tick Model
//!
//! ```text
//!  producers ──publish()──→ ┌──────────────────────────┐
//!  (any thread)             │ System     │ ▓▓▓         │
//!                           │ Realtime   │ ▓           │
//!                           │ Ai         │ ▓▓          │  tick(): swap out,
//!                           │ Network    │             │  drain in this order,
//!                           │ Background │ ▓▓▓▓        │  FIFO inside a class
//!                           └──────────────────────────┘
//!                                       │
//!                STATE_MUTATION? ──→ MutationRouter (state store)
//!                                       │
//!                                       ▼
//!                         mailbox per matching subscription
//! ```
//!
//! - Events published while a tick is draining wait for the next tick.
//! - A full or closed mailbox never blocks the tick or other subscribers;
//!   the failure goes to a bounded failure log.
//! - Two ticks of one bus never overlap.

pub mod errors;
pub mod events;
pub mod publisher;
pub mod queue;
pub mod subscriber;

// Re-export main types
pub use errors::BusError;
pub use events::{
    DeliveryFailure, EventFilter, FailureReason, MutationRejected, TickReport,
};
pub use publisher::{BusConfig, BusStats, EventBus, EventPublisher, MutationRouter};
pub use queue::PriorityQueues;
pub use subscriber::{Mailbox, SubscriptionId, SubscriptionInfo, SubscriptionRegistry};

/// Maximum payload size accepted by `publish` unless configured otherwise.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Maximum number of envelopes waiting across all priority queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 65_536;

/// Envelopes buffered per subscriber before deliveries start failing.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Delivery failures retained for inspection.
pub const DEFAULT_FAILURE_LOG_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = BusConfig::default();
        assert_eq!(config.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
    }
}
