//! # Bus Errors

use crate::subscriber::SubscriptionId;
use shared_types::{ComponentId, EventType, HasStatus, StatusCode};
use thiserror::Error;

/// Errors returned synchronously by bus operations.
///
/// Nothing is enqueued or registered when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Target id 0 (use `ComponentId::BROADCAST` for broadcast).
    #[error("Target component id 0 is not a valid destination")]
    InvalidTarget,

    #[error("Payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// The wildcard type only exists for filters.
    #[error("Event type {0:?} cannot be published")]
    UnpublishableType(EventType),

    #[error("AI confidence must be a number")]
    InvalidConfidence,

    #[error("Subscription requires at least one event type")]
    EmptyFilter,

    #[error("Component id 0 cannot subscribe")]
    InvalidComponent,

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error("No subscription registered for {0}")]
    ComponentNotSubscribed(ComponentId),

    #[error("Mailbox for subscription {0} was already claimed")]
    MailboxClaimed(SubscriptionId),

    /// Backpressure: the new event is rejected, queued events are kept.
    #[error("Event queue full ({capacity} events pending)")]
    QueueFull { capacity: usize },
}

impl BusError {
    /// True for the "unknown handle" family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionNotFound(_) | Self::ComponentNotSubscribed(_)
        )
    }
}

impl HasStatus for BusError {
    fn status(&self) -> StatusCode {
        match self {
            Self::QueueFull { .. } => StatusCode::OutOfMemory,
            _ => StatusCode::InvalidParameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BusError::QueueFull { capacity: 4 }.status(),
            StatusCode::OutOfMemory
        );
        assert_eq!(BusError::InvalidTarget.status(), StatusCode::InvalidParameters);
        assert_eq!(BusError::EmptyFilter.status(), StatusCode::InvalidParameters);
    }

    #[test]
    fn test_error_display() {
        let err = BusError::PayloadTooLarge { size: 10, max: 4 };
        assert!(err.to_string().contains("10 bytes"));
        assert!(BusError::ComponentNotSubscribed(ComponentId(3)).is_not_found());
    }
}
