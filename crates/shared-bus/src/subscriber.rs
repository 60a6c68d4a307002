//! # Event Subscriber
//!
//! Subscription registry and per-subscription mailboxes.
//!
//! Subscriptions live in a slot arena. A `SubscriptionId` carries the slot
//! generation, so a handle kept after `unsubscribe` never resolves to a
//! later subscription that reused the slot.

use crate::errors::BusError;
use crate::events::EventFilter;
use parking_lot::RwLock;
use shared_types::{now_micros, ComponentId, EventEnvelope, EventType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

/// Generation-checked subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId {
    index: u32,
    generation: u32,
}

impl SubscriptionId {
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}.{}", self.index, self.generation)
    }
}

/// Read-only view of a registered subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub component: ComponentId,
    pub filter: EventFilter,
    pub created_at: u64,
    pub mailbox_claimed: bool,
}

// =============================================================================
// MAILBOX
// =============================================================================

/// Receiving end of a subscription.
///
/// Yields envelopes in delivery order. Once the subscription is removed and
/// the buffered envelopes are consumed, `recv` returns `None`.
#[derive(Debug)]
pub struct Mailbox {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Arc<EventEnvelope>>,
}

impl Mailbox {
    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next envelope.
    pub async fn recv(&mut self) -> Option<Arc<EventEnvelope>> {
        self.receiver.recv().await
    }

    /// Next envelope if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<EventEnvelope>> {
        self.receiver.try_recv().ok()
    }

    /// Every envelope buffered right now.
    pub fn drain(&mut self) -> Vec<Arc<EventEnvelope>> {
        let mut envelopes = Vec::new();
        while let Ok(envelope) = self.receiver.try_recv() {
            envelopes.push(envelope);
        }
        envelopes
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

struct Subscription {
    component: ComponentId,
    filter: EventFilter,
    created_at: u64,
    sender: mpsc::Sender<Arc<EventEnvelope>>,
    /// Present until the owner claims it with `take_mailbox`.
    mailbox: Option<mpsc::Receiver<Arc<EventEnvelope>>>,
}

struct Slot {
    generation: u32,
    entry: Option<Subscription>,
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_component: HashMap<ComponentId, SubscriptionId>,
}

impl RegistryInner {
    fn get(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn get_mut(&mut self, id: SubscriptionId) -> Option<&mut Subscription> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn insert(&mut self, subscription: Subscription) -> SubscriptionId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(subscription);
            SubscriptionId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot {
                generation: 0,
                entry: Some(subscription),
            });
            SubscriptionId {
                index,
                generation: 0,
            }
        }
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.by_component.remove(&entry.component);
        Some(entry)
    }
}

/// A mailbox sender that matched an envelope.
#[derive(Debug, Clone)]
pub(crate) struct Recipient {
    pub id: SubscriptionId,
    pub component: ComponentId,
    pub sender: mpsc::Sender<Arc<EventEnvelope>>,
}

/// Registry of component subscriptions.
///
/// A component has at most one subscription. Subscribing again merges the
/// new types into the existing filter and returns the same id.
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
    mailbox_capacity: usize,
}

impl SubscriptionRegistry {
    /// Registry whose mailboxes buffer `mailbox_capacity` envelopes each.
    #[must_use]
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    /// Register `component` for `types`.
    pub fn subscribe(
        &self,
        component: ComponentId,
        types: &[EventType],
    ) -> Result<SubscriptionId, BusError> {
        if !component.is_valid() || component.is_broadcast() {
            return Err(BusError::InvalidComponent);
        }
        let filter = EventFilter::types(types.iter().map(|t| EventType::from_code(t.code())));
        if filter.is_empty() {
            return Err(BusError::EmptyFilter);
        }

        let mut inner = self.inner.write();

        let existing = inner.by_component.get(&component).copied();
        if let Some(existing) = existing {
            if let Some(subscription) = inner.get_mut(existing) {
                subscription.filter.merge(&filter);
                debug!(%component, id = %existing, "Subscription filter extended");
                return Ok(existing);
            }
        }

        let (sender, receiver) = mpsc::channel(self.mailbox_capacity);
        let id = inner.insert(Subscription {
            component,
            filter,
            created_at: now_micros(),
            sender,
            mailbox: Some(receiver),
        });
        inner.by_component.insert(component, id);

        debug!(%component, %id, "New subscription created");
        Ok(id)
    }

    /// Remove a subscription. Its mailbox closes once drained.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<ComponentId, BusError> {
        let removed = self
            .inner
            .write()
            .remove(id)
            .ok_or(BusError::SubscriptionNotFound(id))?;
        debug!(component = %removed.component, %id, "Subscription removed");
        Ok(removed.component)
    }

    /// Remove whatever subscription `component` holds.
    pub fn unsubscribe_component(&self, component: ComponentId) -> Result<SubscriptionId, BusError> {
        let mut inner = self.inner.write();
        let id = inner
            .by_component
            .get(&component)
            .copied()
            .ok_or(BusError::ComponentNotSubscribed(component))?;
        inner.remove(id);
        debug!(%component, %id, "Subscription removed");
        Ok(id)
    }

    /// Claim the receiving end of a subscription. Succeeds once per id.
    pub fn take_mailbox(&self, id: SubscriptionId) -> Result<Mailbox, BusError> {
        let mut inner = self.inner.write();
        let subscription = inner
            .get_mut(id)
            .ok_or(BusError::SubscriptionNotFound(id))?;
        let receiver = subscription
            .mailbox
            .take()
            .ok_or(BusError::MailboxClaimed(id))?;
        Ok(Mailbox { id, receiver })
    }

    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.inner.read().get(id).map(|sub| SubscriptionInfo {
            id,
            component: sub.component,
            filter: sub.filter.clone(),
            created_at: sub.created_at,
            mailbox_claimed: sub.mailbox.is_none(),
        })
    }

    #[must_use]
    pub fn find(&self, component: ComponentId) -> Option<SubscriptionId> {
        self.inner.read().by_component.get(&component).copied()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_component.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscriptions that should receive `envelope`, in slot order.
    ///
    /// The returned senders outlive the read lock, so a concurrent
    /// unsubscribe does not stop delivery of this one envelope.
    pub(crate) fn recipients(&self, envelope: &EventEnvelope) -> Vec<Recipient> {
        let inner = self.inner.read();
        inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let sub = slot.entry.as_ref()?;
                if !sub.filter.matches(envelope.event_type())
                    || !envelope.is_addressed_to(sub.component)
                {
                    return None;
                }
                Some(Recipient {
                    id: SubscriptionId {
                        index: u32::try_from(index).unwrap_or(u32::MAX),
                        generation: slot.generation,
                    },
                    component: sub.component,
                    sender: sub.sender.clone(),
                })
            })
            .collect()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAILBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{EventId, NewEvent};

    fn envelope(event_type: EventType, target: ComponentId) -> EventEnvelope {
        EventEnvelope::seal(
            EventId(1),
            NewEvent::new(event_type, ComponentId(99)).with_target(target),
        )
    }

    #[test]
    fn test_subscribe_and_match() {
        let registry = SubscriptionRegistry::new(4);
        let id = registry
            .subscribe(ComponentId::RENDERER, &[EventType::ObjectUpdate])
            .unwrap();

        let hits = registry.recipients(&envelope(EventType::ObjectUpdate, ComponentId::BROADCAST));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);

        assert!(registry
            .recipients(&envelope(EventType::ChatMessage, ComponentId::BROADCAST))
            .is_empty());
    }

    #[test]
    fn test_targeted_envelope_skips_other_components() {
        let registry = SubscriptionRegistry::new(4);
        registry.subscribe(ComponentId::RENDERER, &[EventType::All]).unwrap();
        registry.subscribe(ComponentId::INPUT, &[EventType::All]).unwrap();

        let hits = registry.recipients(&envelope(EventType::Render, ComponentId::INPUT));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].component, ComponentId::INPUT);
    }

    #[test]
    fn test_resubscribe_merges_types() {
        let registry = SubscriptionRegistry::new(4);
        let first = registry
            .subscribe(ComponentId::RENDERER, &[EventType::ChatMessage])
            .unwrap();
        let second = registry
            .subscribe(ComponentId::RENDERER, &[EventType::Render])
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        let info = registry.get(first).unwrap();
        assert!(info.filter.matches(EventType::ChatMessage));
        assert!(info.filter.matches(EventType::Render));
    }

    #[test]
    fn test_invalid_subscriptions_rejected() {
        let registry = SubscriptionRegistry::new(4);
        assert_eq!(
            registry.subscribe(ComponentId::NONE, &[EventType::All]),
            Err(BusError::InvalidComponent)
        );
        assert_eq!(
            registry.subscribe(ComponentId::RENDERER, &[]),
            Err(BusError::EmptyFilter)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_id_after_slot_reuse() {
        let registry = SubscriptionRegistry::new(4);
        let old = registry.subscribe(ComponentId::RENDERER, &[EventType::All]).unwrap();
        registry.unsubscribe(old).unwrap();

        let new = registry.subscribe(ComponentId::INPUT, &[EventType::All]).unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);

        assert_eq!(registry.unsubscribe(old), Err(BusError::SubscriptionNotFound(old)));
        assert!(registry.get(new).is_some());
    }

    #[test]
    fn test_unsubscribe_component() {
        let registry = SubscriptionRegistry::new(4);
        let id = registry.subscribe(ComponentId::RENDERER, &[EventType::All]).unwrap();

        assert_eq!(registry.unsubscribe_component(ComponentId::RENDERER), Ok(id));
        assert_eq!(
            registry.unsubscribe_component(ComponentId::RENDERER),
            Err(BusError::ComponentNotSubscribed(ComponentId::RENDERER))
        );
        assert!(registry.find(ComponentId::RENDERER).is_none());
    }

    #[test]
    fn test_mailbox_claimed_once() {
        let registry = SubscriptionRegistry::new(4);
        let id = registry.subscribe(ComponentId::RENDERER, &[EventType::All]).unwrap();

        let mailbox = registry.take_mailbox(id).unwrap();
        assert_eq!(mailbox.subscription_id(), id);
        assert!(registry.get(id).unwrap().mailbox_claimed);
        assert_eq!(registry.take_mailbox(id).unwrap_err(), BusError::MailboxClaimed(id));
    }

    #[test]
    fn test_custom_code_normalized_on_subscribe() {
        let registry = SubscriptionRegistry::new(4);
        registry
            .subscribe(ComponentId::RENDERER, &[EventType::Custom(1002)])
            .unwrap();
        let hits = registry.recipients(&envelope(EventType::ChatMessage, ComponentId::BROADCAST));
        assert_eq!(hits.len(), 1);
    }
}
