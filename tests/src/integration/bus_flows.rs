//! # Event Bus Flows
//!
//! Publish → tick → mailbox behavior as seen by independent components.
//!
//! ## Flows Tested:
//!
//! 1. **Priority drain order**: one tick delivers System before Background,
//!    FIFO inside a class
//! 2. **Targeting**: a targeted event reaches only its target
//! 3. **Unsubscribe**: a removed subscriber receives nothing afterwards
//! 4. **Concurrent publishers**: every accepted event is delivered once

#[cfg(test)]
mod tests {
    use shared_bus::{EventBus, EventPublisher, FailureReason};
    use shared_types::{ComponentId, EventType, NewEvent, Priority};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(16);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn chat(priority: Priority, marker: u8) -> NewEvent {
        NewEvent::new(EventType::ChatMessage, ComponentId::INPUT)
            .with_priority(priority)
            .with_payload(vec![marker])
    }

    // =============================================================================
    // PRIORITY ORDERING
    // =============================================================================

    #[test]
    fn test_one_tick_drains_in_priority_order() {
        let bus = EventBus::new();
        let sub = bus
            .subscribe(ComponentId::RENDERER, &[EventType::ChatMessage])
            .unwrap();
        let mut mailbox = bus.take_mailbox(sub).unwrap();

        // Published lowest priority first.
        bus.publish(chat(Priority::Background, 1)).unwrap();
        bus.publish(chat(Priority::Network, 2)).unwrap();
        bus.publish(chat(Priority::Ai, 3)).unwrap();
        bus.publish(chat(Priority::Realtime, 4)).unwrap();
        bus.publish(chat(Priority::System, 5)).unwrap();
        bus.publish(chat(Priority::Realtime, 6)).unwrap();

        let report = bus.tick(FRAME);
        assert_eq!(report.total_dispatched(), 6);
        assert_eq!(report.dispatched[Priority::Realtime.index()], 2);

        let markers: Vec<u8> = mailbox.drain().iter().map(|e| e.payload()[0]).collect();
        assert_eq!(markers, vec![5, 4, 6, 3, 2, 1]);
    }

    #[test]
    fn test_ids_increase_in_publish_order() {
        let bus = EventBus::new();
        let first = bus.publish(chat(Priority::Background, 0)).unwrap();
        let second = bus.publish(chat(Priority::System, 0)).unwrap();
        assert!(second > first);
    }

    // =============================================================================
    // TARGETING & FILTERS
    // =============================================================================

    #[test]
    fn test_targeted_event_reaches_only_target() {
        let bus = EventBus::new();
        let renderer = bus
            .subscribe(ComponentId::RENDERER, &[EventType::ObjectUpdate])
            .unwrap();
        let input = bus
            .subscribe(ComponentId::INPUT, &[EventType::ObjectUpdate])
            .unwrap();
        let mut renderer_box = bus.take_mailbox(renderer).unwrap();
        let mut input_box = bus.take_mailbox(input).unwrap();

        bus.publish(
            NewEvent::new(EventType::ObjectUpdate, ComponentId::PROTOCOL_BRIDGE)
                .with_target(ComponentId::RENDERER),
        )
        .unwrap();
        bus.publish(NewEvent::new(EventType::ObjectUpdate, ComponentId::PROTOCOL_BRIDGE))
            .unwrap();
        bus.tick(FRAME);

        assert_eq!(renderer_box.drain().len(), 2);
        assert_eq!(input_box.drain().len(), 1);
    }

    #[test]
    fn test_wildcard_subscriber_sees_every_type() {
        let bus = EventBus::new();
        let sub = bus.subscribe(ComponentId::SYNC_COORDINATOR, &[EventType::All]).unwrap();
        let mut mailbox = bus.take_mailbox(sub).unwrap();

        for event_type in [EventType::ChatMessage, EventType::Lifecycle, EventType::Custom(77)] {
            bus.publish(NewEvent::new(event_type, ComponentId::INPUT)).unwrap();
        }
        bus.tick(FRAME);

        let types: Vec<EventType> = mailbox.drain().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![EventType::ChatMessage, EventType::Lifecycle, EventType::Custom(77)]
        );
    }

    // =============================================================================
    // UNSUBSCRIBE
    // =============================================================================

    #[test]
    fn test_unsubscribed_component_gets_nothing() {
        let bus = EventBus::new();
        let sub = bus
            .subscribe(ComponentId::RENDERER, &[EventType::EntityMovement])
            .unwrap();
        let mut mailbox = bus.take_mailbox(sub).unwrap();

        bus.unsubscribe(sub).unwrap();
        bus.publish(NewEvent::new(EventType::EntityMovement, ComponentId::INPUT))
            .unwrap();
        let report = bus.tick(FRAME);

        assert_eq!(report.total_dispatched(), 1);
        assert_eq!(report.deliveries, 0);
        assert!(mailbox.try_recv().is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_mailbox_is_reported_not_fatal() {
        let bus = EventBus::new();
        let gone = bus
            .subscribe(ComponentId::RENDERER, &[EventType::ChatMessage])
            .unwrap();
        drop(bus.take_mailbox(gone).unwrap());
        let live = bus
            .subscribe(ComponentId::INPUT, &[EventType::ChatMessage])
            .unwrap();
        let mut live_box = bus.take_mailbox(live).unwrap();

        bus.publish(chat(Priority::Realtime, 9)).unwrap();
        let report = bus.tick(FRAME);

        assert_eq!(report.deliveries, 1);
        assert_eq!(report.failures, 1);
        assert!(live_box.try_recv().is_some());

        let failures = bus.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, FailureReason::MailboxClosed);
        assert_eq!(failures[0].component, ComponentId::RENDERER);
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[test]
    fn test_concurrent_publishers_deliver_each_event_once() {
        let bus = Arc::new(EventBus::new());
        let sub = bus
            .subscribe(ComponentId::RENDERER, &[EventType::ChatMessage])
            .unwrap();
        let mut mailbox = bus.take_mailbox(sub).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..4u8 {
                let bus = Arc::clone(&bus);
                scope.spawn(move || {
                    for _ in 0..200 {
                        bus.publish(chat(Priority::Realtime, worker)).unwrap();
                    }
                });
            }
        });

        let report = bus.tick(FRAME);
        assert_eq!(report.deliveries, 800);

        let delivered = mailbox.drain();
        let ids: HashSet<_> = delivered.iter().map(|e| e.id()).collect();
        assert_eq!(ids.len(), 800);

        // Same priority: delivery follows id order.
        let ordered: Vec<_> = delivered.iter().map(|e| e.id()).collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(ordered, sorted);
    }
}
