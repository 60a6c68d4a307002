//! # State Flows
//!
//! Bus → state bridge → state store → sync coordinator → bus.
//!
//! ## Flows Tested:
//!
//! 1. **Mutation routing**: `StateMutation` envelopes land in the store and
//!    come back as `StateChanged`
//! 2. **Conflict convergence**: two protocols writing one path in one window
//!    settle on the same winner regardless of arrival order
//! 3. **Rejected mutations**: bad writes are audited and reported as
//!    delivery failures without stopping the tick

#[cfg(test)]
mod tests {
    use sc_01_state_store::{AuditReason, StateError, StateStore, WriteOutcome};
    use sc_02_sync_coordinator::{ProtocolRegistry, StateBridge, SyncCoordinator};
    use shared_bus::{EventBus, EventPublisher, FailureReason, Mailbox};
    use shared_types::{
        ComponentId, EventType, HasStatus, NewEvent, StateChange, StateMutation, StatusCode,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(16);
    const POSITION: &str = "/world/objects/42/position";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Core {
        bus: Arc<EventBus>,
        store: Arc<StateStore>,
        registry: Arc<ProtocolRegistry>,
        coordinator: SyncCoordinator,
    }

    fn core() -> Core {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(StateStore::default());
        let registry = Arc::new(ProtocolRegistry::new());
        StateBridge::attach(&bus, store.clone(), registry.clone());
        let coordinator = SyncCoordinator::new(store.clone(), registry.clone(), bus.clone());
        Core {
            bus,
            store,
            registry,
            coordinator,
        }
    }

    fn watch_changes(bus: &EventBus) -> Mailbox {
        let sub = bus
            .subscribe(ComponentId::RENDERER, &[EventType::StateChanged])
            .unwrap();
        bus.take_mailbox(sub).unwrap()
    }

    fn mutate(bus: &EventBus, path: &str, data: &[u8], protocol: &str, confidence: f32) {
        let event = NewEvent::state_mutation(
            ComponentId::PROTOCOL_BRIDGE,
            &StateMutation::new(path, data.to_vec(), protocol),
            confidence,
        )
        .unwrap();
        bus.publish(event).unwrap();
    }

    fn changes(mailbox: &mut Mailbox) -> Vec<StateChange> {
        mailbox
            .drain()
            .iter()
            .map(|e| StateChange::decode(e.payload()).unwrap())
            .collect()
    }

    // =============================================================================
    // MUTATION ROUTING
    // =============================================================================

    #[test]
    fn test_mutation_round_trip() {
        let core = core();
        let mut mailbox = watch_changes(&core.bus);

        mutate(&core.bus, "/world/regions/7/weather", b"storm", "opensim", 0.8);
        let report = core.bus.tick(FRAME);
        assert_eq!(report.mutations_routed, 1);
        assert_eq!(report.deferred, 1);

        let value = core.store.get("/world/regions/7/weather").unwrap();
        assert_eq!(value.data, b"storm");
        assert_eq!(value.version, 1);

        core.bus.tick(FRAME);
        let seen = changes(&mut mailbox);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].protocol, "opensim");
        assert!((seen[0].confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_protocols_are_tracked() {
        let core = core();
        mutate(&core.bus, "/a", b"1", "homegrown", 1.0);
        core.bus.tick(FRAME);

        let info = core.registry.get("homegrown").unwrap();
        assert_eq!(info.stats.writes_accepted, 1);
    }

    // =============================================================================
    // CONFLICT CONVERGENCE
    // =============================================================================

    #[test]
    fn test_higher_confidence_wins_after_sync() {
        let core = core();
        let mut mailbox = watch_changes(&core.bus);

        mutate(&core.bus, POSITION, b"low", "opensim", 0.4);
        mutate(&core.bus, POSITION, b"high", "finalverse", 0.9);
        core.bus.tick(FRAME);

        // Visible value stays the first write until the window closes.
        assert_eq!(core.store.get(POSITION).unwrap().data, b"low");
        let err = core.store.get_consistent(POSITION).unwrap_err();
        assert!(matches!(err, StateError::Conflict { candidates: 2, .. }));
        assert_eq!(err.status(), StatusCode::StateConflict);

        let report = core.coordinator.synchronize_once();
        assert_eq!(report.conflicts_resolved(), 1);
        assert_eq!(report.resolutions[0].winner, "finalverse");

        let value = core.store.get_consistent(POSITION).unwrap();
        assert_eq!(value.data, b"high");
        assert_eq!(value.version, 2);

        core.bus.tick(FRAME);
        let seen = changes(&mut mailbox);
        let last = seen.last().unwrap();
        assert_eq!(last.data, b"high");
        assert_eq!(last.version, 2);

        let audit = core.store.audit_trail();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].protocol, "opensim");
        assert!(matches!(
            &audit[0].reason,
            AuditReason::Superseded { winner, .. } if winner == "finalverse"
        ));
        assert_eq!(core.registry.get("opensim").unwrap().stats.conflicts_lost, 1);
    }

    #[test]
    fn test_arrival_order_does_not_change_winner() {
        let first = StateStore::default();
        first.update(POSITION, b"a".to_vec(), 0.4, "opensim").unwrap();
        first.update(POSITION, b"b".to_vec(), 0.9, "finalverse").unwrap();
        first.synchronize();

        let second = StateStore::default();
        second.update(POSITION, b"b".to_vec(), 0.9, "finalverse").unwrap();
        second.update(POSITION, b"a".to_vec(), 0.4, "opensim").unwrap();
        let report = second.synchronize();

        assert_eq!(first.get(POSITION).unwrap().data, b"b");
        assert_eq!(second.get(POSITION).unwrap().data, b"b");
        // The incumbent won, so nothing visible changed.
        assert!(report.changes.is_empty());
    }

    #[test]
    fn test_equal_confidence_prefers_later_timestamp() {
        let store = StateStore::default();
        store
            .update_at(POSITION, b"early".to_vec(), 0.7, "opensim", 1_000)
            .unwrap();
        store
            .update_at(POSITION, b"late".to_vec(), 0.7, "finalverse", 2_000)
            .unwrap();
        store.synchronize();
        assert_eq!(store.get(POSITION).unwrap().data, b"late");
    }

    #[test]
    fn test_concurrent_writers_converge() {
        let store = Arc::new(StateStore::default());
        let protocols = ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"];

        std::thread::scope(|scope| {
            for (i, protocol) in protocols.iter().enumerate() {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let confidence = 0.1 + i as f32 * 0.1;
                    let outcome = store
                        .update(POSITION, vec![i as u8], confidence, protocol)
                        .unwrap();
                    assert!(!matches!(outcome, WriteOutcome::Queued));
                });
            }
        });

        let report = store.synchronize();
        assert_eq!(report.conflicts_resolved(), 1);
        assert_eq!(report.resolutions[0].winner, "p7");
        assert_eq!(store.get_consistent(POSITION).unwrap().data, vec![7]);
        assert_eq!(store.audit_trail().len(), 7);
        assert!(store.pending_conflicts().is_empty());
    }

    #[test]
    fn test_same_protocol_rewrites_without_conflict() {
        let core = core();
        mutate(&core.bus, POSITION, b"1", "opensim", 0.5);
        mutate(&core.bus, POSITION, b"2", "opensim", 0.5);
        core.bus.tick(FRAME);

        assert_eq!(core.store.get_consistent(POSITION).unwrap().version, 2);
        assert!(core.store.pending_conflicts().is_empty());
    }

    // =============================================================================
    // REJECTED MUTATIONS
    // =============================================================================

    #[test]
    fn test_rejected_mutation_is_reported_and_audited() {
        let core = core();
        mutate(&core.bus, "relative/path", b"x", "opensim", 1.0);
        mutate(&core.bus, "/fine", b"y", "opensim", 1.0);

        let report = core.bus.tick(FRAME);
        assert_eq!(report.mutations_routed, 2);
        assert_eq!(report.failures, 1);

        let failures = core.bus.drain_failures();
        match &failures[0].reason {
            FailureReason::MutationRejected(rejection) => {
                assert_eq!(rejection.status, StatusCode::InvalidParameters);
            }
            other => panic!("unexpected failure: {other}"),
        }

        assert!(core.store.get("/fine").is_ok());
        let audit = core.store.audit_trail();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].path, "relative/path");
        assert_eq!(core.registry.get("opensim").unwrap().stats.writes_rejected, 1);
    }
}
