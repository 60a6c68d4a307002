//! # Relay Flows
//!
//! `NetworkSend` → relay → protocol bridge → relay → `NetworkReceive`.
//!
//! ## Flows Tested:
//!
//! 1. **Round trip**: outbound bytes reach the bridge; what the bridge
//!    receives is broadcast back on the bus
//! 2. **Bridge failures**: a failing bridge is counted and logged, the bus
//!    keeps ticking
//! 3. **Full runtime**: the same round trip driven by the runtime's own loops

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sc_02_sync_coordinator::{
        BridgeError, NetworkRelay, ProtocolBridge, ProtocolKind, ProtocolRegistry,
    };
    use shared_bus::{EventBus, EventPublisher, Mailbox};
    use shared_types::{ComponentId, EventType, InboundMessage, NewEvent, OutboundMessage};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use storm_runtime::{RuntimeConfig, StormRuntime};

    const FRAME: Duration = Duration::from_millis(16);

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Bridge that answers every message with the bytes reversed.
    struct EchoBridge {
        name: &'static str,
        fail_sends: bool,
        sent: Mutex<Vec<Vec<u8>>>,
        inbound: Mutex<VecDeque<Vec<u8>>>,
    }

    impl EchoBridge {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_sends: false,
                sent: Mutex::new(Vec::new()),
                inbound: Mutex::new(VecDeque::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_sends: true,
                sent: Mutex::new(Vec::new()),
                inbound: Mutex::new(VecDeque::new()),
            })
        }
    }

    #[async_trait]
    impl ProtocolBridge for EchoBridge {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ProtocolKind {
            ProtocolKind::OpenSimulator
        }

        async fn send(&self, bytes: &[u8]) -> Result<(), BridgeError> {
            if self.fail_sends {
                return Err(BridgeError::ConnectionFailed("socket reset".to_string()));
            }
            self.sent.lock().push(bytes.to_vec());
            self.inbound
                .lock()
                .push_back(bytes.iter().rev().copied().collect());
            Ok(())
        }

        async fn poll_inbound(&self) -> Result<Option<Vec<u8>>, BridgeError> {
            Ok(self.inbound.lock().pop_front())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn listen_inbound(bus: &EventBus) -> Mailbox {
        let sub = bus
            .subscribe(ComponentId::RENDERER, &[EventType::NetworkReceive])
            .unwrap();
        bus.take_mailbox(sub).unwrap()
    }

    fn send(bus: &EventBus, protocol: &str, bytes: &[u8]) {
        let event = NewEvent::network_send(
            ComponentId::RENDERER,
            &OutboundMessage::new(protocol, bytes.to_vec()),
        )
        .unwrap();
        bus.publish(event).unwrap();
    }

    // =============================================================================
    // ROUND TRIP
    // =============================================================================

    #[tokio::test]
    async fn test_relay_round_trip() {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(ProtocolRegistry::new());
        let relay = NetworkRelay::new(registry.clone(), bus.clone());
        let bridge = EchoBridge::new("opensim");
        relay.register_bridge(bridge.clone()).unwrap();

        let mut relay_box = NetworkRelay::subscribe(&bus).unwrap();
        let mut inbound_box = listen_inbound(&bus);

        send(&bus, "opensim", b"hello");
        bus.tick(FRAME);

        let envelope = relay_box.try_recv().unwrap();
        relay.forward(&envelope).await.unwrap();
        assert_eq!(bridge.sent.lock().as_slice(), &[b"hello".to_vec()]);

        assert_eq!(relay.poll_bridges().await, 1);
        bus.tick(FRAME);

        let received = inbound_box.try_recv().unwrap();
        assert_eq!(received.source(), ComponentId::NETWORK_MANAGER);
        let message = InboundMessage::decode(received.payload()).unwrap();
        assert_eq!(message.protocol, "opensim");
        assert_eq!(message.bytes, b"olleh");

        assert_eq!(
            registry.get("opensim").unwrap().kind,
            ProtocolKind::OpenSimulator
        );
    }

    #[tokio::test]
    async fn test_failing_bridge_is_contained() {
        let bus = Arc::new(EventBus::new());
        let relay = NetworkRelay::new(Arc::new(ProtocolRegistry::new()), bus.clone());
        relay.register_bridge(EchoBridge::failing("webrtc")).unwrap();
        let mut relay_box = NetworkRelay::subscribe(&bus).unwrap();

        send(&bus, "webrtc", b"x");
        send(&bus, "missing", b"y");
        bus.tick(FRAME);

        for envelope in relay_box.drain() {
            assert!(relay.forward(&envelope).await.is_err());
        }
        let stats = relay.stats();
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.forward_failures, 2);

        // The bus is unaffected.
        let report = bus.tick(FRAME);
        assert_eq!(report.failures, 0);
    }

    // =============================================================================
    // FULL RUNTIME
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_runtime_drives_relay() {
        let mut config = RuntimeConfig::default();
        config.tick_interval = Duration::from_millis(5);
        let runtime = StormRuntime::new(config).unwrap();

        let bridge = EchoBridge::new("opensim");
        runtime.relay().register_bridge(bridge.clone()).unwrap();
        runtime.start().unwrap();

        let bus = runtime.bus();
        let mut inbound_box = listen_inbound(&bus);
        send(&bus, "opensim", &[1, 2, 3]);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let received = inbound_box.try_recv().unwrap();
        let message = InboundMessage::decode(received.payload()).unwrap();
        assert_eq!(message.bytes, vec![3, 2, 1]);
        assert_eq!(runtime.relay().stats().forwarded, 1);

        runtime.shutdown().await;
    }
}
