//! # sc-02-sync-coordinator
//!
//! Glue between the event bus, the state store and the protocol bridges.
//!
//! ## Components
//!
//! - [`StateBridge`]: the bus's mutation router. Decodes `StateMutation`
//!   envelopes, writes them into the store and announces accepted writes.
//! - [`SyncCoordinator`]: periodic `synchronize` pass that settles conflicts
//!   and publishes the resulting `StateChanged` events.
//! - [`NetworkRelay`]: moves `NetworkSend` traffic out through
//!   [`ProtocolBridge`] implementations and publishes what comes back as
//!   `NetworkReceive`.
//! - [`ProtocolRegistry`]: known protocols and their write/conflict counters.

pub mod bridge;
pub mod coordinator;
pub mod domain;
pub mod ports;
pub mod relay;

pub use bridge::{BridgeStats, StateBridge};
pub use coordinator::{SyncConfig, SyncCoordinator, DEFAULT_SYNC_INTERVAL};
pub use domain::*;
pub use ports::ProtocolBridge;
pub use relay::{kind_for_name, NetworkRelay, RelayStats};
