//! # sc-01-state-store
//!
//! Authoritative, versioned state for the Storm core.
//!
//! ## Role in System
//!
//! - **Single Source of Truth**: every entry lives here; the bus only carries
//!   write requests and change notifications.
//! - **Conflict Resolution**: concurrent writes from different protocols to
//!   one path become a conflict record, settled deterministically at the
//!   next synchronization pass.
//!
//! ```text
//! [Protocol bridge] ──StateMutation──→ [Event Bus] ──route──→ [State Store]
//!                                                                  │
//!                                        synchronize() ────────────┤
//!                                                                  ↓
//!                                   [Event Bus] ←──StateChanged── [Coordinator]
//! ```
//!
//! ## Resolution Order
//!
//! Higher confidence, then later timestamp, then the protocol name that
//! sorts first, then the value bytes that sort first. Losing writes never
//! touch the visible value and are kept in the audit trail.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::StateStoreApi;
pub use service::StateStore;
