//! # Shared Types Crate
//!
//! This crate contains the event envelope, identifiers, status codes and the
//! payloads that flow between the Storm core components.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-component types are defined here.
//! - **Immutable Envelopes**: An `EventEnvelope` is frozen once the bus has
//!   stamped its id. Callers build a `NewEvent` instead.
//! - **Closed Status Set**: Every public operation reports one of the
//!   `StatusCode` values (or a typed success value).

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod ipc;

pub use entities::*;
pub use envelope::{normalize_confidence, now_micros, EventEnvelope, NewEvent};
pub use errors::*;
pub use ipc::*;
