//! # Storm Core Test Suite
//!
//! Unified test crate for flows that cross crate boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── bus_flows.rs      # Priority ordering, targeting, unsubscribe
//!     ├── state_flows.rs    # Mutation routing, conflict convergence
//!     └── relay_flows.rs    # Protocol bridge round trips
//!
//! tests/benches/
//! └── core_benchmarks.rs    # Publish/tick and write/synchronize throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sc-tests
//! cargo test -p sc-tests integration::state_flows
//! cargo bench -p sc-tests
//! ```

pub mod integration;
