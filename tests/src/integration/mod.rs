//! Cross-crate integration flows.

pub mod bus_flows;
pub mod relay_flows;
pub mod state_flows;
