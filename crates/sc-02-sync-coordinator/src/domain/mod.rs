pub mod errors;
pub mod protocol;

pub use errors::*;
pub use protocol::*;
