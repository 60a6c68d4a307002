pub mod conflicts;
pub mod entities;
pub mod errors;
pub mod path;

pub use conflicts::*;
pub use entities::*;
pub use errors::*;
pub use path::*;
