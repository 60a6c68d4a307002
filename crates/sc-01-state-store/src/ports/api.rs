use crate::domain::{StateError, StateValue, StateWrite, SyncReport, WriteOutcome};

/// Primary API for state operations.
///
/// Implemented by [`crate::StateStore`]; consumers that only route writes
/// and drive synchronization depend on this trait.
pub trait StateStoreApi: Send + Sync {
    // === Writes ===

    /// Write stamped with the current time.
    fn update(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
    ) -> Result<WriteOutcome, StateError>;

    /// Write with an explicit timestamp (microseconds since the Unix epoch).
    fn update_at(
        &self,
        path: &str,
        data: Vec<u8>,
        confidence: f32,
        protocol: &str,
        timestamp: u64,
    ) -> Result<WriteOutcome, StateError>;

    fn apply(&self, write: StateWrite) -> Result<WriteOutcome, StateError>;

    // === Reads ===

    fn get(&self, path: &str) -> Result<StateValue, StateError>;

    /// Fails with `Conflict` while the path has an unresolved conflict.
    fn get_consistent(&self, path: &str) -> Result<StateValue, StateError>;

    // === Synchronization ===

    fn synchronize(&self) -> SyncReport;
}
