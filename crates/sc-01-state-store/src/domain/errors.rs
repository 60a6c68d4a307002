use super::path::PathError;
use shared_types::{HasStatus, StatusCode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid state path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    #[error("State path not found: {path}")]
    NotFound { path: String },

    /// Only returned by consistent reads.
    #[error("Unresolved conflict at {path} ({candidates} candidates)")]
    Conflict { path: String, candidates: usize },

    #[error("State store full: {max_paths} paths")]
    CapacityExceeded { max_paths: usize },

    /// The audit trail must be drained before more writes are taken.
    #[error("Audit trail full: {capacity} records awaiting drain")]
    AuditFull { capacity: usize },

    #[error("Write confidence must be a number")]
    InvalidConfidence,

    #[error("Protocol name must not be empty")]
    EmptyProtocol,
}

impl HasStatus for StateError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Conflict { .. } => StatusCode::StateConflict,
            Self::CapacityExceeded { .. } | Self::AuditFull { .. } => StatusCode::OutOfMemory,
            Self::InvalidPath { .. }
            | Self::NotFound { .. }
            | Self::InvalidConfidence
            | Self::EmptyProtocol => StatusCode::InvalidParameters,
        }
    }
}
