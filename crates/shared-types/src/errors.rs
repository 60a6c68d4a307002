//! # Status Codes
//!
//! The closed set of result codes every public operation reports. Crate error
//! types keep their own detail and map onto this set through [`HasStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code reported across the core boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    Success = 0,
    InvalidParameters = 1,
    InitializationFailed = 2,
    OutOfMemory = 3,
    AiProcessingFailed = 4,
    ProtocolError = 5,
    StateConflict = 6,
    NetworkError = 7,
}

impl StatusCode {
    /// Numeric code for hosts that only understand integers.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::InvalidParameters => "invalid parameters",
            Self::InitializationFailed => "initialization failed",
            Self::OutOfMemory => "out of memory",
            Self::AiProcessingFailed => "AI processing failed",
            Self::ProtocolError => "protocol error",
            Self::StateConflict => "state conflict",
            Self::NetworkError => "network error",
        };
        f.write_str(name)
    }
}

/// Errors that can be reported as a [`StatusCode`].
pub trait HasStatus {
    fn status(&self) -> StatusCode;
}

impl<T, E: HasStatus> HasStatus for Result<T, E> {
    fn status(&self) -> StatusCode {
        match self {
            Ok(_) => StatusCode::Success,
            Err(e) => e.status(),
        }
    }
}

impl HasStatus for crate::ipc::PayloadError {
    fn status(&self) -> StatusCode {
        StatusCode::InvalidParameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::PayloadError;

    #[test]
    fn test_numeric_codes_are_stable() {
        assert_eq!(StatusCode::Success.code(), 0);
        assert_eq!(StatusCode::StateConflict.code(), 6);
        assert_eq!(StatusCode::NetworkError.code(), 7);
    }

    #[test]
    fn test_result_status() {
        let ok: Result<u8, PayloadError> = Ok(1);
        assert!(ok.status().is_success());

        let err: Result<u8, PayloadError> = Err(PayloadError::Decode {
            kind: "test",
            reason: "bad".to_string(),
        });
        assert_eq!(err.status(), StatusCode::InvalidParameters);
    }
}
