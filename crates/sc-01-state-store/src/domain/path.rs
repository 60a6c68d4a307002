//! # State Paths
//!
//! Slash-delimited hierarchical keys such as `/world/objects/123/position`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest accepted path, in bytes.
pub const MAX_PATH_BYTES: usize = 1024;

/// Deepest accepted path.
pub const MAX_PATH_SEGMENTS: usize = 32;

/// Why a string is not a valid [`StatePath`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path must start with '/'")]
    MissingLeadingSlash,

    #[error("path has an empty segment")]
    EmptySegment,

    #[error("path has {count} segments, maximum is {MAX_PATH_SEGMENTS}")]
    TooManySegments { count: usize },

    #[error("path is {len} bytes, maximum is {MAX_PATH_BYTES}")]
    TooLong { len: usize },

    #[error("segment {segment:?} contains whitespace or control characters")]
    InvalidCharacter { segment: String },
}

/// A validated state path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatePath(String);

impl StatePath {
    /// Parse and validate a path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.len() > MAX_PATH_BYTES {
            return Err(PathError::TooLong { len: raw.len() });
        }
        let rest = raw.strip_prefix('/').ok_or(PathError::MissingLeadingSlash)?;

        let mut count = 0;
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment);
            }
            if segment.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(PathError::InvalidCharacter {
                    segment: segment.to_string(),
                });
            }
            count += 1;
        }
        if count > MAX_PATH_SEGMENTS {
            return Err(PathError::TooManySegments { count });
        }

        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Parent path, `None` for a single-segment path.
    #[must_use]
    pub fn parent(&self) -> Option<StatePath> {
        let cut = self.0.rfind('/')?;
        (cut > 0).then(|| Self(self.0[..cut].to_string()))
    }

    /// True if `self` is `prefix` or lies beneath it.
    #[must_use]
    pub fn is_within(&self, prefix: &StatePath) -> bool {
        match self.0.strip_prefix(prefix.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StatePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StatePath> for String {
    fn from(path: StatePath) -> Self {
        path.0
    }
}

impl std::str::FromStr for StatePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
