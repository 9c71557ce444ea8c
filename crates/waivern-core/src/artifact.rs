//! Artifact identifier types.

use std::str::FromStr;

use derive_more::{AsRef, Debug, Display, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when validating an artifact identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactIdError {
    /// The identifier is empty.
    #[error("artifact identifier is empty")]
    Empty,

    /// The identifier is an absolute path.
    #[error("artifact identifier `{0}` must not be absolute")]
    Absolute(String),

    /// The identifier contains an empty, `.`, or `..` segment.
    #[error("artifact identifier `{0}` contains an invalid path segment")]
    InvalidSegment(String),
}

/// Unique identifier of an artifact within a run.
///
/// Identifiers are plain strings chosen by the runbook author and may be
/// hierarchical (contain `/`), in which case persistent backends store them
/// under nested directories. Because identifiers end up joined to filesystem
/// paths, absolute paths and traversal segments are rejected outright.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, AsRef, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[as_ref(str)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Creates an artifact identifier, validating its segments.
    pub fn new(id: impl Into<String>) -> Result<Self, ArtifactIdError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `/`-separated segments of the identifier.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

/// Validates an artifact identifier for safe use as a storage key.
fn validate(id: &str) -> Result<(), ArtifactIdError> {
    if id.is_empty() {
        return Err(ArtifactIdError::Empty);
    }
    if id.starts_with('/') || id.contains('\\') {
        return Err(ArtifactIdError::Absolute(id.to_string()));
    }
    if id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(ArtifactIdError::InvalidSegment(id.to_string()));
    }
    Ok(())
}

impl FromStr for ArtifactId {
    type Err = ArtifactIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = ArtifactIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_id() {
        let id = ArtifactId::new("db_schema").expect("valid id");
        assert_eq!(id.as_str(), "db_schema");
        assert_eq!(id.segments().count(), 1);
    }

    #[test]
    fn test_hierarchical_id() {
        let id = ArtifactId::new("analysis/findings").expect("valid id");
        assert_eq!(id.segments().collect::<Vec<_>>(), ["analysis", "findings"]);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(ArtifactId::new("").unwrap_err(), ArtifactIdError::Empty);
    }

    #[test]
    fn test_rejects_absolute() {
        assert!(matches!(
            ArtifactId::new("/etc/passwd").unwrap_err(),
            ArtifactIdError::Absolute(_)
        ));
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(matches!(
            ArtifactId::new("a/../b").unwrap_err(),
            ArtifactIdError::InvalidSegment(_)
        ));
        assert!(matches!(
            ArtifactId::new("a//b").unwrap_err(),
            ArtifactIdError::InvalidSegment(_)
        ));
    }
}
