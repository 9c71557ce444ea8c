//! Schema identifier types.
//!
//! Schemas name a structural contract for message content. The orchestrator
//! never inspects schema definitions themselves; it only compares
//! identifiers, so a schema is fully described by its `name/version` pair.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a schema identifier.
#[derive(Debug, Error)]
pub enum SchemaIdError {
    /// The identifier is missing the `name/version` separator.
    #[error("schema identifier `{0}` is missing a `/` separator")]
    MissingSeparator(String),

    /// The name half of the identifier is empty.
    #[error("schema identifier `{0}` has an empty name")]
    EmptyName(String),

    /// The version half is not a valid semantic version.
    #[error("schema identifier `{id}` has an invalid version: {source}")]
    InvalidVersion {
        /// The offending identifier.
        id: String,
        /// The underlying semver parse error.
        source: semver::Error,
    },
}

/// Identifier of a message schema, written as `name/version`.
///
/// The version component is a full semantic version, e.g.
/// `personal_data_finding/1.0.0`. Identifiers order by name first, then by
/// semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaId {
    name: String,
    version: Version,
}

impl SchemaId {
    /// Creates a schema identifier from its parts.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Returns the schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema version.
    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl FromStr for SchemaId {
    type Err = SchemaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once('/')
            .ok_or_else(|| SchemaIdError::MissingSeparator(s.to_string()))?;

        if name.is_empty() {
            return Err(SchemaIdError::EmptyName(s.to_string()));
        }

        let version = Version::parse(version).map_err(|source| SchemaIdError::InvalidVersion {
            id: s.to_string(),
            source,
        })?;

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

impl TryFrom<String> for SchemaId {
    type Error = SchemaIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaId> for String {
    fn from(id: SchemaId) -> Self {
        id.to_string()
    }
}
