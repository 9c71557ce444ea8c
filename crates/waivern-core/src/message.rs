//! Message types flowing between producers.
//!
//! A message is the unit of data exchanged through the artifact store:
//! arbitrary structured content, the schema identifier describing it, and an
//! execution extension recording how the producing node fared. Messages are
//! treated as immutable once stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::SchemaId;

/// Outcome of the node execution that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Not yet produced.
    #[default]
    Pending,
    /// Produced successfully.
    Success,
    /// Production failed.
    Error,
}

/// Where a node came from after child-runbook flattening.
///
/// Serialized as `"parent"` or `"child:<runbook_name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum Origin {
    /// Declared directly in the executed runbook.
    #[default]
    Parent,
    /// Expanded out of the named child runbook.
    Child(String),
}

/// Error produced when parsing an [`Origin`] from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid origin `{0}`, expected `parent` or `child:<name>`")]
pub struct OriginError(String);

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Child(name) => write!(f, "child:{name}"),
        }
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "parent" {
            return Ok(Self::Parent);
        }
        match s.split_once(':') {
            Some(("child", name)) if !name.is_empty() => Ok(Self::Child(name.to_string())),
            _ => Err(OriginError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Origin {
    type Error = OriginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.to_string()
    }
}

/// Execution extension attached to every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionContext {
    /// Outcome of the producing node.
    pub status: ExecutionStatus,
    /// Error description when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock production time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Whether the node was declared in the parent or a flattened child.
    #[serde(default)]
    pub origin: Origin,
    /// Parent-visible alias of a flattened child artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Extension container on a message.
///
/// Only the `execution` extension exists today; the container leaves room
/// for other namespaced extensions without changing the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Extensions {
    /// Execution outcome of the producing node.
    #[serde(default)]
    pub execution: ExecutionContext,
}

/// The unit of data flowing between pipeline components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Arbitrary structured payload.
    pub content: serde_json::Value,
    /// Identifier of the schema describing `content`.
    pub schema: SchemaId,
    /// Namespaced extensions.
    #[serde(default)]
    pub extensions: Extensions,
}

impl Message {
    /// Creates a message with a pending execution extension.
    pub fn new(schema: SchemaId, content: serde_json::Value) -> Self {
        Self {
            content,
            schema,
            extensions: Extensions::default(),
        }
    }

    /// Sets the execution status.
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.extensions.execution.status = status;
        self
    }

    /// Sets the error description and marks the status as `error`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.extensions.execution.status = ExecutionStatus::Error;
        self.extensions.execution.error = Some(error.into());
        self
    }

    /// Sets the production duration.
    pub fn with_duration_seconds(mut self, seconds: f64) -> Self {
        self.extensions.execution.duration_seconds = Some(seconds);
        self
    }

    /// Sets the origin of the producing node.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.extensions.execution.origin = origin;
        self
    }

    /// Sets the parent-visible alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.extensions.execution.alias = Some(alias.into());
        self
    }

    /// Returns the execution extension.
    pub fn execution(&self) -> &ExecutionContext {
        &self.extensions.execution
    }

    /// Returns whether the producing node succeeded.
    pub fn is_success(&self) -> bool {
        self.extensions.execution.status == ExecutionStatus::Success
    }
}
