//! Producer contract and registry.
//!
//! Connectors and processors satisfy one uniform [`Producer`] trait: a
//! connector takes no inputs and emits one message, a processor consumes an
//! ordered list of input messages. The engine never knows anything else
//! about a plugin; the planner reads declared schemas off the registry's
//! descriptors, and the executor resolves an instance by `(kind, type)` at
//! production time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use waivern_core::{ArtifactId, BoxedError, Message, RunId, SchemaId};

use crate::definition::Properties;
use crate::engine::CostTracker;

pub mod builtin;

/// Result type for producer invocations.
pub type ProducerResult<T> = Result<T, ProducerError>;

/// Errors a producer can raise while producing a message.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// The properties block is missing or malformed for this producer.
    #[error("invalid properties: {0}")]
    InvalidProperties(String),

    /// Production failed, optionally carrying the underlying cause.
    #[error("{message}")]
    Failed {
        /// What went wrong.
        message: String,
        /// The error that caused the failure, when one exists.
        #[source]
        source: Option<BoxedError>,
    },

    /// The producer observed its cancellation signal and stopped early.
    #[error("cancelled")]
    Cancelled,
}

impl ProducerError {
    /// Creates a production failure from any displayable error.
    pub fn failed(message: impl ToString) -> Self {
        Self::Failed {
            message: message.to_string(),
            source: None,
        }
    }

    /// Creates a production failure wrapping its underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self::Failed {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Whether a producer is a connector or a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProducerKind {
    /// Takes no inputs, emits one artifact.
    Connector,
    /// Consumes one or more input artifacts, emits one.
    Processor,
}

/// Declared input capability of a producer.
///
/// Connectors accept nothing. Processors declare a set of acceptable
/// schema *combinations*: each combination is the unordered multiset of
/// input schemas one invocation may receive, so a fan-in processor can
/// require, say, one `db_schema` plus one `access_log`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputCapability {
    combinations: Vec<Vec<SchemaId>>,
}

impl InputCapability {
    /// Capability of a connector: no inputs accepted.
    pub fn none() -> Self {
        Self::default()
    }

    /// Accepts exactly one input of the given schema.
    pub fn single(schema: SchemaId) -> Self {
        Self {
            combinations: vec![vec![schema]],
        }
    }

    /// Accepts any of the given combinations.
    pub fn combinations(combinations: impl IntoIterator<Item = Vec<SchemaId>>) -> Self {
        let combinations = combinations
            .into_iter()
            .map(|mut combo| {
                combo.sort();
                combo
            })
            .collect();
        Self { combinations }
    }

    /// Returns whether no inputs are accepted.
    pub fn is_none(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Returns whether the given unordered multiset of schemas is accepted.
    pub fn accepts(&self, offered: &[SchemaId]) -> bool {
        let mut offered = offered.to_vec();
        offered.sort();
        self.combinations.iter().any(|combo| *combo == offered)
    }

    /// Iterates the declared combinations.
    pub fn iter(&self) -> impl Iterator<Item = &[SchemaId]> {
        self.combinations.iter().map(Vec::as_slice)
    }

    /// Renders the declared combinations for error messages.
    pub fn describe(&self) -> String {
        if self.combinations.is_empty() {
            return "none".to_string();
        }
        self.combinations
            .iter()
            .map(|combo| {
                let schemas = combo
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{schemas}]")
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Execution context handed to a producer.
#[derive(Debug, Clone)]
pub struct ProducerContext {
    /// The run the artifact belongs to.
    pub run_id: RunId,
    /// The artifact being produced.
    pub artifact_id: ArtifactId,
    /// Properties from the artifact definition.
    pub properties: Properties,
    /// Cancellation signal; producers should observe it at suspension
    /// points and stop promptly when triggered.
    pub cancellation: CancellationToken,
    /// Cost accounting for the run; producers report each metered spend
    /// here and the run stops once the configured budget is exceeded.
    pub costs: CostTracker,
    /// Input artifacts flagged sensitive by a child input declaration.
    pub sensitive_inputs: Vec<ArtifactId>,
}

/// A connector or processor plugin.
///
/// Producers receive messages by value and must not write the artifact
/// store themselves; persistence is the executor's job.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Human-readable producer name.
    fn name(&self) -> &str;

    /// Input schema combinations this producer accepts.
    ///
    /// [`InputCapability::none`] for connectors.
    fn supported_input_schemas(&self) -> InputCapability;

    /// Output schemas this producer can emit.
    fn supported_output_schemas(&self) -> Vec<SchemaId>;

    /// Produces one message.
    ///
    /// `inputs` is empty for connectors and ordered to match the artifact
    /// definition's `inputs` list for processors.
    async fn produce(&self, ctx: &ProducerContext, inputs: &[Message]) -> ProducerResult<Message>;
}

/// Plan-time metadata about a registered producer.
#[derive(Debug, Clone)]
pub struct ProducerDescriptor {
    /// Connector or processor.
    pub kind: ProducerKind,
    /// The type string artifacts reference.
    pub type_name: String,
    /// Declared input capability.
    pub input_schemas: InputCapability,
    /// Declared output schemas.
    pub output_schemas: Vec<SchemaId>,
}

/// Registry of producers keyed by `(kind, type)`.
///
/// The registry is an explicit value passed to the planner and executor;
/// there is no global lookup. Registering a producer snapshots its declared
/// schemas into a [`ProducerDescriptor`] so the planner can resolve schemas
/// without touching the instance again.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    entries: HashMap<(ProducerKind, String), RegistryEntry>,
}

#[derive(Clone)]
struct RegistryEntry {
    descriptor: ProducerDescriptor,
    producer: Arc<dyn Producer>,
}

impl ProducerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the builtin producers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Registers a producer under a kind and type string.
    ///
    /// Re-registering the same `(kind, type)` replaces the previous entry.
    pub fn register(
        &mut self,
        kind: ProducerKind,
        type_name: impl Into<String>,
        producer: Arc<dyn Producer>,
    ) {
        let type_name = type_name.into();
        let descriptor = ProducerDescriptor {
            kind,
            type_name: type_name.clone(),
            input_schemas: producer.supported_input_schemas(),
            output_schemas: producer.supported_output_schemas(),
        };
        self.entries
            .insert((kind, type_name), RegistryEntry { descriptor, producer });
    }

    /// Returns the descriptor for a `(kind, type)` pair.
    pub fn descriptor(&self, kind: ProducerKind, type_name: &str) -> Option<&ProducerDescriptor> {
        self.entries
            .get(&(kind, type_name.to_string()))
            .map(|entry| &entry.descriptor)
    }

    /// Resolves a producer instance for a `(kind, type)` pair.
    pub fn resolve(&self, kind: ProducerKind, type_name: &str) -> Option<Arc<dyn Producer>> {
        self.entries
            .get(&(kind, type_name.to_string()))
            .map(|entry| Arc::clone(&entry.producer))
    }

    /// Returns the number of registered producers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(s: &str) -> SchemaId {
        s.parse().expect("valid schema id")
    }

    #[test]
    fn test_capability_single() {
        let cap = InputCapability::single(schema("raw/1.0.0"));
        assert!(cap.accepts(&[schema("raw/1.0.0")]));
        assert!(!cap.accepts(&[schema("raw/2.0.0")]));
        assert!(!cap.accepts(&[schema("raw/1.0.0"), schema("raw/1.0.0")]));
    }

    #[test]
    fn test_capability_multiset_is_unordered() {
        let cap = InputCapability::combinations([vec![
            schema("db_schema/1.0.0"),
            schema("access_log/1.0.0"),
        ]]);
        assert!(cap.accepts(&[schema("access_log/1.0.0"), schema("db_schema/1.0.0")]));
        assert!(cap.accepts(&[schema("db_schema/1.0.0"), schema("access_log/1.0.0")]));
        assert!(!cap.accepts(&[schema("db_schema/1.0.0")]));
    }

    #[test]
    fn test_capability_multiset_counts_duplicates() {
        let cap =
            InputCapability::combinations([vec![schema("raw/1.0.0"), schema("raw/1.0.0")]]);
        assert!(cap.accepts(&[schema("raw/1.0.0"), schema("raw/1.0.0")]));
        assert!(!cap.accepts(&[schema("raw/1.0.0")]));
    }

    #[test]
    fn test_connector_capability() {
        let cap = InputCapability::none();
        assert!(cap.is_none());
        assert!(!cap.accepts(&[schema("raw/1.0.0")]));
        assert_eq!(cap.describe(), "none");
    }

    #[test]
    fn test_failed_error_carries_source() {
        let err = ProducerError::with_source(
            "reading source records",
            std::io::Error::other("connection reset"),
        );
        assert_eq!(err.to_string(), "reading source records");
        let source = std::error::Error::source(&err).expect("source attached");
        assert_eq!(source.to_string(), "connection reset");

        assert!(std::error::Error::source(&ProducerError::failed("flat")).is_none());
    }

    #[test]
    fn test_registry_register_and_resolve() {
        let mut registry = ProducerRegistry::new();
        registry.register(
            ProducerKind::Connector,
            "static",
            Arc::new(builtin::StaticSource::new()),
        );

        let descriptor = registry
            .descriptor(ProducerKind::Connector, "static")
            .expect("descriptor");
        assert_eq!(descriptor.kind, ProducerKind::Connector);
        assert!(descriptor.input_schemas.is_none());

        assert!(registry.resolve(ProducerKind::Connector, "static").is_some());
        assert!(registry.resolve(ProducerKind::Processor, "static").is_none());
    }
}
