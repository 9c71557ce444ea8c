//! Builtin producers.
//!
//! A checked-out repository should run a real runbook end to end without
//! external plugins, so two minimal producers ship with the engine: a
//! connector that emits configured content and a processor that passes a
//! message through unchanged. Both speak the generic `raw/1.0.0` schema.

use async_trait::async_trait;
use waivern_core::{ExecutionStatus, Message, SchemaId};

use super::{
    InputCapability, Producer, ProducerContext, ProducerError, ProducerKind, ProducerRegistry,
    ProducerResult,
};

/// Schema emitted and accepted by the builtin producers.
pub const RAW_SCHEMA: &str = "raw/1.0.0";

/// Registers the builtin producers.
pub fn register(registry: &mut ProducerRegistry) {
    registry.register(
        ProducerKind::Connector,
        "static",
        std::sync::Arc::new(StaticSource::new()),
    );
    registry.register(
        ProducerKind::Processor,
        "passthrough",
        std::sync::Arc::new(Passthrough::new()),
    );
}

fn raw_schema() -> SchemaId {
    RAW_SCHEMA.parse().expect("builtin schema id is valid")
}

/// Connector emitting the `content` property verbatim.
#[derive(Debug, Clone, Default)]
pub struct StaticSource;

impl StaticSource {
    /// Creates the connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Producer for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn supported_input_schemas(&self) -> InputCapability {
        InputCapability::none()
    }

    fn supported_output_schemas(&self) -> Vec<SchemaId> {
        vec![raw_schema()]
    }

    async fn produce(&self, ctx: &ProducerContext, _inputs: &[Message]) -> ProducerResult<Message> {
        let content = ctx
            .properties
            .get("content")
            .cloned()
            .ok_or_else(|| {
                ProducerError::InvalidProperties("static connector requires `content`".to_string())
            })?;

        Ok(Message::new(raw_schema(), content).with_status(ExecutionStatus::Success))
    }
}

/// Processor forwarding its single input's content unchanged.
#[derive(Debug, Clone, Default)]
pub struct Passthrough;

impl Passthrough {
    /// Creates the processor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Producer for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn supported_input_schemas(&self) -> InputCapability {
        InputCapability::single(raw_schema())
    }

    fn supported_output_schemas(&self) -> Vec<SchemaId> {
        vec![raw_schema()]
    }

    async fn produce(&self, _ctx: &ProducerContext, inputs: &[Message]) -> ProducerResult<Message> {
        let input = inputs
            .first()
            .ok_or_else(|| ProducerError::failed("passthrough expects one input"))?;

        Ok(Message::new(raw_schema(), input.content.clone()).with_status(ExecutionStatus::Success))
    }
}
