//! Mock processors.

use std::sync::Arc;

use async_trait::async_trait;
use waivern_core::{ExecutionStatus, Message, SchemaId};
use waivern_runtime::producer::{
    InputCapability, Producer, ProducerContext, ProducerError, ProducerResult,
};

type MapFn = Arc<dyn Fn(&[Message]) -> Result<serde_json::Value, String> + Send + Sync>;

/// Processor applying a closure to its inputs.
#[derive(Clone)]
pub struct MapProcessor {
    accepts: InputCapability,
    output: SchemaId,
    map: MapFn,
    cost: Option<f64>,
}

impl MapProcessor {
    /// Creates a processor from an input capability, output schema, and
    /// mapping closure.
    pub fn new(
        accepts: InputCapability,
        output: SchemaId,
        map: impl Fn(&[Message]) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            accepts,
            output,
            map: Arc::new(map),
            cost: None,
        }
    }

    /// Reports a cost to the run's tracker on every call.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Single-input processor forwarding content unchanged.
    pub fn identity(schema: SchemaId) -> Self {
        Self::new(
            InputCapability::single(schema.clone()),
            schema,
            |inputs: &[Message]| {
                inputs
                    .first()
                    .map(|message| message.content.clone())
                    .ok_or_else(|| "expected one input".to_string())
            },
        )
    }
}

#[async_trait]
impl Producer for MapProcessor {
    fn name(&self) -> &str {
        "map"
    }

    fn supported_input_schemas(&self) -> InputCapability {
        self.accepts.clone()
    }

    fn supported_output_schemas(&self) -> Vec<SchemaId> {
        vec![self.output.clone()]
    }

    async fn produce(&self, ctx: &ProducerContext, inputs: &[Message]) -> ProducerResult<Message> {
        if let Some(cost) = self.cost {
            ctx.costs.record(cost);
        }
        let content = (self.map)(inputs).map_err(ProducerError::failed)?;
        Ok(Message::new(self.output.clone(), content).with_status(ExecutionStatus::Success))
    }
}

impl std::fmt::Debug for MapProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapProcessor")
            .field("output", &self.output)
            .finish()
    }
}

/// Producer that always fails.
///
/// Declares real schemas so plans build, then errors at production time.
/// An optional simulated cause is attached as the error's source, the way
/// a real producer wraps its underlying I/O or API error.
#[derive(Debug, Clone)]
pub struct FailingProducer {
    accepts: InputCapability,
    outputs: Vec<SchemaId>,
    error: String,
    cause: Option<String>,
}

impl FailingProducer {
    /// A connector that fails with the given message.
    pub fn connector(output: SchemaId, error: impl Into<String>) -> Self {
        Self {
            accepts: InputCapability::none(),
            outputs: vec![output],
            error: error.into(),
            cause: None,
        }
    }

    /// A processor that fails with the given message.
    pub fn processor(
        accepts: InputCapability,
        output: SchemaId,
        error: impl Into<String>,
    ) -> Self {
        Self {
            accepts,
            outputs: vec![output],
            error: error.into(),
            cause: None,
        }
    }

    /// Attaches a simulated underlying cause to every failure.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

#[async_trait]
impl Producer for FailingProducer {
    fn name(&self) -> &str {
        "failing"
    }

    fn supported_input_schemas(&self) -> InputCapability {
        self.accepts.clone()
    }

    fn supported_output_schemas(&self) -> Vec<SchemaId> {
        self.outputs.clone()
    }

    async fn produce(
        &self,
        _ctx: &ProducerContext,
        _inputs: &[Message],
    ) -> ProducerResult<Message> {
        match &self.cause {
            Some(cause) => Err(ProducerError::with_source(
                self.error.as_str(),
                std::io::Error::other(cause.clone()),
            )),
            None => Err(ProducerError::failed(&self.error)),
        }
    }
}
