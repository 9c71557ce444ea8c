//! Stub connector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use waivern_core::{ExecutionStatus, Message, SchemaId};
use waivern_runtime::producer::{
    InputCapability, Producer, ProducerContext, ProducerResult,
};

use super::ConcurrencyGauge;

/// Connector emitting a fixed message.
///
/// The emitted schema can be made to differ from the declared one to
/// provoke runtime schema violations; an optional delay, gauge, and
/// per-call cost support scheduler and budget tests.
#[derive(Debug, Clone)]
pub struct StubConnector {
    declared: Vec<SchemaId>,
    emitted: SchemaId,
    content: serde_json::Value,
    delay: Option<Duration>,
    gauge: Option<Arc<ConcurrencyGauge>>,
    cost: Option<f64>,
}

impl StubConnector {
    /// Creates a connector declaring and emitting `schema` with the given
    /// content.
    pub fn new(schema: SchemaId, content: serde_json::Value) -> Self {
        Self {
            declared: vec![schema.clone()],
            emitted: schema,
            content,
            delay: None,
            gauge: None,
            cost: None,
        }
    }

    /// Overrides the declared output schemas.
    pub fn with_declared(mut self, declared: Vec<SchemaId>) -> Self {
        self.declared = declared;
        self
    }

    /// Overrides the schema actually stamped on the emitted message.
    pub fn with_emitted(mut self, emitted: SchemaId) -> Self {
        self.emitted = emitted;
        self
    }

    /// Sleeps for `delay` before emitting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports occupancy to a concurrency gauge while producing.
    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Reports a cost to the run's tracker on every call.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

#[async_trait]
impl Producer for StubConnector {
    fn name(&self) -> &str {
        "stub"
    }

    fn supported_input_schemas(&self) -> InputCapability {
        InputCapability::none()
    }

    fn supported_output_schemas(&self) -> Vec<SchemaId> {
        self.declared.clone()
    }

    async fn produce(&self, ctx: &ProducerContext, _inputs: &[Message]) -> ProducerResult<Message> {
        let _occupancy = self.gauge.as_ref().map(|gauge| gauge.enter());
        if let Some(cost) = self.cost {
            ctx.costs.record(cost);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Message::new(self.emitted.clone(), self.content.clone())
            .with_status(ExecutionStatus::Success))
    }
}
