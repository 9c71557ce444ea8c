//! Mock producer implementations.

mod connector;
mod gauge;
mod processor;

pub use connector::StubConnector;
pub use gauge::ConcurrencyGauge;
pub use processor::{FailingProducer, MapProcessor};
