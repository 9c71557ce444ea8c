#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod mock;

pub use mock::{ConcurrencyGauge, FailingProducer, MapProcessor, StubConnector};
use waivern_core::SchemaId;

/// Parses a schema identifier, panicking on invalid input.
///
/// Test fixtures use literal identifiers; a typo should fail the test
/// immediately.
pub fn schema(id: &str) -> SchemaId {
    id.parse().expect("test schema identifier is valid")
}
