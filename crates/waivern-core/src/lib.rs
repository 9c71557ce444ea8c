#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod artifact;
pub mod message;
pub mod run;
pub mod schema;

mod error;

#[doc(hidden)]
pub mod prelude;

pub use artifact::{ArtifactId, ArtifactIdError};
pub use error::BoxedError;
pub use message::{ExecutionContext, ExecutionStatus, Extensions, Message, Origin, OriginError};
pub use run::{ExecutionState, NodeStatus, RunId, RunMetadata, RunStatus};
pub use schema::{SchemaId, SchemaIdError};
