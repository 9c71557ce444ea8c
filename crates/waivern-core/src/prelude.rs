//! Commonly used items from waivern-core.
//!
//! This prelude module exports the types that nearly every consuming crate
//! needs to simplify imports.

pub use crate::artifact::ArtifactId;
pub use crate::message::{Message, Origin};
pub use crate::run::{NodeStatus, RunId, RunMetadata, RunStatus};
pub use crate::schema::SchemaId;
