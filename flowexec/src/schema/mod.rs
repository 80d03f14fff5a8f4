//! Pipeline schema model, loading, and validation.
//!
//! Schemas arrive as JSON documents in one of two generations: a legacy
//! ordered step array, or a graph document with `nodes` and `edges`. Both
//! funnel into [`PipelineDefinition`] and one validation pass, so the
//! scheduler has a single execution path.

mod definition;
mod legacy;
mod loader;
mod validate;

pub use definition::{Edge, JoinStrategy, Node, NodeData, NodeKind, PipelineDefinition};
pub use legacy::{adapt_legacy, LegacyStep};
pub use loader::{InMemorySchemaStore, PipelineLoader, SchemaStore};
pub use validate::{validate, GraphIndex, ValidatedPipeline};
