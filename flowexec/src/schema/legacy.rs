//! Legacy linear schema adapter.
//!
//! The previous schema generation was a flat ordered array of provider
//! steps. It degenerates into a chain `start -> step1 -> ... -> end` so
//! the scheduler's single code path serves both generations.

use super::definition::{Edge, Node, NodeKind, PipelineDefinition};
use crate::errors::EngineError;
use serde::{Deserialize, Serialize};

/// One entry of the legacy ordered step array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyStep {
    /// Always "provider" in observed documents; anything else is rejected.
    #[serde(rename = "type")]
    pub kind: String,
    /// Symbolic provider reference.
    pub provider_ref: String,
}

/// Adapts a legacy step array into a degenerate chain definition with no
/// fork/join nodes.
pub fn adapt_legacy(
    schema_ref: impl Into<String>,
    steps: &[LegacyStep],
) -> Result<PipelineDefinition, EngineError> {
    if steps.is_empty() {
        return Err(EngineError::invalid_graph(
            "legacy schema contains no steps",
            Vec::new(),
        ));
    }

    let mut nodes = vec![Node::new("start", NodeKind::Start)];
    let mut edges = Vec::new();
    let mut previous = "start".to_string();

    for (i, step) in steps.iter().enumerate() {
        if step.kind != "provider" {
            return Err(EngineError::invalid_graph(
                format!("legacy step {} has unsupported type '{}'", i, step.kind),
                Vec::new(),
            ));
        }
        let id = format!("step{}", i + 1);
        nodes.push(Node::provider(&id, &step.provider_ref));
        edges.push(Edge::new(&previous, &id));
        previous = id;
    }

    nodes.push(Node::new("end", NodeKind::End));
    edges.push(Edge::new(&previous, "end"));

    Ok(PipelineDefinition {
        schema_ref: schema_ref.into(),
        nodes,
        edges,
    })
}
