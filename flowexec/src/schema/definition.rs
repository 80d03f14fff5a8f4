//! Pipeline definition model.

use serde::{Deserialize, Serialize};

/// Wait strategy for a join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Wait for every branch; any failure fails the join.
    #[default]
    All,
    /// First success wins; fails only if all branches fail.
    Any,
    /// First completion wins, success or failure.
    First,
}

/// The kind of a graph node.
///
/// Exhaustive matching over this enum replaces the string-typed node
/// dispatch of older schema documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The single entry node.
    Start,
    /// A provider invocation.
    Provider,
    /// Splits execution into concurrent branches.
    Fork,
    /// Synchronizes branches per a [`JoinStrategy`].
    Join,
    /// A terminal node; reaching it completes the task.
    End,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Provider => "provider",
            Self::Fork => "fork",
            Self::Join => "join",
            Self::End => "end",
        };
        write!(f, "{s}")
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Symbolic provider reference, required for `provider` nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    /// Declared branch count for `fork` nodes; must equal the outgoing
    /// edge count when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<usize>,
    /// Join strategy for `join` nodes; defaults to `all` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<JoinStrategy>,
}

/// One node of a pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id within the definition.
    pub id: String,
    /// Node kind.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    /// Creates a node with empty data.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            data: NodeData::default(),
        }
    }

    /// Creates a provider node.
    #[must_use]
    pub fn provider(id: impl Into<String>, provider_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Provider,
            data: NodeData {
                provider_ref: Some(provider_ref.into()),
                ..NodeData::default()
            },
        }
    }

    /// Creates a join node with a strategy.
    #[must_use]
    pub fn join(id: impl Into<String>, strategy: JoinStrategy) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Join,
            data: NodeData {
                strategy: Some(strategy),
                ..NodeData::default()
            },
        }
    }

    /// Returns the join strategy, defaulting to `all`.
    #[must_use]
    pub fn join_strategy(&self) -> JoinStrategy {
        self.data.strategy.unwrap_or_default()
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
}

impl Edge {
    /// Creates an edge.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A pipeline definition: the graph document as loaded, prior to
/// validation. Owned by the schema repository, read-only per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The schema reference this definition was loaded from.
    pub schema_ref: String,
    /// Graph nodes.
    pub nodes: Vec<Node>,
    /// Graph edges.
    pub edges: Vec<Edge>,
}

impl PipelineDefinition {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
