//! Step audit rows: one durable record per node execution attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The status of a single step row.
///
/// Rows transition `running -> {success|failed|superseded}` exactly once
/// and are never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The node is executing.
    Running,
    /// The node completed and its output contributed to the path.
    Success,
    /// The node failed with a typed error.
    Failed,
    /// The node finished after its join had already advanced via a
    /// different branch; kept for audit, ignored for continuation.
    Superseded,
}

impl StepStatus {
    /// Returns true for statuses a row can never leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

/// One audit record of a single node's execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Row id.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// The graph node this attempt executed.
    pub node_id: String,
    /// Disambiguates concurrent fork branches (e.g. `root`, `root.1`).
    pub branch_id: String,
    /// Current row status.
    pub status: StepStatus,
    /// Provider output, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<HashMap<String, serde_json::Value>>,
    /// Typed error detail, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the row reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    /// Creates a `running` row for a fresh attempt.
    #[must_use]
    pub fn start(task_id: Uuid, node_id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            node_id: node_id.into(),
            branch_id: branch_id.into(),
            status: StepStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}
