//! Task model: the unit of work a pipeline run is attached to.

use crate::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created by the caller, not yet picked up by the engine.
    Pending,
    /// The engine is walking the graph.
    Processing,
    /// Terminal: the pipeline reached `end`.
    Success,
    /// Terminal: load-time rejection or an unrecovered branch failure.
    Failed,
}

impl TaskStatus {
    /// Returns true for terminal statuses. A task never leaves a terminal
    /// status once it is set.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A task owned by the caller and mutated only by the engine during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task id, assigned by the caller before engine invocation.
    pub id: Uuid,
    /// Owning user, used for quota compensation.
    pub user_id: String,
    /// The feature whose pipeline schema drives this run.
    pub feature_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Merged outputs from the final context, set at `end`.
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    /// Result URLs accumulated from provider outputs.
    #[serde(default)]
    pub result_urls: Vec<String>,
}

impl Task {
    /// Creates a pending task.
    #[must_use]
    pub fn new(id: Uuid, user_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            feature_id: feature_id.into(),
            status: TaskStatus::Pending,
            artifacts: HashMap::new(),
            result_urls: Vec::new(),
        }
    }
}

/// The outcome of one engine run, returned to the caller.
///
/// Internal retries (poll attempts) are never exposed here; the status
/// and, on failure, the structured error kind are the only signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Final task status (always terminal).
    pub status: TaskStatus,
    /// Merged artifacts (empty on failure).
    #[serde(default)]
    pub artifacts: HashMap<String, serde_json::Value>,
    /// Result URLs (empty on failure).
    #[serde(default)]
    pub result_urls: Vec<String>,
    /// Structured failure classification, present iff the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Failure detail for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TaskOutcome {
    /// Creates a success outcome from the final merged context values.
    #[must_use]
    pub fn success(
        artifacts: HashMap<String, serde_json::Value>,
        result_urls: Vec<String>,
    ) -> Self {
        Self {
            status: TaskStatus::Success,
            artifacts,
            result_urls,
            error: None,
            error_message: None,
        }
    }

    /// Creates a failure outcome carrying the structured error kind.
    #[must_use]
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            artifacts: HashMap::new(),
            result_urls: Vec::new(),
            error: Some(kind),
            error_message: Some(message.into()),
        }
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}
