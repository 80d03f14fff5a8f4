//! Step audit log store.

use crate::core::{StepStatus, TaskStep};
use crate::errors::EngineError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Durable per-node execution trail.
///
/// Every node execution attempt, including branches later superseded,
/// produces exactly one row transitioning `running` to a terminal status.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Inserts a `running` row for a fresh attempt and returns its id.
    async fn record_start(
        &self,
        task_id: Uuid,
        node_id: &str,
        branch_id: &str,
    ) -> Result<Uuid, EngineError>;

    /// Transitions a row to its terminal status. Rejected if the row is
    /// already terminal: rows are append-only.
    async fn record_end(
        &self,
        step_id: Uuid,
        status: StepStatus,
        output: Option<HashMap<String, serde_json::Value>>,
        error: Option<String>,
    ) -> Result<(), EngineError>;

    /// Returns all rows for a task in insertion order.
    async fn steps_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, EngineError>;
}

/// In-memory step store.
#[derive(Debug, Default)]
pub struct InMemoryStepStore {
    rows: RwLock<HashMap<Uuid, TaskStep>>,
    order: RwLock<Vec<Uuid>>,
}

impl InMemoryStepStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepStore for InMemoryStepStore {
    async fn record_start(
        &self,
        task_id: Uuid,
        node_id: &str,
        branch_id: &str,
    ) -> Result<Uuid, EngineError> {
        let step = TaskStep::start(task_id, node_id, branch_id);
        let id = step.id;
        self.rows.write().insert(id, step);
        self.order.write().push(id);
        Ok(id)
    }

    async fn record_end(
        &self,
        step_id: Uuid,
        status: StepStatus,
        output: Option<HashMap<String, serde_json::Value>>,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::Internal(format!(
                "record_end called with non-terminal status '{status}'"
            )));
        }
        let mut rows = self.rows.write();
        let step = rows.get_mut(&step_id).ok_or_else(|| {
            EngineError::Internal(format!("unknown step row '{step_id}'"))
        })?;
        if step.status.is_terminal() {
            return Err(EngineError::Internal(format!(
                "step row '{step_id}' is already terminal ({})",
                step.status
            )));
        }
        step.status = status;
        step.output = output;
        step.error = error;
        step.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn steps_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, EngineError> {
        let rows = self.rows.read();
        Ok(self
            .order
            .read()
            .iter()
            .filter_map(|id| rows.get(id))
            .filter(|step| step.task_id == task_id)
            .cloned()
            .collect())
    }
}
