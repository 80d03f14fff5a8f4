//! Task store.

use crate::core::{Task, TaskStatus};
use crate::errors::EngineError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Task persistence contract.
///
/// `finalize` is the engine's single serialization point for terminal
/// transitions: it performs a compare-and-set and reports whether this
/// call made the transition, which is what quota compensation keys off.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a task row if none exists for its id. A duplicate
    /// submission keeps the existing row untouched.
    async fn insert(&self, task: Task) -> Result<(), EngineError>;

    /// Fetches a task by id.
    async fn get(&self, task_id: Uuid) -> Result<Task, EngineError>;

    /// Moves a pending task to `processing`.
    async fn mark_processing(&self, task_id: Uuid) -> Result<(), EngineError>;

    /// Sets the terminal status and, on success, the artifacts. Returns
    /// true iff this call performed the terminal transition; false means
    /// the task was already terminal and nothing changed.
    async fn finalize(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        artifacts: HashMap<String, serde_json::Value>,
        result_urls: Vec<String>,
    ) -> Result<bool, EngineError>;
}

/// In-memory task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), EngineError> {
        self.tasks.write().entry(task.id).or_insert(task);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Task, EngineError> {
        self.tasks
            .read()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("unknown task '{task_id}'")))
    }

    async fn mark_processing(&self, task_id: Uuid) -> Result<(), EngineError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::Internal(format!("unknown task '{task_id}'")))?;
        if task.status.is_terminal() {
            return Err(EngineError::Internal(format!(
                "task '{task_id}' is already terminal ({})",
                task.status
            )));
        }
        task.status = TaskStatus::Processing;
        Ok(())
    }

    async fn finalize(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        artifacts: HashMap<String, serde_json::Value>,
        result_urls: Vec<String>,
    ) -> Result<bool, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::Internal(format!(
                "finalize called with non-terminal status '{status}'"
            )));
        }
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::Internal(format!("unknown task '{task_id}'")))?;
        if task.status.is_terminal() {
            return Ok(false);
        }
        task.status = status;
        task.artifacts = artifacts;
        task.result_urls = result_urls;
        Ok(true)
    }
}
