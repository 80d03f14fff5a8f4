//! Engine facade: one entry point from task submission to terminal state.
//!
//! Wires the loader, provider registry, shim, scheduler, and stores
//! together and owns the finalize/refund transition. Quota is deducted
//! before a task reaches the engine, so the engine refunds on failure
//! and refunds at most once per task.

use crate::cancellation::CancellationToken;
use crate::context::MergePolicy;
use crate::core::{Task, TaskOutcome, TaskStatus};
use crate::errors::ErrorKind;
use crate::persist::{StepStore, TaskStore};
use crate::providers::{ContentAuditor, InvocationShim, PollPolicy, ProviderRegistry};
use crate::quota::QuotaService;
use crate::schema::{PipelineLoader, SchemaStore};
use crate::scheduler::Scheduler;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Engine-level tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Polling cadence for vendor jobs whose provider declares none.
    pub default_poll: PollPolicy,
    /// Quota units deducted per task, and therefore refunded on failure.
    pub quota_cost: u32,
    /// How concurrent branch outputs reconcile at joins.
    pub merge_policy: MergePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_poll: PollPolicy::default(),
            quota_cost: 1,
            merge_policy: MergePolicy::LastWriteWins,
        }
    }
}

/// Executes feature pipelines end to end.
pub struct PipelineEngine {
    loader: PipelineLoader,
    registry: Arc<ProviderRegistry>,
    scheduler: Arc<Scheduler>,
    tasks: Arc<dyn TaskStore>,
    quota: Arc<dyn QuotaService>,
    quota_cost: u32,
}

impl PipelineEngine {
    /// Wires an engine from its collaborators.
    #[must_use]
    pub fn new(
        schemas: Arc<dyn SchemaStore>,
        registry: Arc<ProviderRegistry>,
        auditor: Arc<dyn ContentAuditor>,
        tasks: Arc<dyn TaskStore>,
        steps: Arc<dyn StepStore>,
        quota: Arc<dyn QuotaService>,
        config: EngineConfig,
    ) -> Self {
        let shim = Arc::new(InvocationShim::new(
            registry.clone(),
            auditor,
            config.default_poll,
        ));
        let scheduler = Arc::new(Scheduler::new(shim, steps, config.merge_policy));
        Self {
            loader: PipelineLoader::new(schemas),
            registry,
            scheduler,
            tasks,
            quota,
            quota_cost: config.quota_cost,
        }
    }

    /// Executes the pipeline for a task created by the caller, driving
    /// it to a terminal state.
    ///
    /// Always finalizes the task row; the returned outcome mirrors what
    /// was persisted. Schema and validation failures are surfaced the
    /// same way as runtime failures, with no step rows written.
    pub async fn execute_pipeline(
        &self,
        task_id: Uuid,
        feature_id: &str,
        input: HashMap<String, serde_json::Value>,
    ) -> TaskOutcome {
        self.execute_with_cancel(task_id, feature_id, input, CancellationToken::shared())
            .await
    }

    /// [`Self::execute_pipeline`] with an externally held cancellation
    /// token, for callers that expose operator aborts.
    pub async fn execute_with_cancel(
        &self,
        task_id: Uuid,
        feature_id: &str,
        input: HashMap<String, serde_json::Value>,
        cancel: Arc<CancellationToken>,
    ) -> TaskOutcome {
        info!(%task_id, feature_id, "task accepted");

        // The caller creates the task row (with quota already reserved)
        // before handing it to the engine.
        let task = match self.tasks.get(task_id).await {
            Ok(task) => task,
            Err(err) => {
                warn!(%task_id, error = %err, "task row not found");
                return TaskOutcome::failed(ErrorKind::Internal, err.to_string());
            }
        };

        let pipeline = match self.loader.load(feature_id, &self.registry).await {
            Ok(pipeline) => pipeline,
            Err(err) => {
                warn!(%task_id, error = %err, "pipeline load failed");
                let outcome = TaskOutcome::failed(err.kind(), err.to_string());
                self.finalize(&task, &outcome).await;
                return outcome;
            }
        };

        if let Err(err) = self.tasks.mark_processing(task_id).await {
            let outcome = TaskOutcome::failed(ErrorKind::Internal, err.to_string());
            self.finalize(&task, &outcome).await;
            return outcome;
        }

        let outcome = self.scheduler.run(&task, pipeline, input, cancel).await;
        self.finalize(&task, &outcome).await;
        outcome
    }

    /// Fetches the current task row.
    pub async fn task(&self, task_id: Uuid) -> Result<Task, crate::errors::EngineError> {
        self.tasks.get(task_id).await
    }

    /// Compare-and-set finalization. Only the caller that wins the
    /// transition refunds, which keeps the refund exactly-once even if
    /// two executions of the same task race.
    async fn finalize(&self, task: &Task, outcome: &TaskOutcome) {
        match self
            .tasks
            .finalize(
                task.id,
                outcome.status,
                outcome.artifacts.clone(),
                outcome.result_urls.clone(),
            )
            .await
        {
            Ok(true) => {
                if outcome.status == TaskStatus::Failed {
                    let reason = outcome
                        .error
                        .map_or_else(|| "task failed".to_string(), |kind| kind.to_string());
                    if let Err(err) = self
                        .quota
                        .refund(&task.user_id, self.quota_cost, &reason)
                        .await
                    {
                        warn!(task_id = %task.id, error = %err, "quota refund failed");
                    } else {
                        info!(task_id = %task.id, amount = self.quota_cost, "quota refunded");
                    }
                }
            }
            Ok(false) => {
                debug!(task_id = %task.id, "task already finalized, skipping refund");
            }
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "task finalization failed");
            }
        }
    }
}
