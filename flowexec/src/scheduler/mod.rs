//! Graph-walking execution scheduler.
//!
//! One branch walker per concurrently-active path, each with its own
//! cursor and context copy. Forks spawn child walkers over context
//! snapshots; joins synchronize them per strategy and merge the
//! contributing contexts for the continuing path.

use crate::cancellation::CancellationToken;
use crate::context::{ExecutionContext, MergePolicy};
use crate::core::{StepStatus, Task, TaskOutcome};
use crate::errors::{EngineError, ErrorKind};
use crate::persist::StepStore;
use crate::providers::InvocationShim;
use crate::schema::{JoinStrategy, NodeKind, ValidatedPipeline};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The outcome of one branch walker.
#[derive(Debug)]
enum BranchOutcome {
    /// The walker reached its stop node (a join) or `end`.
    Success(ExecutionContext),
    /// A provider on this branch failed and nothing localized it.
    Failed {
        kind: ErrorKind,
        message: String,
    },
    /// The walker stopped because its branch was cancelled.
    Superseded,
}

/// Walks a validated pipeline graph for one task.
pub struct Scheduler {
    shim: Arc<InvocationShim>,
    steps: Arc<dyn StepStore>,
    merge_policy: MergePolicy,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        shim: Arc<InvocationShim>,
        steps: Arc<dyn StepStore>,
        merge_policy: MergePolicy,
    ) -> Self {
        Self {
            shim,
            steps,
            merge_policy,
        }
    }

    /// Runs the pipeline to a terminal outcome.
    ///
    /// Branch failures escalate per the join strategies along the way;
    /// whatever survives to the root walker decides the task.
    pub async fn run(
        self: &Arc<Self>,
        task: &Task,
        pipeline: Arc<ValidatedPipeline>,
        input: HashMap<String, serde_json::Value>,
        cancel: Arc<CancellationToken>,
    ) -> TaskOutcome {
        info!(task_id = %task.id, schema_ref = %pipeline.definition.schema_ref, "pipeline run started");
        let ctx = ExecutionContext::new(task.id, input);
        let start = pipeline.index.start().to_string();
        let outcome = self
            .clone()
            .walk(pipeline, start, None, ctx, "root".to_string(), cancel)
            .await;

        match outcome {
            BranchOutcome::Success(ctx) => {
                let (artifacts, result_urls) = ctx.into_artifacts();
                info!(task_id = %task.id, "pipeline run succeeded");
                TaskOutcome::success(artifacts, result_urls)
            }
            BranchOutcome::Failed { kind, message } => {
                warn!(task_id = %task.id, %kind, %message, "pipeline run failed");
                TaskOutcome::failed(kind, message)
            }
            BranchOutcome::Superseded => {
                warn!(task_id = %task.id, "pipeline run cancelled");
                TaskOutcome::failed(ErrorKind::Cancelled, "task cancelled before completion")
            }
        }
    }

    /// Walks one branch from `start_node` until `stop_at` (the owning
    /// fork's join), or until `end` for the root walker.
    fn walk(
        self: Arc<Self>,
        pipeline: Arc<ValidatedPipeline>,
        start_node: String,
        stop_at: Option<String>,
        mut ctx: ExecutionContext,
        branch_id: String,
        cancel: Arc<CancellationToken>,
    ) -> BoxFuture<'static, BranchOutcome> {
        Box::pin(async move {
            let mut current = start_node;
            loop {
                if cancel.is_cancelled() {
                    return BranchOutcome::Superseded;
                }
                if stop_at.as_deref() == Some(current.as_str()) {
                    return BranchOutcome::Success(ctx);
                }

                let Some(node) = pipeline.definition.node(&current).cloned() else {
                    return internal_failure(format!("walker reached unknown node '{current}'"));
                };

                match node.kind {
                    NodeKind::Start | NodeKind::Join => {
                        // A join outside a fork pairing is a pass-through.
                        match self.advance(&pipeline, &current) {
                            Ok(next) => current = next,
                            Err(outcome) => return outcome,
                        }
                    }
                    NodeKind::End => return BranchOutcome::Success(ctx),
                    NodeKind::Provider => {
                        match self
                            .execute_provider(&pipeline, &node.id, &node, &mut ctx, &branch_id, &cancel)
                            .await
                        {
                            Ok(next) => current = next,
                            Err(outcome) => return outcome,
                        }
                    }
                    NodeKind::Fork => {
                        match self
                            .execute_fork(&pipeline, &node.id, ctx, &branch_id, &cancel)
                            .await
                        {
                            Ok((next, merged)) => {
                                ctx = merged;
                                current = next;
                            }
                            Err(outcome) => return outcome,
                        }
                    }
                }
            }
        })
    }

    fn advance(
        &self,
        pipeline: &ValidatedPipeline,
        current: &str,
    ) -> Result<String, BranchOutcome> {
        pipeline
            .index
            .outgoing(current)
            .first()
            .cloned()
            .ok_or_else(|| internal_failure(format!("node '{current}' has no outgoing edge")))
    }

    /// Runs one provider node: running row, shim invocation, terminal row.
    async fn execute_provider(
        &self,
        pipeline: &ValidatedPipeline,
        node_id: &str,
        node: &crate::schema::Node,
        ctx: &mut ExecutionContext,
        branch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, BranchOutcome> {
        let Some(provider_ref) = node.data.provider_ref.clone() else {
            return Err(internal_failure(format!(
                "provider node '{node_id}' has no provider_ref"
            )));
        };

        let step_id = match self.steps.record_start(ctx.task_id, node_id, branch_id).await {
            Ok(id) => id,
            Err(err) => return Err(internal_failure(err.to_string())),
        };
        debug!(node_id, branch_id, provider_ref, "provider node started");

        match self.shim.invoke(&provider_ref, ctx, cancel).await {
            Ok(result) if result.success => {
                let output = result.data_or_empty();
                if let Err(err) = self
                    .steps
                    .record_end(step_id, StepStatus::Success, Some(output.clone()), None)
                    .await
                {
                    return Err(internal_failure(err.to_string()));
                }
                ctx.absorb(output, result.result_urls);
                self.advance(pipeline, node_id)
            }
            Ok(result) => {
                let kind = result.error_kind.unwrap_or(ErrorKind::ProviderError);
                let message = result
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string());
                if let Err(store_err) = self
                    .steps
                    .record_end(
                        step_id,
                        StepStatus::Failed,
                        None,
                        Some(format!("{kind}: {message}")),
                    )
                    .await
                {
                    warn!(node_id, branch_id, error = %store_err, "step finalization failed");
                    return Err(internal_failure(format!(
                        "step finalization failed after provider failure ({kind}: {message}): {store_err}"
                    )));
                }
                debug!(node_id, branch_id, %kind, "provider node failed");
                Err(BranchOutcome::Failed { kind, message })
            }
            Err(EngineError::Cancelled { .. }) => {
                if let Err(store_err) = self
                    .steps
                    .record_end(step_id, StepStatus::Superseded, None, None)
                    .await
                {
                    warn!(node_id, branch_id, error = %store_err, "step finalization failed");
                }
                debug!(node_id, branch_id, "provider node superseded");
                Err(BranchOutcome::Superseded)
            }
            Err(err) => {
                let kind = err.kind();
                if let Err(store_err) = self
                    .steps
                    .record_end(step_id, StepStatus::Failed, None, Some(err.to_string()))
                    .await
                {
                    warn!(node_id, branch_id, error = %store_err, "step finalization failed");
                    return Err(internal_failure(format!(
                        "step finalization failed after provider error ({err}): {store_err}"
                    )));
                }
                Err(BranchOutcome::Failed {
                    kind,
                    message: err.to_string(),
                })
            }
        }
    }

    /// Spawns one walker per outgoing edge and resolves the fork's join.
    /// On success, returns the node after the join and the merged context.
    async fn execute_fork(
        self: &Arc<Self>,
        pipeline: &Arc<ValidatedPipeline>,
        fork_id: &str,
        ctx: ExecutionContext,
        branch_id: &str,
        cancel: &Arc<CancellationToken>,
    ) -> Result<(String, ExecutionContext), BranchOutcome> {
        let Some(join_id) = pipeline.index.join_for_fork(fork_id).map(str::to_string) else {
            return Err(internal_failure(format!("fork '{fork_id}' has no paired join")));
        };
        let strategy = pipeline
            .definition
            .node(&join_id)
            .map(crate::schema::Node::join_strategy)
            .unwrap_or_default();

        let heads = pipeline.index.outgoing(fork_id).to_vec();
        debug!(fork_id, join_id, ?strategy, branches = heads.len(), "forking");

        let mut tokens = Vec::with_capacity(heads.len());
        let mut walkers: FuturesUnordered<JoinHandle<BranchOutcome>> = FuturesUnordered::new();
        for (i, head) in heads.into_iter().enumerate() {
            let child_cancel = cancel.child();
            tokens.push(child_cancel.clone());
            walkers.push(tokio::spawn(self.clone().walk(
                pipeline.clone(),
                head,
                Some(join_id.clone()),
                ctx.fork(),
                format!("{branch_id}.{i}"),
                child_cancel,
            )));
        }

        let merged = self
            .resolve_join(strategy, ctx, &mut walkers, &tokens)
            .await?;
        let next = self.advance(pipeline, &join_id)?;
        Ok((next, merged))
    }

    /// Synchronizes branch walkers at a join per the strategy and merges
    /// contributing contexts into the continuing one.
    async fn resolve_join(
        &self,
        strategy: JoinStrategy,
        mut ctx: ExecutionContext,
        walkers: &mut FuturesUnordered<JoinHandle<BranchOutcome>>,
        tokens: &[Arc<CancellationToken>],
    ) -> Result<ExecutionContext, BranchOutcome> {
        match strategy {
            JoinStrategy::All => {
                let mut successes = Vec::new();
                let mut first_failure: Option<(ErrorKind, String)> = None;
                let mut superseded = false;
                while let Some(joined) = walkers.next().await {
                    match flatten(joined) {
                        BranchOutcome::Success(branch_ctx) => successes.push(branch_ctx),
                        BranchOutcome::Failed { kind, message } => {
                            if first_failure.is_none() {
                                first_failure = Some((kind, message));
                            }
                        }
                        BranchOutcome::Superseded => superseded = true,
                    }
                }
                if let Some((kind, message)) = first_failure {
                    return Err(BranchOutcome::Failed { kind, message });
                }
                if superseded {
                    return Err(BranchOutcome::Superseded);
                }
                // Arrival order defines "last" for the merge policy.
                for branch_ctx in successes {
                    ctx.merge(branch_ctx, self.merge_policy);
                }
                Ok(ctx)
            }
            JoinStrategy::Any => {
                let mut winner: Option<ExecutionContext> = None;
                let mut last_failure: Option<(ErrorKind, String)> = None;
                let mut superseded = false;
                while let Some(joined) = walkers.next().await {
                    match flatten(joined) {
                        BranchOutcome::Success(branch_ctx) => {
                            winner = Some(branch_ctx);
                            break;
                        }
                        BranchOutcome::Failed { kind, message } => {
                            last_failure = Some((kind, message));
                        }
                        BranchOutcome::Superseded => superseded = true,
                    }
                }
                // Stop the losers' polling promptly, then let them finish
                // so their audit rows land before the task finalizes.
                for token in tokens {
                    token.cancel("superseded by winning branch");
                }
                while walkers.next().await.is_some() {}

                match winner {
                    Some(branch_ctx) => {
                        ctx.merge(branch_ctx, self.merge_policy);
                        Ok(ctx)
                    }
                    None => match last_failure {
                        Some((kind, message)) => Err(BranchOutcome::Failed { kind, message }),
                        None if superseded => Err(BranchOutcome::Superseded),
                        None => Err(internal_failure("join resolved with no branch outcomes")),
                    },
                }
            }
            JoinStrategy::First => {
                let decided = walkers.next().await.map(flatten);
                for token in tokens {
                    token.cancel("superseded by first completion");
                }
                while walkers.next().await.is_some() {}

                match decided {
                    Some(BranchOutcome::Success(branch_ctx)) => {
                        ctx.merge(branch_ctx, self.merge_policy);
                        Ok(ctx)
                    }
                    Some(BranchOutcome::Failed { kind, message }) => {
                        Err(BranchOutcome::Failed { kind, message })
                    }
                    Some(BranchOutcome::Superseded) | None => Err(BranchOutcome::Superseded),
                }
            }
        }
    }
}

fn internal_failure(message: impl Into<String>) -> BranchOutcome {
    BranchOutcome::Failed {
        kind: ErrorKind::Internal,
        message: message.into(),
    }
}

fn flatten(joined: Result<BranchOutcome, tokio::task::JoinError>) -> BranchOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => internal_failure(format!("branch walker panicked: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProviderResult, StepStatus, TaskStatus, TaskStep, VendorJobState};
    use crate::persist::InMemoryStepStore;
    use crate::providers::{ApproveAllAuditor, PollPolicy, ProviderRegistry};
    use crate::schema::{validate, Edge, Node, PipelineDefinition};
    use crate::testing::mocks::{FailingProvider, MockProvider, ScriptedVendorProvider, SlowProvider};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    /// Step store whose terminal writes always fail; start rows land.
    #[derive(Debug, Default)]
    struct BrokenTerminalStepStore {
        inner: InMemoryStepStore,
    }

    #[async_trait]
    impl StepStore for BrokenTerminalStepStore {
        async fn record_start(
            &self,
            task_id: Uuid,
            node_id: &str,
            branch_id: &str,
        ) -> Result<Uuid, EngineError> {
            self.inner.record_start(task_id, node_id, branch_id).await
        }

        async fn record_end(
            &self,
            _step_id: Uuid,
            _status: StepStatus,
            _output: Option<HashMap<String, serde_json::Value>>,
            _error: Option<String>,
        ) -> Result<(), EngineError> {
            Err(EngineError::Internal("step table unavailable".to_string()))
        }

        async fn steps_for_task(&self, task_id: Uuid) -> Result<Vec<TaskStep>, EngineError> {
            self.inner.steps_for_task(task_id).await
        }
    }

    struct Fixture {
        scheduler: Arc<Scheduler>,
        steps: Arc<InMemoryStepStore>,
        task: Task,
    }

    fn fixture(registry: ProviderRegistry) -> Fixture {
        let steps = Arc::new(InMemoryStepStore::new());
        let shim = Arc::new(InvocationShim::new(
            Arc::new(registry),
            Arc::new(ApproveAllAuditor),
            PollPolicy::new(1, 50),
        ));
        Fixture {
            scheduler: Arc::new(Scheduler::new(
                shim,
                steps.clone(),
                MergePolicy::LastWriteWins,
            )),
            steps,
            task: Task::new(Uuid::new_v4(), "user-1", "feature"),
        }
    }

    async fn run(fixture: &Fixture, definition: PipelineDefinition) -> TaskOutcome {
        let pipeline = Arc::new(validate(definition).unwrap());
        fixture
            .scheduler
            .run(
                &fixture.task,
                pipeline,
                HashMap::new(),
                CancellationToken::shared(),
            )
            .await
    }

    fn linear(refs: &[&str]) -> PipelineDefinition {
        let mut nodes = vec![Node::new("start", NodeKind::Start)];
        let mut edges = Vec::new();
        let mut prev = "start".to_string();
        for (i, r) in refs.iter().enumerate() {
            let id = format!("p{}", i + 1);
            nodes.push(Node::provider(&id, *r));
            edges.push(Edge::new(&prev, &id));
            prev = id;
        }
        nodes.push(Node::new("end", NodeKind::End));
        edges.push(Edge::new(&prev, "end"));
        PipelineDefinition {
            schema_ref: "test".to_string(),
            nodes,
            edges,
        }
    }

    fn forked(strategy: JoinStrategy, a: &str, b: &str) -> PipelineDefinition {
        PipelineDefinition {
            schema_ref: "test".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("f1", NodeKind::Fork),
                Node::provider("a", a),
                Node::provider("b", b),
                Node::join("j1", strategy),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "f1"),
                Edge::new("f1", "a"),
                Edge::new("f1", "b"),
                Edge::new("a", "j1"),
                Edge::new("b", "j1"),
                Edge::new("j1", "end"),
            ],
        }
    }

    #[tokio::test]
    async fn test_linear_run_merges_outputs() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(MockProvider::returning(
            "one",
            ProviderResult::ok_value("script", serde_json::json!("hello")),
        )));
        registry.register_sync(Arc::new(MockProvider::returning(
            "two",
            ProviderResult::ok_value("audio", serde_json::json!("clip"))
                .with_result_urls(vec!["https://cdn/a.wav".to_string()]),
        )));
        let f = fixture(registry);

        let outcome = run(&f, linear(&["one", "two"])).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.artifacts.get("script"), Some(&serde_json::json!("hello")));
        assert_eq!(outcome.artifacts.get("audio"), Some(&serde_json::json!("clip")));
        assert_eq!(outcome.result_urls, vec!["https://cdn/a.wav".to_string()]);
    }

    #[tokio::test]
    async fn test_linear_failure_stops_walk() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(FailingProvider::new("bad", "upstream 500")));
        registry.register_sync(Arc::new(MockProvider::new("never")));
        let f = fixture(registry);

        let outcome = run(&f, linear(&["bad", "never"])).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error, Some(ErrorKind::ProviderError));
        // The second provider never ran.
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_all_join_succeeds_when_all_branches_succeed() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(MockProvider::returning(
            "left",
            ProviderResult::ok_value("left", serde_json::json!(1)),
        )));
        registry.register_sync(Arc::new(MockProvider::returning(
            "right",
            ProviderResult::ok_value("right", serde_json::json!(2)),
        )));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::All, "left", "right")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn test_all_join_fails_on_single_branch_failure() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(MockProvider::new("ok")));
        registry.register_sync(Arc::new(FailingProvider::new("bad", "render crashed")));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::All, "ok", "bad")).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        // Both branches still produced terminal audit rows.
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        let mut statuses: Vec<StepStatus> = steps.iter().map(|s| s.status).collect();
        statuses.sort_by_key(|s| format!("{s}"));
        assert_eq!(statuses, vec![StepStatus::Failed, StepStatus::Success]);
    }

    #[tokio::test]
    async fn test_any_join_succeeds_on_fast_winner() {
        let registry = ProviderRegistry::new();
        // Winner delayed enough that the losing branch has started its
        // provider before the join cancels it.
        registry.register_sync(Arc::new(SlowProvider::new(
            "fast",
            10,
            ProviderResult::ok_value("winner", serde_json::json!("fast")),
        )));
        registry.register_sync(Arc::new(SlowProvider::new(
            "slow_fail",
            50,
            ProviderResult::fail(ErrorKind::ProviderError, "too late anyway"),
        )));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::Any, "fast", "slow_fail")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.artifacts.get("winner"), Some(&serde_json::json!("fast")));
        // The slow branch still finished and recorded its own failure.
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().any(|s| s.status == StepStatus::Failed));
    }

    #[tokio::test]
    async fn test_any_join_fails_when_all_branches_fail() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(FailingProvider::new("bad1", "first failure")));
        registry.register_sync(Arc::new(FailingProvider::new("bad2", "second failure")));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::Any, "bad1", "bad2")).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error, Some(ErrorKind::ProviderError));
    }

    #[tokio::test]
    async fn test_first_join_supersedes_the_loser() {
        let registry = ProviderRegistry::new();
        registry.register_vendor(Arc::new(
            // One poll cycle before success, so the losing branch is
            // mid-poll when the race resolves.
            ScriptedVendorProvider::new("fast_vendor")
                .with_states(vec![VendorJobState::Running, VendorJobState::Succeeded])
                .with_fetch_result(ProviderResult::ok_value("v", serde_json::json!("won")))
                .with_poll_policy(PollPolicy::new(10, 10)),
        ));
        registry.register_vendor(Arc::new(
            // Never finishes; must be cancelled by the race loss.
            ScriptedVendorProvider::new("stuck_vendor")
                .forever_running()
                .with_poll_policy(PollPolicy::new(10_000, 100)),
        ));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::First, "fast_vendor", "stuck_vendor")).await;

        assert!(outcome.is_success());
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 2);
        let non_superseded: Vec<_> = steps
            .iter()
            .filter(|s| s.status != StepStatus::Superseded)
            .collect();
        assert_eq!(non_superseded.len(), 1);
        assert_eq!(non_superseded[0].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn test_first_join_fails_if_first_completion_failed() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(FailingProvider::new("fast_bad", "lost instantly")));
        registry.register_vendor(Arc::new(
            ScriptedVendorProvider::new("stuck_vendor")
                .forever_running()
                .with_poll_policy(PollPolicy::new(10_000, 100)),
        ));
        let f = fixture(registry);

        let outcome = run(&f, forked(JoinStrategy::First, "fast_bad", "stuck_vendor")).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error, Some(ErrorKind::ProviderError));
    }

    #[tokio::test]
    async fn test_failing_terminal_step_write_surfaces_store_error() {
        let registry = ProviderRegistry::new();
        registry.register_sync(Arc::new(FailingProvider::new("bad", "upstream 500")));
        let shim = Arc::new(InvocationShim::new(
            Arc::new(registry),
            Arc::new(ApproveAllAuditor),
            PollPolicy::new(1, 50),
        ));
        let scheduler = Arc::new(Scheduler::new(
            shim,
            Arc::new(BrokenTerminalStepStore::default()),
            MergePolicy::LastWriteWins,
        ));
        let task = Task::new(Uuid::new_v4(), "user-1", "feature");
        let pipeline = Arc::new(validate(linear(&["bad"])).unwrap());

        let outcome = scheduler
            .run(&task, pipeline, HashMap::new(), CancellationToken::shared())
            .await;

        // The store failure trumps the provider failure; the row left
        // behind in `running` must not pass silently.
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error, Some(ErrorKind::Internal));
        let message = outcome.error_message.unwrap_or_default();
        assert!(message.contains("step table unavailable"));
        assert!(message.contains("upstream 500"));
    }

    #[tokio::test]
    async fn test_nested_fork_resolves_inner_join_first() {
        let registry = ProviderRegistry::new();
        for r in ["a", "b", "c"] {
            registry.register_sync(Arc::new(MockProvider::returning(
                r,
                ProviderResult::ok_value(r, serde_json::json!(r)),
            )));
        }
        let f = fixture(registry);

        // start -> f1 -> { a, f2 -> { b, c } -> j2 } -> j1 -> end
        let definition = PipelineDefinition {
            schema_ref: "test".to_string(),
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("f1", NodeKind::Fork),
                Node::provider("a", "a"),
                Node::new("f2", NodeKind::Fork),
                Node::provider("b", "b"),
                Node::provider("c", "c"),
                Node::join("j2", JoinStrategy::All),
                Node::join("j1", JoinStrategy::All),
                Node::new("end", NodeKind::End),
            ],
            edges: vec![
                Edge::new("start", "f1"),
                Edge::new("f1", "a"),
                Edge::new("f1", "f2"),
                Edge::new("f2", "b"),
                Edge::new("f2", "c"),
                Edge::new("b", "j2"),
                Edge::new("c", "j2"),
                Edge::new("j2", "j1"),
                Edge::new("a", "j1"),
                Edge::new("j1", "end"),
            ],
        };

        let outcome = run(&f, definition).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.artifacts.len(), 3);
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.status == StepStatus::Success));
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_cancelled_outcome() {
        let registry = ProviderRegistry::new();
        registry.register_vendor(Arc::new(
            ScriptedVendorProvider::new("stuck_vendor")
                .forever_running()
                .with_poll_policy(PollPolicy::new(10_000, 100)),
        ));
        let f = fixture(registry);
        let pipeline = Arc::new(validate(linear(&["stuck_vendor"])).unwrap());
        let cancel = CancellationToken::shared();

        let scheduler = f.scheduler.clone();
        let task = f.task.clone();
        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { scheduler.run(&task, pipeline, HashMap::new(), cancel).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel("operator abort");
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error, Some(ErrorKind::Cancelled));
        let steps = f.steps.steps_for_task(f.task.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Superseded);
    }
}
