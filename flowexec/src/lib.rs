//! # Flowexec
//!
//! A graph-based pipeline execution engine for provider-backed content
//! generation tasks.
//!
//! Flowexec loads a feature's pipeline schema, validates it into a
//! walkable graph, and executes it with support for:
//!
//! - **Graph execution**: linear chains plus fork/join concurrency with
//!   `all`, `any`, and `first` join strategies
//! - **Provider invocation**: synchronous providers and submit/poll
//!   vendor jobs behind one shim, with a content-audit gate on outputs
//! - **Branch contexts**: copy-on-fork execution contexts merged back
//!   at joins under a configurable policy
//! - **Step auditing**: an append-only row per provider execution
//! - **Quota compensation**: exactly-once refund when a task fails
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowexec::prelude::*;
//!
//! let engine = PipelineEngine::new(
//!     schemas, registry, auditor, tasks, steps, quota,
//!     EngineConfig::default(),
//! );
//!
//! let task = Task::new(Uuid::new_v4(), "user-42", "avatar-video");
//! tasks.insert(task.clone()).await?;
//! let outcome = engine
//!     .execute_pipeline(task.id, &task.feature_id, input)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod persist;
pub mod providers;
pub mod quota;
pub mod schema;
pub mod scheduler;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{ExecutionContext, MergePolicy};
    pub use crate::core::{
        ProviderResult, StepStatus, Task, TaskOutcome, TaskStatus, TaskStep,
        VendorJobId, VendorJobState,
    };
    pub use crate::engine::{EngineConfig, PipelineEngine};
    pub use crate::errors::{EngineError, ErrorKind};
    pub use crate::persist::{
        InMemoryStepStore, InMemoryTaskStore, StepStore, TaskStore,
    };
    pub use crate::providers::{
        ApproveAllAuditor, AuditVerdict, ContentAuditor, InvocationShim,
        PollPolicy, Provider, ProviderRegistry, VendorJobProvider,
    };
    pub use crate::quota::{NoopQuota, QuotaService};
    pub use crate::schema::{
        InMemorySchemaStore, JoinStrategy, NodeKind, PipelineDefinition,
        PipelineLoader, SchemaStore, ValidatedPipeline,
    };
    pub use crate::scheduler::Scheduler;
}
