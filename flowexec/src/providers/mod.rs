//! Provider contract: synchronous providers and vendor-async providers.
//!
//! Providers are the pluggable units a pipeline node executes. The
//! registry resolves symbolic references to concrete providers; the
//! invocation shim normalizes both flavors into one [`ProviderResult`]
//! shape.

mod audit;
mod registry;
mod shim;

pub use audit::{ApproveAllAuditor, AuditVerdict, ContentAuditor};
pub use registry::{ProviderRegistry, RegisteredProvider};
pub use shim::{InvocationShim, PollPolicy};

use crate::context::ExecutionContext;
use crate::core::{ProviderResult, VendorJobId, VendorJobState};
use crate::errors::EngineError;
use async_trait::async_trait;
use std::fmt::Debug;

/// A synchronous provider: one call, one result.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The symbolic reference this provider is registered under.
    fn reference(&self) -> &str;

    /// Executes the provider against the branch context.
    async fn execute(&self, ctx: &ExecutionContext) -> ProviderResult;
}

/// A vendor-async provider reached through submit-then-poll.
///
/// The job id is internal plumbing for the shim; it never surfaces as a
/// final result.
#[async_trait]
pub trait VendorJobProvider: Send + Sync + Debug {
    /// The symbolic reference this provider is registered under.
    fn reference(&self) -> &str;

    /// Submits the job once and returns its vendor handle.
    async fn submit(&self, ctx: &ExecutionContext) -> Result<VendorJobId, EngineError>;

    /// Polls the vendor for the job's current state.
    async fn poll(&self, job: &VendorJobId) -> Result<VendorJobState, EngineError>;

    /// Fetches result artifacts after the vendor reports success.
    async fn fetch(&self, job: &VendorJobId) -> Result<ProviderResult, EngineError>;

    /// Overrides the engine's default poll policy for this provider.
    fn poll_policy(&self) -> Option<PollPolicy> {
        None
    }
}
