//! Provider invocation shim.
//!
//! Normalizes synchronous providers and submit/poll vendor providers into
//! one [`ProviderResult`] shape. Vendor polling is bounded and
//! cancellable: a superseded branch abandons the wait between attempts
//! without retracting work the vendor has already accepted.

use super::{ContentAuditor, ProviderRegistry, RegisteredProvider, VendorJobProvider};
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::core::{ProviderResult, VendorJobState};
use crate::errors::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded polling configuration for vendor-async providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Fixed delay between poll attempts, in milliseconds.
    pub interval_ms: u64,
    /// Maximum poll attempts before a timeout failure.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    /// The delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Normalizes provider invocation across both provider flavors.
pub struct InvocationShim {
    registry: Arc<ProviderRegistry>,
    auditor: Arc<dyn ContentAuditor>,
    default_poll: PollPolicy,
}

impl InvocationShim {
    /// Creates a shim over a registry and audit gate.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        auditor: Arc<dyn ContentAuditor>,
        default_poll: PollPolicy,
    ) -> Self {
        Self {
            registry,
            auditor,
            default_poll,
        }
    }

    /// Invokes a provider by reference against a branch context.
    ///
    /// Provider-level failures (vendor error, timeout, audit rejection)
    /// come back as failed [`ProviderResult`]s; `Err` is reserved for an
    /// unregistered reference and for cooperative cancellation.
    pub async fn invoke(
        &self,
        provider_ref: &str,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, EngineError> {
        match self.registry.resolve(provider_ref)? {
            RegisteredProvider::Sync(provider) => {
                debug!(provider_ref, "invoking sync provider");
                Ok(provider.execute(ctx).await)
            }
            RegisteredProvider::VendorAsync(provider) => {
                self.drive_vendor_job(provider_ref, provider.as_ref(), ctx, cancel)
                    .await
            }
        }
    }

    /// Submits once, then polls on a fixed interval up to the attempt
    /// budget. The audit gate runs after vendor success, before the
    /// result is reported as successful.
    async fn drive_vendor_job(
        &self,
        provider_ref: &str,
        provider: &dyn VendorJobProvider,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ProviderResult, EngineError> {
        let policy = provider.poll_policy().unwrap_or(self.default_poll);

        let job = match provider.submit(ctx).await {
            Ok(job) => job,
            Err(err) => {
                warn!(provider_ref, error = %err, "vendor submit failed");
                return Ok(ProviderResult::fail(ErrorKind::ProviderError, err.to_string()));
            }
        };
        debug!(provider_ref, vendor_job_id = %job, "vendor job submitted");

        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    reason: cancel.reason().unwrap_or_else(|| "superseded".to_string()),
                });
            }

            match provider.poll(&job).await {
                Ok(VendorJobState::Succeeded) => {
                    debug!(provider_ref, attempt, "vendor job succeeded");
                    let result = match provider.fetch(&job).await {
                        Ok(result) => result,
                        Err(err) => {
                            return Ok(ProviderResult::fail(
                                ErrorKind::ProviderError,
                                err.to_string(),
                            ))
                        }
                    };
                    return self.gate_result(ctx, result).await;
                }
                Ok(VendorJobState::Failed { message }) => {
                    warn!(provider_ref, attempt, %message, "vendor job failed");
                    return Ok(ProviderResult::fail(ErrorKind::ProviderError, message));
                }
                Ok(VendorJobState::Queued | VendorJobState::Running) => {}
                Err(err) => {
                    warn!(provider_ref, attempt, error = %err, "vendor poll failed");
                    return Ok(ProviderResult::fail(ErrorKind::ProviderError, err.to_string()));
                }
            }

            tokio::select! {
                () = tokio::time::sleep(policy.interval()) => {}
                () = cancel.cancelled() => {
                    return Err(EngineError::Cancelled {
                        reason: cancel.reason().unwrap_or_else(|| "superseded".to_string()),
                    });
                }
            }
        }

        warn!(provider_ref, attempts = policy.max_attempts, "vendor poll budget exhausted");
        Ok(ProviderResult::fail(
            ErrorKind::TimeoutError,
            format!(
                "vendor job did not complete within {} poll attempts",
                policy.max_attempts
            ),
        ))
    }

    /// Converts a vendor success into an audit-rejected failure when the
    /// moderation gate says no.
    async fn gate_result(
        &self,
        ctx: &ExecutionContext,
        result: ProviderResult,
    ) -> Result<ProviderResult, EngineError> {
        if !result.success {
            return Ok(result);
        }
        let verdict = self.auditor.audit(ctx.task_id, &result.result_urls).await?;
        if verdict.pass {
            Ok(result)
        } else {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "content audit rejected output".to_string());
            warn!(task_id = %ctx.task_id, %reason, "audit gate rejected vendor output");
            Ok(ProviderResult::fail(ErrorKind::AuditRejected, reason))
        }
    }
}
