//! Mock providers and collaborators for testing.

use crate::context::ExecutionContext;
use crate::core::{ProviderResult, VendorJobId, VendorJobState};
use crate::errors::{EngineError, ErrorKind};
use crate::providers::{
    AuditVerdict, ContentAuditor, PollPolicy, Provider, VendorJobProvider,
};
use crate::quota::QuotaService;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use uuid::Uuid;

/// A sync provider that records calls and returns a configurable result.
#[derive(Debug)]
pub struct MockProvider {
    reference: String,
    result: Mutex<ProviderResult>,
    call_count: Mutex<usize>,
    seen_metadata: Mutex<HashMap<String, serde_json::Value>>,
}

impl MockProvider {
    /// Creates a mock returning an empty success.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self::returning(reference, ProviderResult::ok_empty())
    }

    /// Creates a mock returning a fixed result.
    #[must_use]
    pub fn returning(reference: impl Into<String>, result: ProviderResult) -> Self {
        Self {
            reference: reference.into(),
            result: Mutex::new(result),
            call_count: Mutex::new(0),
            seen_metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the result to return.
    pub fn set_result(&self, result: ProviderResult) {
        *self.result.lock() = result;
    }

    /// Returns how many times the provider executed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns a metadata value the provider saw on its last call.
    #[must_use]
    pub fn last_metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.seen_metadata.lock().get(key).cloned()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn execute(&self, ctx: &ExecutionContext) -> ProviderResult {
        *self.call_count.lock() += 1;
        *self.seen_metadata.lock() = ctx.metadata_map().clone();
        self.result.lock().clone()
    }
}

/// A sync provider that always fails.
#[derive(Debug)]
pub struct FailingProvider {
    reference: String,
    message: String,
}

impl FailingProvider {
    /// Creates a failing provider.
    #[must_use]
    pub fn new(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> ProviderResult {
        ProviderResult::fail(ErrorKind::ProviderError, self.message.clone())
    }
}

/// A sync provider that sleeps before returning a configurable result.
#[derive(Debug)]
pub struct SlowProvider {
    reference: String,
    delay: Duration,
    result: ProviderResult,
}

impl SlowProvider {
    /// Creates a slow provider with a delay in milliseconds.
    #[must_use]
    pub fn new(reference: impl Into<String>, delay_ms: u64, result: ProviderResult) -> Self {
        Self {
            reference: reference.into(),
            delay: Duration::from_millis(delay_ms),
            result,
        }
    }
}

#[async_trait]
impl Provider for SlowProvider {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> ProviderResult {
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

/// A vendor provider driven by a scripted sequence of poll states.
///
/// Once the script is exhausted the last state repeats; with no script at
/// all the job reports `running` forever, which is how timeout tests
/// starve the poll budget.
#[derive(Debug)]
pub struct ScriptedVendorProvider {
    reference: String,
    states: Mutex<VecDeque<VendorJobState>>,
    fetch_result: Mutex<ProviderResult>,
    policy: Option<PollPolicy>,
    submit_count: Mutex<usize>,
    poll_count: Mutex<usize>,
}

impl ScriptedVendorProvider {
    /// Creates a provider with no script (polls `running` forever).
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            states: Mutex::new(VecDeque::new()),
            fetch_result: Mutex::new(ProviderResult::ok_empty()),
            policy: None,
            submit_count: Mutex::new(0),
            poll_count: Mutex::new(0),
        }
    }

    /// Sets the poll state script.
    #[must_use]
    pub fn with_states(self, states: Vec<VendorJobState>) -> Self {
        *self.states.lock() = states.into();
        self
    }

    /// Explicitly marks the job as never finishing.
    #[must_use]
    pub fn forever_running(self) -> Self {
        *self.states.lock() = VecDeque::new();
        self
    }

    /// Sets the result returned by `fetch` after success.
    #[must_use]
    pub fn with_fetch_result(self, result: ProviderResult) -> Self {
        *self.fetch_result.lock() = result;
        self
    }

    /// Overrides the poll policy.
    #[must_use]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Returns how many times `submit` was called.
    #[must_use]
    pub fn submit_count(&self) -> usize {
        *self.submit_count.lock()
    }

    /// Returns how many times `poll` was called.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        *self.poll_count.lock()
    }
}

#[async_trait]
impl VendorJobProvider for ScriptedVendorProvider {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn submit(&self, _ctx: &ExecutionContext) -> Result<VendorJobId, EngineError> {
        *self.submit_count.lock() += 1;
        Ok(VendorJobId::new(format!("job-{}", Uuid::new_v4())))
    }

    async fn poll(&self, _job: &VendorJobId) -> Result<VendorJobState, EngineError> {
        *self.poll_count.lock() += 1;
        let mut states = self.states.lock();
        if states.len() > 1 {
            Ok(states.pop_front().unwrap_or(VendorJobState::Running))
        } else {
            Ok(states.front().cloned().unwrap_or(VendorJobState::Running))
        }
    }

    async fn fetch(&self, _job: &VendorJobId) -> Result<ProviderResult, EngineError> {
        Ok(self.fetch_result.lock().clone())
    }

    fn poll_policy(&self) -> Option<PollPolicy> {
        self.policy
    }
}

/// A quota service that records refund calls.
#[derive(Debug, Default)]
pub struct RecordingQuota {
    refunds: Mutex<Vec<(String, u32, String)>>,
}

impl RecordingQuota {
    /// Creates a recording quota service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of refund calls made.
    #[must_use]
    pub fn refund_count(&self) -> usize {
        self.refunds.lock().len()
    }

    /// Returns all recorded refund calls.
    #[must_use]
    pub fn refunds(&self) -> Vec<(String, u32, String)> {
        self.refunds.lock().clone()
    }
}

#[async_trait]
impl QuotaService for RecordingQuota {
    async fn refund(&self, user_id: &str, amount: u32, reason: &str) -> Result<(), EngineError> {
        self.refunds
            .lock()
            .push((user_id.to_string(), amount, reason.to_string()));
        Ok(())
    }
}

/// An auditor with a fixed verdict.
#[derive(Debug)]
pub struct StaticAuditor {
    verdict: AuditVerdict,
    call_count: Mutex<usize>,
}

impl StaticAuditor {
    /// Creates an auditor that passes everything.
    #[must_use]
    pub fn passing() -> Self {
        Self {
            verdict: AuditVerdict::pass(),
            call_count: Mutex::new(0),
        }
    }

    /// Creates an auditor that rejects everything with a reason.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            verdict: AuditVerdict::reject(reason),
            call_count: Mutex::new(0),
        }
    }

    /// Returns how many audits were requested.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl ContentAuditor for StaticAuditor {
    async fn audit(
        &self,
        _task_id: Uuid,
        _candidate_urls: &[String],
    ) -> Result<AuditVerdict, EngineError> {
        *self.call_count.lock() += 1;
        Ok(self.verdict.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), HashMap::new())
    }

    #[tokio::test]
    async fn test_mock_provider_counts_calls() {
        let provider = MockProvider::new("m");
        provider.execute(&ctx()).await;
        provider.execute(&ctx()).await;
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_vendor_repeats_last_state() {
        let provider = ScriptedVendorProvider::new("v")
            .with_states(vec![VendorJobState::Queued, VendorJobState::Succeeded]);
        let job = provider.submit(&ctx()).await.unwrap();

        assert_eq!(provider.poll(&job).await.unwrap(), VendorJobState::Queued);
        assert_eq!(provider.poll(&job).await.unwrap(), VendorJobState::Succeeded);
        assert_eq!(provider.poll(&job).await.unwrap(), VendorJobState::Succeeded);
    }

    #[tokio::test]
    async fn test_recording_quota() {
        let quota = RecordingQuota::new();
        quota.refund("user-1", 10, "task failed").await.unwrap();
        assert_eq!(quota.refund_count(), 1);
        assert_eq!(quota.refunds()[0].1, 10);
    }
}
