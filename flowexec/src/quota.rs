//! Quota compensation interface.
//!
//! The caller reserves quota before invoking the engine. On terminal
//! success the reservation is consumed implicitly; on terminal failure
//! the engine refunds it exactly once. The at-most-once guarantee comes
//! from the task store's terminal compare-and-set: only the caller that
//! wins the transition performs the refund.

use crate::errors::EngineError;
use async_trait::async_trait;
use tracing::info;

/// External quota collaborator.
#[async_trait]
pub trait QuotaService: Send + Sync {
    /// Refunds a pre-reserved amount. Called at most once per failed task.
    async fn refund(&self, user_id: &str, amount: u32, reason: &str) -> Result<(), EngineError>;
}

/// A quota service that does nothing. Useful for features whose runs are
/// free and for tests that do not assert on compensation.
#[derive(Debug, Default)]
pub struct NoopQuota;

#[async_trait]
impl QuotaService for NoopQuota {
    async fn refund(&self, user_id: &str, amount: u32, reason: &str) -> Result<(), EngineError> {
        info!(user_id, amount, reason, "quota refund (noop)");
        Ok(())
    }
}
