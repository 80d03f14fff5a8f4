//! Content audit gate.
//!
//! Applied after a vendor-async provider reports success and before the
//! step is marked successful. The moderation policy itself lives outside
//! the engine; only its pass/fail verdict is consumed here.

use crate::errors::EngineError;
use async_trait::async_trait;
use uuid::Uuid;

/// The verdict of one audit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditVerdict {
    /// Whether the candidate output passed moderation.
    pub pass: bool,
    /// Reason, populated on rejection.
    pub reason: Option<String>,
}

impl AuditVerdict {
    /// A passing verdict.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            pass: true,
            reason: None,
        }
    }

    /// A rejecting verdict with a reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: Some(reason.into()),
        }
    }
}

/// External content-audit collaborator.
#[async_trait]
pub trait ContentAuditor: Send + Sync {
    /// Audits candidate result URLs for a task.
    async fn audit(
        &self,
        task_id: Uuid,
        candidate_urls: &[String],
    ) -> Result<AuditVerdict, EngineError>;
}

/// An auditor that passes everything. Useful for features with no
/// moderation requirement and for tests.
#[derive(Debug, Default)]
pub struct ApproveAllAuditor;

#[async_trait]
impl ContentAuditor for ApproveAllAuditor {
    async fn audit(
        &self,
        _task_id: Uuid,
        _candidate_urls: &[String],
    ) -> Result<AuditVerdict, EngineError> {
        Ok(AuditVerdict::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_approve_all() {
        let auditor = ApproveAllAuditor;
        let verdict = auditor
            .audit(Uuid::new_v4(), &["https://cdn/a.png".to_string()])
            .await
            .unwrap();
        assert!(verdict.pass);
    }

    #[test]
    fn test_reject_carries_reason() {
        let verdict = AuditVerdict::reject("nsfw");
        assert!(!verdict.pass);
        assert_eq!(verdict.reason.as_deref(), Some("nsfw"));
    }
}
