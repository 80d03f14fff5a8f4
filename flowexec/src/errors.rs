//! Error types for the flowexec engine.
//!
//! The taxonomy splits into load-time errors (raised before any provider
//! runs) and execution-time errors (localized to a branch and escalated
//! per the active join strategy).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No schema is registered for the requested feature.
    #[error("Schema not found for feature '{feature_id}'")]
    SchemaNotFound {
        /// The feature reference that failed to resolve.
        feature_id: String,
    },

    /// The pipeline graph failed structural validation.
    #[error("Invalid pipeline graph: {message}")]
    InvalidGraph {
        /// Human-readable description of the violation.
        message: String,
        /// The node ids involved in the violation.
        nodes: Vec<String>,
    },

    /// A provider node references a provider that is not registered.
    #[error("Unsupported provider reference: '{provider_ref}'")]
    UnsupportedProviderRef {
        /// The unresolved provider reference.
        provider_ref: String,
    },

    /// A provider call (or vendor job) failed.
    #[error("Provider '{provider_ref}' failed: {message}")]
    Provider {
        /// The provider reference.
        provider_ref: String,
        /// The failure message.
        message: String,
    },

    /// Vendor job polling exhausted its attempt budget.
    #[error("Provider '{provider_ref}' timed out after {attempts} poll attempts")]
    Timeout {
        /// The provider reference.
        provider_ref: String,
        /// The attempts consumed before giving up.
        attempts: u32,
    },

    /// The vendor job succeeded but the content audit gate rejected its output.
    #[error("Content audit rejected output: {reason}")]
    AuditRejected {
        /// The rejection reason.
        reason: String,
    },

    /// Quota compensation itself failed. Surfaced but never resurrects a task.
    #[error("Quota operation failed: {message}")]
    Quota {
        /// The failure message.
        message: String,
    },

    /// Execution was cancelled cooperatively.
    #[error("Execution cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason (first one wins).
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates an invalid-graph error over a set of node ids.
    #[must_use]
    pub fn invalid_graph(message: impl Into<String>, nodes: Vec<String>) -> Self {
        Self::InvalidGraph {
            message: message.into(),
            nodes,
        }
    }

    /// Creates a provider failure error.
    #[must_use]
    pub fn provider(provider_ref: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider_ref: provider_ref.into(),
            message: message.into(),
        }
    }

    /// Returns the structured kind exposed to callers on failed outcomes.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaNotFound { .. } => ErrorKind::SchemaNotFound,
            Self::InvalidGraph { .. } => ErrorKind::InvalidGraph,
            Self::UnsupportedProviderRef { .. } => ErrorKind::UnsupportedProviderRef,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::Timeout { .. } => ErrorKind::TimeoutError,
            Self::AuditRejected { .. } => ErrorKind::AuditRejected,
            Self::Quota { .. } => ErrorKind::QuotaError,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for errors raised before any provider executes.
    #[must_use]
    pub fn is_load_time(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound { .. }
                | Self::InvalidGraph { .. }
                | Self::UnsupportedProviderRef { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Caller-visible error classification carried on failed task outcomes
/// and terminal step rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown feature or schema reference.
    SchemaNotFound,
    /// Cycle, orphan, or mismatched fork/join.
    InvalidGraph,
    /// A provider node references an unregistered provider.
    UnsupportedProviderRef,
    /// Vendor call failed.
    ProviderError,
    /// Polling exhausted.
    TimeoutError,
    /// Vendor succeeded but output failed moderation.
    AuditRejected,
    /// Compensation itself failed.
    QuotaError,
    /// Execution was cancelled.
    Cancelled,
    /// Anything else.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SchemaNotFound => "schema_not_found",
            Self::InvalidGraph => "invalid_graph",
            Self::UnsupportedProviderRef => "unsupported_provider_ref",
            Self::ProviderError => "provider_error",
            Self::TimeoutError => "timeout_error",
            Self::AuditRejected => "audit_rejected",
            Self::QuotaError => "quota_error",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}
