//! Provider result types.
//!
//! Both synchronous providers and vendor-async providers normalize into
//! [`ProviderResult`]; the vendor job id is internal to the invocation
//! shim and never persisted as a final result.

use crate::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The normalized result of one provider invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Output key/value data contributed to the branch context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
    /// Result URLs (rendered media, documents) produced by the provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_urls: Vec<String>,
    /// Failure classification, present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResult {
    /// Creates a successful result with data.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            result_urls: Vec::new(),
            error_kind: None,
            error: None,
        }
    }

    /// Creates a successful result with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            result_urls: Vec::new(),
            error_kind: None,
            error: None,
        }
    }

    /// Creates a successful result with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a failed result with a typed kind and message.
    #[must_use]
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            result_urls: Vec::new(),
            error_kind: Some(kind),
            error: Some(message.into()),
        }
    }

    /// Attaches result URLs.
    #[must_use]
    pub fn with_result_urls(mut self, urls: Vec<String>) -> Self {
        self.result_urls = urls;
        self
    }

    /// Gets a value from the data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Returns the data, or an empty map if none.
    #[must_use]
    pub fn data_or_empty(&self) -> HashMap<String, serde_json::Value> {
        self.data.clone().unwrap_or_default()
    }
}

/// Opaque handle for a submitted vendor job. Internal to the shim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorJobId(pub String);

impl VendorJobId {
    /// Creates a new job id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for VendorJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state a vendor reports for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorJobState {
    /// Accepted but not started.
    Queued,
    /// In progress.
    Running,
    /// Finished; artifacts may be fetched.
    Succeeded,
    /// Failed on the vendor side.
    Failed {
        /// Vendor-supplied failure message.
        message: String,
    },
}

impl VendorJobState {
    /// Returns true once the vendor will report nothing further.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}
