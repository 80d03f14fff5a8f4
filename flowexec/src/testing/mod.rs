//! Test doubles for providers, quota, and the audit gate.

pub mod mocks;

pub use mocks::{
    FailingProvider, MockProvider, RecordingQuota, ScriptedVendorProvider, SlowProvider,
    StaticAuditor,
};
