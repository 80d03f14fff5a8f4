//! Provider registry: symbolic reference -> executable unit.
//!
//! Built once at process startup and handed to the engine; lookups are
//! read-mostly and safe across concurrent tasks.

use super::{Provider, VendorJobProvider};
use crate::errors::EngineError;
use dashmap::DashMap;
use std::sync::Arc;

/// A registered provider, either flavor.
#[derive(Debug, Clone)]
pub enum RegisteredProvider {
    /// Call once, get a result.
    Sync(Arc<dyn Provider>),
    /// Submit once, poll to completion.
    VendorAsync(Arc<dyn VendorJobProvider>),
}

/// Maps symbolic provider references to concrete providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronous provider under its own reference.
    pub fn register_sync(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(
            provider.reference().to_string(),
            RegisteredProvider::Sync(provider),
        );
    }

    /// Registers a vendor-async provider under its own reference.
    pub fn register_vendor(&self, provider: Arc<dyn VendorJobProvider>) {
        self.providers.insert(
            provider.reference().to_string(),
            RegisteredProvider::VendorAsync(provider),
        );
    }

    /// Resolves a reference, or fails with `UnsupportedProviderRef`.
    pub fn resolve(&self, provider_ref: &str) -> Result<RegisteredProvider, EngineError> {
        self.providers
            .get(provider_ref)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnsupportedProviderRef {
                provider_ref: provider_ref.to_string(),
            })
    }

    /// Returns whether a reference is registered.
    #[must_use]
    pub fn contains(&self, provider_ref: &str) -> bool {
        self.providers.contains_key(provider_ref)
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
