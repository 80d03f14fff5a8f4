//! Schema fetching and format detection.

use super::definition::{NodeKind, PipelineDefinition};
use super::legacy::{adapt_legacy, LegacyStep};
use super::validate::{validate, ValidatedPipeline};
use crate::errors::EngineError;
use crate::providers::ProviderRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Schema repository contract: feature -> schema ref -> schema body.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Resolves a feature to its schema reference.
    async fn schema_ref(&self, feature_id: &str) -> Result<String, EngineError>;

    /// Fetches a schema body by reference.
    async fn fetch(&self, schema_ref: &str) -> Result<serde_json::Value, EngineError>;
}

/// In-memory schema repository.
#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    features: DashMap<String, String>,
    schemas: DashMap<String, serde_json::Value>,
}

impl InMemorySchemaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature pointing at a schema body under one reference.
    pub fn register(
        &self,
        feature_id: impl Into<String>,
        schema_ref: impl Into<String>,
        schema: serde_json::Value,
    ) {
        let schema_ref = schema_ref.into();
        self.features.insert(feature_id.into(), schema_ref.clone());
        self.schemas.insert(schema_ref, schema);
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn schema_ref(&self, feature_id: &str) -> Result<String, EngineError> {
        self.features
            .get(feature_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::SchemaNotFound {
                feature_id: feature_id.to_string(),
            })
    }

    async fn fetch(&self, schema_ref: &str) -> Result<serde_json::Value, EngineError> {
        self.schemas
            .get(schema_ref)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::SchemaNotFound {
                feature_id: schema_ref.to_string(),
            })
    }
}

/// Loads, parses, and validates pipeline definitions.
///
/// Format is decided by shape: a JSON array is the legacy ordered step
/// format, an object with `nodes`/`edges` is the graph format. Validated
/// pipelines are cached by schema reference; the cache is read-mostly and
/// shared across tasks.
pub struct PipelineLoader {
    store: Arc<dyn SchemaStore>,
    cache: DashMap<String, Arc<ValidatedPipeline>>,
}

impl PipelineLoader {
    /// Creates a loader over a schema store.
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Loads the validated pipeline for a feature.
    ///
    /// All structural failures and unregistered provider references are
    /// raised here, before any provider executes.
    pub async fn load(
        &self,
        feature_id: &str,
        registry: &ProviderRegistry,
    ) -> Result<Arc<ValidatedPipeline>, EngineError> {
        let schema_ref = self.store.schema_ref(feature_id).await?;

        if let Some(cached) = self.cache.get(&schema_ref) {
            return Ok(cached.value().clone());
        }

        let body = self.store.fetch(&schema_ref).await?;
        let definition = parse_definition(&schema_ref, body)?;
        debug!(
            feature_id,
            schema_ref,
            nodes = definition.nodes.len(),
            "loaded pipeline definition"
        );

        let validated = validate(definition)?;
        check_provider_refs(&validated.definition, registry)?;

        let validated = Arc::new(validated);
        self.cache.insert(schema_ref, validated.clone());
        Ok(validated)
    }
}

fn parse_definition(
    schema_ref: &str,
    body: serde_json::Value,
) -> Result<PipelineDefinition, EngineError> {
    match body {
        serde_json::Value::Array(_) => {
            let steps: Vec<LegacyStep> = serde_json::from_value(body)?;
            adapt_legacy(schema_ref, &steps)
        }
        serde_json::Value::Object(ref map) if map.contains_key("nodes") => {
            let mut body = body;
            // schema_ref comes from the repository, not the document.
            if let Some(obj) = body.as_object_mut() {
                obj.entry("schema_ref")
                    .or_insert_with(|| serde_json::Value::String(schema_ref.to_string()));
            }
            Ok(serde_json::from_value(body)?)
        }
        _ => Err(EngineError::Serialization(format!(
            "schema '{schema_ref}' is neither a legacy step array nor a graph document"
        ))),
    }
}

fn check_provider_refs(
    definition: &PipelineDefinition,
    registry: &ProviderRegistry,
) -> Result<(), EngineError> {
    for node in &definition.nodes {
        if node.kind == NodeKind::Provider {
            if let Some(provider_ref) = &node.data.provider_ref {
                if !registry.contains(provider_ref) {
                    return Err(EngineError::UnsupportedProviderRef {
                        provider_ref: provider_ref.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
