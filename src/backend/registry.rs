//! Provider-type → backend factory table.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::openai::{OpenAiFactory, OPENAI_COMPATIBLE_TYPES};
use super::{BackendError, BackendHandle};
use crate::config::{ExecutionConfig, ProviderConfig};
use crate::error::{Error, Result};

/// Builds a backend client for one provider.
///
/// Construction may perform I/O (e.g. exchanging a long-lived credential for
/// a short-lived token), hence async and fallible.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, provider: &ProviderConfig) -> std::result::Result<BackendHandle, BackendError>;
}

/// Registry of factories keyed by provider type tag.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in OpenAI-compatible provider types.
    pub fn with_defaults(execution: &ExecutionConfig) -> Self {
        let mut registry = Self::new();
        for &(provider_type, default_base_url) in OPENAI_COMPATIBLE_TYPES {
            registry.register(
                provider_type,
                OpenAiFactory::new(default_base_url, execution.connect_timeout()),
            );
        }
        registry
    }

    /// Register (or replace) the factory for a provider type.
    pub fn register(
        &mut self,
        provider_type: impl Into<String>,
        factory: impl BackendFactory + 'static,
    ) {
        self.factories.insert(provider_type.into(), Arc::new(factory));
    }

    /// Registered type tags, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn supports(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Construct a backend for `provider` using the factory for its type.
    pub async fn build(&self, provider: &ProviderConfig) -> Result<BackendHandle> {
        let factory = self
            .factories
            .get(&provider.provider_type)
            .ok_or_else(|| Error::UnsupportedProviderType {
                provider_type: provider.provider_type.clone(),
                supported: self.supported_types(),
            })?;

        factory
            .build(provider)
            .await
            .map_err(|source| Error::BackendInit {
                provider: provider.id.clone(),
                source,
            })
    }
}
