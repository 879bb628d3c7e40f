//! Candidate resolution: which (provider, model) pairs can serve a request.

use crate::config::{ModelConfig, ProviderConfig};

/// A (provider, model) pair able to serve a requested model identifier.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub provider: &'a ProviderConfig,
    pub model: &'a ModelConfig,
}

/// Every model whose exposed identifier equals `model`, in catalog order.
///
/// Matching is exact and case-sensitive. No match yields an empty list.
pub fn resolve<'a>(providers: &'a [ProviderConfig], model: &str) -> Vec<Candidate<'a>> {
    providers
        .iter()
        .flat_map(|provider| {
            provider
                .models
                .iter()
                .filter(move |m| m.exposed_id() == model)
                .map(move |m| Candidate { provider, model: m })
        })
        .collect()
}
