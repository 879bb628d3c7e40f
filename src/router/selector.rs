//! Provider selection logic.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use super::resolver::{resolve, Candidate};
use crate::catalog::Catalog;
use crate::config::{ModelConfig, ProviderConfig};
use crate::error::{Error, Result};

/// Pick one candidate: a uniformly random zero-cost one if any exist,
/// otherwise the cheapest paid one.
///
/// Paid candidates are ordered by input price, then output price. A candidate
/// missing either price sorts after every fully priced one. Ties keep catalog
/// order.
pub fn select<'a, R>(candidates: &[Candidate<'a>], rng: &mut R) -> Option<Candidate<'a>>
where
    R: Rng + ?Sized,
{
    let (zero_cost, mut paid): (Vec<Candidate<'a>>, Vec<Candidate<'a>>) =
        candidates.iter().partition(|c| c.is_zero_cost());

    if let Some(chosen) = zero_cost.choose(rng) {
        return Some(*chosen);
    }

    // sort_by is stable
    paid.sort_by(compare_paid);
    paid.into_iter().next()
}

fn compare_paid(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    let (a_missing, a_in, a_out) = price_key(a);
    let (b_missing, b_in, b_out) = price_key(b);

    a_missing
        .cmp(&b_missing)
        .then_with(|| a_in.total_cmp(&b_in))
        .then_with(|| a_out.total_cmp(&b_out))
}

fn price_key(candidate: &Candidate<'_>) -> (bool, f64, f64) {
    let pricing = candidate.model.pricing.as_ref();
    let input = pricing.and_then(|p| p.input_cost_per_million_tokens);
    let output = pricing.and_then(|p| p.output_cost_per_million_tokens);

    (
        input.is_none() || output.is_none(),
        input.unwrap_or(f64::INFINITY),
        output.unwrap_or(f64::INFINITY),
    )
}

/// The provider and model chosen for one request.
#[derive(Debug, Clone)]
pub struct SelectedRoute {
    pub provider: ProviderConfig,
    pub model: ModelConfig,
    pub zero_cost: bool,
    /// Catalog generation the decision was made against.
    pub generation: u64,
}

/// Router for selecting providers from the live catalog.
#[derive(Clone)]
pub struct Router {
    catalog: Arc<Catalog>,
}

impl Router {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Select the best provider for a requested model.
    pub fn route(&self, model: &str) -> Result<SelectedRoute> {
        self.route_with(model, &mut rand::thread_rng())
    }

    /// Same as [`Router::route`] with an explicit random source.
    ///
    /// Resolution and selection run against a single catalog snapshot, so a
    /// concurrent reload never mixes two catalogs within one decision.
    pub fn route_with<R>(&self, model: &str, rng: &mut R) -> Result<SelectedRoute>
    where
        R: Rng + ?Sized,
    {
        let snapshot = self.catalog.snapshot();
        let candidates = resolve(&snapshot.providers, model);

        if candidates.is_empty() {
            tracing::debug!(model = %model, "No provider serves requested model");
            return Err(Error::ModelNotConfigured {
                model: model.to_string(),
            });
        }

        let chosen = select(&candidates, rng).ok_or_else(|| Error::NoAvailableCandidate {
            model: model.to_string(),
        })?;

        let zero_cost = chosen.is_zero_cost();
        tracing::info!(
            model = %model,
            provider = %chosen.provider.id,
            upstream_model = %chosen.model.canonical_slug,
            candidates = candidates.len(),
            zero_cost,
            "Selected provider"
        );

        Ok(SelectedRoute {
            provider: chosen.provider.clone(),
            model: chosen.model.clone(),
            zero_cost,
            generation: snapshot.generation,
        })
    }
}
