//! Cost classification and per-request cost accounting.

use super::resolver::Candidate;
use crate::backend::Usage;
use crate::config::Pricing;

/// Whether a pricing record makes a model free to call.
///
/// Zero-cost requires pricing to exist, to define at least one field, and
/// every defined field to be exactly 0. Anything unreadable (NaN) counts as paid.
pub fn is_zero_cost(pricing: Option<&Pricing>) -> bool {
    let Some(pricing) = pricing else {
        return false;
    };

    let mut defined = pricing.defined_fields().peekable();
    defined.peek().is_some() && defined.all(|v| v == 0.0)
}

impl Candidate<'_> {
    pub fn is_zero_cost(&self) -> bool {
        is_zero_cost(self.model.pricing.as_ref())
    }
}

/// Cost in USD of one request with the given usage.
///
/// Missing price fields contribute nothing; `None` when no price is known at all.
pub fn request_cost_usd(pricing: Option<&Pricing>, usage: Usage) -> Option<f64> {
    let pricing = pricing?;
    pricing.defined_fields().next()?;

    let input = pricing.input_cost_per_million_tokens.unwrap_or(0.0)
        * f64::from(usage.prompt_tokens)
        / 1_000_000.0;
    let output = pricing.output_cost_per_million_tokens.unwrap_or(0.0)
        * f64::from(usage.completion_tokens)
        / 1_000_000.0;
    let per_request = pricing.cost_per_request.unwrap_or(0.0);

    Some(input + output + per_request)
}
