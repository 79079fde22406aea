//! # Cost Estimator
//!
//! Stateless combination of tokenizer output and a pricing lookup into a
//! pre-execution [`CostEstimate`]. Confidence is the minimum of the
//! tokenizer's own confidence and a "known-model" bit: fallback-row
//! resolutions are always demoted to `low`.

use crate::pricing::{cost_components, round_usd, PricingCatalog, Provider, ResolutionKind};
use crate::tokenizer::Confidence;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub provider: Provider,
    pub model_id: String,
    pub input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub input_cost_usd: f64,
    pub estimated_output_cost_usd: f64,
    pub total_estimated_cost_usd: f64,
    pub confidence: Confidence,
}

/// Build a [`CostEstimate`] from already-counted input tokens, an already
/// computed output-token estimate, and a model name. Looks the model up in
/// `catalog` and demotes confidence to `low` if it had to fall back.
pub fn estimate(
    catalog: &PricingCatalog,
    provider_hint: Option<Provider>,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    tokenizer_confidence: Confidence,
) -> CostEstimate {
    let resolution = catalog.resolve(provider_hint, model);
    let known_model_confidence = if resolution.kind == ResolutionKind::Fallback {
        Confidence::Low
    } else {
        Confidence::High
    };
    let confidence = tokenizer_confidence.min(known_model_confidence);

    let (input_cost, output_cost) = cost_components(&resolution.pricing, input_tokens, output_tokens);
    let total = input_cost + output_cost;

    CostEstimate {
        provider: resolution.pricing.provider,
        model_id: resolution.pricing.model_id,
        input_tokens,
        estimated_output_tokens: output_tokens,
        input_cost_usd: round_usd(input_cost),
        estimated_output_cost_usd: round_usd(output_cost),
        total_estimated_cost_usd: round_usd(total),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_keeps_tokenizer_confidence() {
        let catalog = PricingCatalog::new();
        let estimate = estimate(
            &catalog,
            Some(Provider::OpenAi),
            "gpt-4o-mini",
            100,
            50,
            Confidence::High,
        );
        assert_eq!(estimate.confidence, Confidence::High);
        assert_eq!(estimate.total_estimated_cost_usd, 0.000045);
    }

    #[test]
    fn fallback_model_demotes_to_low() {
        let catalog = PricingCatalog::new();
        let estimate = estimate(
            &catalog,
            None,
            "some-unseen-model-v9",
            1000,
            1000,
            Confidence::High,
        );
        assert_eq!(estimate.confidence, Confidence::Low);
    }

    #[test]
    fn total_equals_sum_of_components() {
        let catalog = PricingCatalog::new();
        let estimate = estimate(
            &catalog,
            Some(Provider::Anthropic),
            "claude-3-5-sonnet-latest",
            12345,
            6789,
            Confidence::Medium,
        );
        let diff = (estimate.total_estimated_cost_usd
            - (estimate.input_cost_usd + estimate.estimated_output_cost_usd))
            .abs();
        assert!(diff < 1e-9);
    }
}
