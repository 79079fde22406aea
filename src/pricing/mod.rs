//! # Pricing Catalog
//!
//! Static table mapping provider + model to input/output unit prices and
//! context limits, with tolerant lookup: exact match, cross-provider exact
//! match, alias table, longest-prefix-first provider rules, and finally a
//! conservative fallback row. The catalog never fails a lookup.

use globset::{Glob, GlobMatcher};
use std::collections::HashMap;
use std::sync::Arc;

/// Upstream provider family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
        }
    }
}

/// A single catalog row. Prices are USD per one million tokens.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelPricing {
    pub provider: Provider,
    pub model_id: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub context_window: u32,
    pub default_max_output: u32,
    pub deprecated: bool,
}

impl ModelPricing {
    fn new(
        provider: Provider,
        model_id: &str,
        input_price_per_million: f64,
        output_price_per_million: f64,
        context_window: u32,
        default_max_output: u32,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.to_string(),
            input_price_per_million,
            output_price_per_million,
            context_window,
            default_max_output,
            deprecated: false,
        }
    }

    fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

/// A prefix rule maps a glob pattern of incoming model names to a canonical
/// catalog key, ordered longest-prefix-first within a provider so that more
/// specific patterns win over general ones.
struct PrefixRule {
    matcher: GlobMatcher,
    prefix_len: usize,
    canonical: (Provider, String),
}

/// Outcome of a catalog resolution, used by the Cost Estimator to decide
/// confidence demotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Exact,
    Alias,
    Prefix,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub pricing: ModelPricing,
    pub kind: ResolutionKind,
}

/// Immutable, shared pricing table. Built once at startup and never mutated;
/// safe to hand out as `Arc<PricingCatalog>` to every request task.
pub struct PricingCatalog {
    // Keyed by (provider, model_id).
    rows: HashMap<(Provider, String), ModelPricing>,
    // model_id -> first-declared (provider, model_id), for cross-provider exact match.
    by_model_id: HashMap<String, (Provider, String)>,
    aliases: HashMap<String, (Provider, String)>,
    prefix_rules: Vec<PrefixRule>,
    fallback: ModelPricing,
}

impl PricingCatalog {
    /// Build the catalog from the declarative table below. Aliases and
    /// prefix rules are data, not branching code, so adding a model never
    /// touches lookup logic.
    pub fn new() -> Self {
        let mut rows = HashMap::new();
        let mut by_model_id = HashMap::new();

        let declared = vec![
            ModelPricing::new(Provider::OpenAi, "gpt-4o", 2.50, 10.00, 128_000, 16_384),
            ModelPricing::new(Provider::OpenAi, "gpt-4o-mini", 0.15, 0.60, 128_000, 16_384),
            ModelPricing::new(Provider::OpenAi, "gpt-4-turbo", 10.00, 30.00, 128_000, 4_096),
            ModelPricing::new(Provider::OpenAi, "gpt-4", 30.00, 60.00, 8_192, 4_096),
            ModelPricing::new(Provider::OpenAi, "gpt-4-32k", 60.00, 120.00, 32_768, 4_096)
                .deprecated(),
            ModelPricing::new(Provider::OpenAi, "gpt-3.5-turbo", 0.50, 1.50, 16_385, 4_096),
            ModelPricing::new(
                Provider::OpenAi,
                "gpt-3.5-turbo-0301",
                1.50,
                2.00,
                4_096,
                4_096,
            )
            .deprecated(),
            ModelPricing::new(Provider::OpenAi, "o1", 15.00, 60.00, 200_000, 100_000),
            ModelPricing::new(Provider::OpenAi, "o1-mini", 1.10, 4.40, 128_000, 65_536),
            ModelPricing::new(Provider::OpenAi, "o3-mini", 1.10, 4.40, 200_000, 100_000),
            ModelPricing::new(Provider::OpenAi, "o4-mini", 1.10, 4.40, 200_000, 100_000),
            ModelPricing::new(
                Provider::Anthropic,
                "claude-3-5-sonnet-latest",
                3.00,
                15.00,
                200_000,
                8_192,
            ),
            ModelPricing::new(
                Provider::Anthropic,
                "claude-3-5-haiku-latest",
                0.80,
                4.00,
                200_000,
                8_192,
            ),
            ModelPricing::new(
                Provider::Anthropic,
                "claude-3-opus-20240229",
                15.00,
                75.00,
                200_000,
                4_096,
            ),
            ModelPricing::new(
                Provider::Anthropic,
                "claude-3-sonnet-20240229",
                3.00,
                15.00,
                200_000,
                4_096,
            )
            .deprecated(),
            ModelPricing::new(
                Provider::Anthropic,
                "claude-3-haiku-20240307",
                0.25,
                1.25,
                200_000,
                4_096,
            ),
            ModelPricing::new(
                Provider::Google,
                "gemini-1.5-pro",
                1.25,
                5.00,
                2_000_000,
                8_192,
            ),
            ModelPricing::new(
                Provider::Google,
                "gemini-1.5-flash",
                0.075,
                0.30,
                1_000_000,
                8_192,
            ),
        ];

        for row in declared {
            let key = (row.provider, row.model_id.clone());
            by_model_id
                .entry(row.model_id.clone())
                .or_insert_with(|| key.clone());
            rows.insert(key, row);
        }

        let mut aliases = HashMap::new();
        for (alias, provider, canonical) in [
            ("gpt4o", Provider::OpenAi, "gpt-4o"),
            ("gpt4", Provider::OpenAi, "gpt-4"),
            ("gpt-3.5", Provider::OpenAi, "gpt-3.5-turbo"),
            ("chatgpt", Provider::OpenAi, "gpt-3.5-turbo"),
            ("claude", Provider::Anthropic, "claude-3-5-sonnet-latest"),
            (
                "claude-sonnet",
                Provider::Anthropic,
                "claude-3-5-sonnet-latest",
            ),
            (
                "claude-haiku",
                Provider::Anthropic,
                "claude-3-5-haiku-latest",
            ),
            ("claude-opus", Provider::Anthropic, "claude-3-opus-20240229"),
            ("gemini", Provider::Google, "gemini-1.5-pro"),
            ("gemini-flash", Provider::Google, "gemini-1.5-flash"),
        ] {
            aliases.insert(alias.to_string(), (provider, canonical.to_string()));
        }

        let mut prefix_rules = vec![
            ("gpt-4o-mini*", Provider::OpenAi, "gpt-4o-mini"),
            ("gpt-4o*", Provider::OpenAi, "gpt-4o"),
            ("gpt-4-turbo*", Provider::OpenAi, "gpt-4-turbo"),
            ("gpt-4-32k*", Provider::OpenAi, "gpt-4-32k"),
            ("gpt-4-*", Provider::OpenAi, "gpt-4"),
            ("gpt-3.5-turbo-0301*", Provider::OpenAi, "gpt-3.5-turbo-0301"),
            ("gpt-3.5-turbo*", Provider::OpenAi, "gpt-3.5-turbo"),
            ("o1-mini*", Provider::OpenAi, "o1-mini"),
            ("o1*", Provider::OpenAi, "o1"),
            ("o3-mini*", Provider::OpenAi, "o3-mini"),
            ("o4-mini*", Provider::OpenAi, "o4-mini"),
            (
                "claude-3-5-sonnet*",
                Provider::Anthropic,
                "claude-3-5-sonnet-latest",
            ),
            (
                "claude-3-5-haiku*",
                Provider::Anthropic,
                "claude-3-5-haiku-latest",
            ),
            (
                "claude-3-opus*",
                Provider::Anthropic,
                "claude-3-opus-20240229",
            ),
            (
                "claude-3-sonnet*",
                Provider::Anthropic,
                "claude-3-sonnet-20240229",
            ),
            (
                "claude-3-haiku*",
                Provider::Anthropic,
                "claude-3-haiku-20240307",
            ),
            ("gemini-1.5-pro*", Provider::Google, "gemini-1.5-pro"),
            ("gemini-1.5-flash*", Provider::Google, "gemini-1.5-flash"),
        ]
        .into_iter()
        .map(|(pattern, provider, canonical)| PrefixRule {
            matcher: Glob::new(pattern)
                .expect("pricing catalog prefix pattern must be a valid glob")
                .compile_matcher(),
            prefix_len: pattern.trim_end_matches('*').len(),
            canonical: (provider, canonical.to_string()),
        })
        .collect::<Vec<_>>();

        // Longest literal prefix first, so "gpt-4o-mini*" is tried before "gpt-4o*".
        prefix_rules.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));

        let fallback = ModelPricing::new(Provider::OpenAi, "gpt-4o", 2.50, 10.00, 128_000, 16_384);

        Self {
            rows,
            by_model_id,
            aliases,
            prefix_rules,
            fallback,
        }
    }

    /// Resolve a model name, optionally scoped to a known provider, to a
    /// pricing row. Never fails: a miss returns the fallback row.
    pub fn resolve(&self, provider: Option<Provider>, model_id: &str) -> Resolution {
        if let Some(provider) = provider {
            if let Some(row) = self.rows.get(&(provider, model_id.to_string())) {
                return Resolution {
                    pricing: row.clone(),
                    kind: ResolutionKind::Exact,
                };
            }
        }

        if let Some((provider, canonical)) = self.by_model_id.get(model_id) {
            if let Some(row) = self.rows.get(&(*provider, canonical.clone())) {
                return Resolution {
                    pricing: row.clone(),
                    kind: ResolutionKind::Exact,
                };
            }
        }

        if let Some((provider, canonical)) = self.aliases.get(model_id) {
            if let Some(row) = self.rows.get(&(*provider, canonical.clone())) {
                return Resolution {
                    pricing: row.clone(),
                    kind: ResolutionKind::Alias,
                };
            }
        }

        for rule in &self.prefix_rules {
            if rule.matcher.is_match(model_id) {
                if let Some(row) = self.rows.get(&rule.canonical) {
                    return Resolution {
                        pricing: row.clone(),
                        kind: ResolutionKind::Prefix,
                    };
                }
            }
        }

        Resolution {
            pricing: self.fallback.clone(),
            kind: ResolutionKind::Fallback,
        }
    }

    pub fn has_pricing(&self, provider: Provider, model_id: &str) -> bool {
        self.rows.contains_key(&(provider, model_id.to_string()))
    }

    pub fn fallback(&self) -> &ModelPricing {
        &self.fallback
    }
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute input/output cost in USD from a resolved pricing row. Internal
/// sums are kept unrounded; round to six decimals only on external exposure
/// via [`round_usd`].
pub fn cost_components(
    pricing: &ModelPricing,
    input_tokens: u64,
    output_tokens: u64,
) -> (f64, f64) {
    let input_cost = input_tokens as f64 * pricing.input_price_per_million / 1_000_000.0;
    let output_cost = output_tokens as f64 * pricing.output_price_per_million / 1_000_000.0;
    (input_cost, output_cost)
}

/// Round half-up to six decimal places. Only used at the point a cost value
/// leaves the process (API response, ledger write).
pub fn round_usd(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub type SharedCatalog = Arc<PricingCatalog>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins_over_prefix() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(Some(Provider::OpenAi), "gpt-4o-mini");
        assert_eq!(r.kind, ResolutionKind::Exact);
        assert_eq!(r.pricing.model_id, "gpt-4o-mini");
    }

    #[test]
    fn cross_provider_exact_match() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(None, "gpt-4o");
        assert_eq!(r.kind, ResolutionKind::Exact);
        assert_eq!(r.pricing.provider, Provider::OpenAi);
    }

    #[test]
    fn alias_resolves_to_canonical() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(None, "claude");
        assert_eq!(r.kind, ResolutionKind::Alias);
        assert_eq!(r.pricing.model_id, "claude-3-5-sonnet-latest");
    }

    #[test]
    fn longest_prefix_rule_wins() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(None, "gpt-4o-mini-2024-07-18");
        assert_eq!(r.kind, ResolutionKind::Prefix);
        assert_eq!(r.pricing.model_id, "gpt-4o-mini");

        let r2 = catalog.resolve(None, "gpt-4o-2024-08-06");
        assert_eq!(r2.kind, ResolutionKind::Prefix);
        assert_eq!(r2.pricing.model_id, "gpt-4o");
    }

    #[test]
    fn unknown_model_uses_fallback_never_fails() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(None, "totally-unknown-model-xyz");
        assert_eq!(r.kind, ResolutionKind::Fallback);
        assert_eq!(r.pricing.model_id, catalog.fallback().model_id);
    }

    #[test]
    fn deprecated_rows_remain_resolvable() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(Some(Provider::OpenAi), "gpt-3.5-turbo-0301");
        assert_eq!(r.kind, ResolutionKind::Exact);
        assert!(r.pricing.deprecated);
    }

    #[test]
    fn cost_math_matches_spec_example() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(Some(Provider::OpenAi), "gpt-4o-mini");
        let (input_cost, output_cost) = cost_components(&r.pricing, 100, 50);
        let total = round_usd(input_cost + output_cost);
        assert_eq!(total, 0.000045);
    }

    #[test]
    fn zero_tokens_zero_cost() {
        let catalog = PricingCatalog::new();
        let r = catalog.resolve(None, "gpt-4o");
        let (input_cost, output_cost) = cost_components(&r.pricing, 0, 0);
        assert_eq!(input_cost + output_cost, 0.0);
    }

    #[test]
    fn round_usd_half_up() {
        assert_eq!(round_usd(0.0000004), 0.0);
        assert_eq!(round_usd(0.0000005), 0.000001);
        assert_eq!(round_usd(1.2345675), 1.234568);
    }
}
