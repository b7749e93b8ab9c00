//! Model pricing and cost calculation.
//!
//! The table is data, not contract: unknown models fall back to a
//! conservative per-provider default so budget checks still have something
//! to work with. Figures are USD per million tokens.

use crate::backend::Usage;
use crate::core::provider::Provider;

/// Per-million-token prices for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Cost in USD for the given token counts.
    #[must_use]
    pub fn cost(&self, usage: Usage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Known model prices, matched by id prefix so dated releases
/// ("gpt-4o-2024-08-06") hit their family entry.
const PRICES: &[(Provider, &str, ModelPricing)] = &[
    (Provider::OpenAi, "gpt-4o-mini", p(0.15, 0.60)),
    (Provider::OpenAi, "gpt-4o", p(2.50, 10.00)),
    (Provider::OpenAi, "gpt-4.1-mini", p(0.40, 1.60)),
    (Provider::OpenAi, "gpt-4.1", p(2.00, 8.00)),
    (Provider::OpenAi, "o3-mini", p(1.10, 4.40)),
    (Provider::Anthropic, "claude-3-5-haiku", p(0.80, 4.00)),
    (Provider::Anthropic, "claude-3-5-sonnet", p(3.00, 15.00)),
    (Provider::Anthropic, "claude-3-7-sonnet", p(3.00, 15.00)),
    (Provider::Anthropic, "claude-3-opus", p(15.00, 75.00)),
    (Provider::Gemini, "gemini-2.0-flash-lite", p(0.075, 0.30)),
    (Provider::Gemini, "gemini-2.0-flash", p(0.10, 0.40)),
    (Provider::Gemini, "gemini-1.5-pro", p(1.25, 5.00)),
    (Provider::Mistral, "mistral-small", p(0.10, 0.30)),
    (Provider::Mistral, "mistral-large", p(2.00, 6.00)),
    (Provider::Mistral, "codestral", p(0.20, 0.60)),
];

const fn p(input: f64, output: f64) -> ModelPricing {
    ModelPricing {
        input_per_million: input,
        output_per_million: output,
    }
}

/// Fallback used when a model has no table entry. Deliberately on the high
/// side so budget estimates err toward rejection.
const fn provider_fallback(provider: Provider) -> ModelPricing {
    match provider {
        Provider::OpenAi => p(2.50, 10.00),
        Provider::Anthropic => p(3.00, 15.00),
        Provider::Gemini => p(1.25, 5.00),
        Provider::Mistral => p(2.00, 6.00),
    }
}

/// Look up prices for a model. Longest-prefix match within the provider,
/// falling back to the provider default.
#[must_use]
pub fn lookup(provider: Provider, model: &str) -> ModelPricing {
    PRICES
        .iter()
        .filter(|(p, prefix, _)| *p == provider && model.starts_with(prefix))
        .max_by_key(|(_, prefix, _)| prefix.len())
        .map_or_else(|| provider_fallback(provider), |(_, _, pricing)| *pricing)
}

/// Cost of a completed request in USD.
#[must_use]
pub fn cost(provider: Provider, model: &str, usage: Usage) -> f64 {
    lookup(provider, model).cost(usage)
}
