//! Model pricing and per-call cost.
//!
//! Rates are USD per 1K tokens, matched on the longest model-name prefix.
//! Local providers are free. When a provider reports no token counts the
//! call is charged a fixed fallback cost.

use agora_core::defaults::FALLBACK_CALL_COST_USD;
use agora_core::ProviderKind;

use crate::provider::TokenUsage;

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPrice {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 / 1000.0 * self.input_per_1k
            + usage.output_tokens as f64 / 1000.0 * self.output_per_1k
    }
}

const DEFAULT_PRICES: &[(&str, ModelPrice)] = &[
    // OpenAI
    ("gpt-4o-mini", ModelPrice::new(0.000_15, 0.000_6)),
    ("gpt-4.1-mini", ModelPrice::new(0.000_4, 0.001_6)),
    ("gpt-4.1", ModelPrice::new(0.002, 0.008)),
    ("gpt-4o", ModelPrice::new(0.002_5, 0.01)),
    ("text-embedding-3-small", ModelPrice::new(0.000_02, 0.0)),
    ("text-embedding-3-large", ModelPrice::new(0.000_13, 0.0)),
    ("omni-moderation", ModelPrice::new(0.0, 0.0)),
    ("text-moderation", ModelPrice::new(0.0, 0.0)),
    // Anthropic
    ("claude-3-haiku", ModelPrice::new(0.000_25, 0.001_25)),
    ("claude-3-5-haiku", ModelPrice::new(0.000_8, 0.004)),
    ("claude-haiku-4", ModelPrice::new(0.001, 0.005)),
    ("claude-3-5-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-3-7-sonnet", ModelPrice::new(0.003, 0.015)),
    ("claude-sonnet-4", ModelPrice::new(0.003, 0.015)),
    ("claude-3-opus", ModelPrice::new(0.015, 0.075)),
    ("claude-opus-4", ModelPrice::new(0.015, 0.075)),
];

/// Price lookup plus cost computation.
#[derive(Debug, Clone)]
pub struct PricingTable {
    prices: Vec<(String, ModelPrice)>,
    /// Charged when usage is missing or the model is unknown.
    fallback_call_cost: f64,
    free_providers: Vec<ProviderKind>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            prices: DEFAULT_PRICES
                .iter()
                .map(|(prefix, price)| (prefix.to_string(), *price))
                .collect(),
            fallback_call_cost: FALLBACK_CALL_COST_USD,
            free_providers: vec![ProviderKind::Ollama],
        }
    }
}

impl PricingTable {
    /// Add or replace a price for a model prefix.
    pub fn with_price(mut self, prefix: impl Into<String>, price: ModelPrice) -> Self {
        let prefix = prefix.into();
        self.prices.retain(|(p, _)| *p != prefix);
        self.prices.push((prefix, price));
        self
    }

    pub fn with_fallback_call_cost(mut self, cost: f64) -> Self {
        self.fallback_call_cost = cost;
        self
    }

    pub fn fallback_call_cost(&self) -> f64 {
        self.fallback_call_cost
    }

    /// Longest matching prefix wins. Provider prefixes like `openai/` are ignored.
    pub fn price_for(&self, model: &str) -> Option<ModelPrice> {
        let name = model.rsplit('/').next().unwrap_or(model);
        self.prices
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, price)| *price)
    }

    /// USD cost of one provider call.
    pub fn cost(&self, provider: ProviderKind, model: &str, usage: Option<TokenUsage>) -> f64 {
        if self.free_providers.contains(&provider) {
            return 0.0;
        }
        match (usage, self.price_for(model)) {
            (Some(usage), Some(price)) => price.cost(usage),
            _ => self.fallback_call_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let table = PricingTable::default();
        let mini = table.price_for("gpt-4o-mini-2024-07-18").unwrap();
        let full = table.price_for("gpt-4o-2024-08-06").unwrap();
        assert!(mini.input_per_1k < full.input_per_1k);
    }

    #[test]
    fn test_cost_from_usage() {
        let table = PricingTable::default();
        let cost = table.cost(
            ProviderKind::Anthropic,
            "claude-3-5-haiku-latest",
            Some(TokenUsage::new(1000, 1000)),
        );
        assert!((cost - 0.0048).abs() < 1e-12);
    }

    #[test]
    fn test_missing_usage_uses_fallback() {
        let table = PricingTable::default().with_fallback_call_cost(0.01);
        assert_eq!(table.cost(ProviderKind::OpenAi, "gpt-4o-mini", None), 0.01);
        assert_eq!(
            table.cost(
                ProviderKind::OpenAi,
                "some-new-model",
                Some(TokenUsage::new(10, 10))
            ),
            0.01
        );
    }

    #[test]
    fn test_local_provider_is_free() {
        let table = PricingTable::default();
        assert_eq!(table.cost(ProviderKind::Ollama, "llama3.2", None), 0.0);
    }

    #[test]
    fn test_provider_prefix_is_stripped() {
        let table = PricingTable::default();
        assert!(table.price_for("openai/gpt-4o-mini").is_some());
    }
}
