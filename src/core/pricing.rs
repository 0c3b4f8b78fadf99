//! Static per-model rate cards and microcurrency cost computation.
//!
//! All rates are expressed in micro-USD per one million tokens and all
//! arithmetic is integer: the per-component products are summed first and
//! divided once by one million, truncating toward zero. This keeps billing
//! deterministic across platforms at sub-cent granularity.
//!
//! An unknown model name falls back to the family's default rate card
//! rather than failing: a pricing-table miss must never break a request.

use crate::core::types::{ProviderFamily, TokenUsage};

/// Micro-units per currency unit, and tokens per rate denominator.
pub const MICRO_PER_UNIT: u64 = 1_000_000;

/// Per-model rates in micro-USD per one million tokens.
///
/// `cache_write` / `cache_read` apply to the Anthropic schema;
/// `cached_input` applies to the OpenAI schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCard {
    pub input: u64,
    pub output: u64,
    pub cache_write: u64,
    pub cache_read: u64,
    pub cached_input: u64,
}

const fn card(input: u64, output: u64, cache_write: u64, cache_read: u64, cached_input: u64) -> RateCard {
    RateCard {
        input,
        output,
        cache_write,
        cache_read,
        cached_input,
    }
}

/// Anthropic-family cards, matched in order by case-insensitive substring.
/// Cache writes bill at 1.25x input; cache reads at 0.1x input.
const ANTHROPIC_RATES: &[(&str, RateCard)] = &[
    ("claude-3-5-haiku", card(800_000, 4_000_000, 1_000_000, 80_000, 0)),
    ("claude-3-haiku", card(250_000, 1_250_000, 312_500, 25_000, 0)),
    ("claude-3-opus", card(15_000_000, 75_000_000, 18_750_000, 1_500_000, 0)),
    ("claude-3-5-sonnet", card(3_000_000, 15_000_000, 3_750_000, 300_000, 0)),
    ("claude-3-7-sonnet", card(3_000_000, 15_000_000, 3_750_000, 300_000, 0)),
];

/// Default card for unrecognized Anthropic models: the sonnet tier.
const ANTHROPIC_DEFAULT: RateCard = card(3_000_000, 15_000_000, 3_750_000, 300_000, 0);

/// OpenAI-family cards, matched in order by case-insensitive substring.
/// The "-mini" entries must precede their base models.
const OPENAI_RATES: &[(&str, RateCard)] = &[
    ("gpt-4o-mini", card(150_000, 600_000, 0, 0, 75_000)),
    ("gpt-4o", card(2_500_000, 10_000_000, 0, 0, 1_250_000)),
    ("gpt-4-turbo", card(10_000_000, 30_000_000, 0, 0, 10_000_000)),
    ("gpt-3.5-turbo", card(500_000, 1_500_000, 0, 0, 500_000)),
    ("o1-mini", card(1_100_000, 4_400_000, 0, 0, 550_000)),
    ("o1", card(15_000_000, 60_000_000, 0, 0, 7_500_000)),
];

/// Default card for unrecognized OpenAI models: the gpt-4o tier.
const OPENAI_DEFAULT: RateCard = card(2_500_000, 10_000_000, 0, 0, 1_250_000);

/// Look up the rate card for a model, falling back to the family default.
pub fn rate_card(family: ProviderFamily, model: &str) -> RateCard {
    let lower = model.to_ascii_lowercase();
    let (table, default) = match family {
        ProviderFamily::Anthropic => (ANTHROPIC_RATES, ANTHROPIC_DEFAULT),
        ProviderFamily::OpenAi => (OPENAI_RATES, OPENAI_DEFAULT),
    };
    table
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, rates)| *rates)
        .unwrap_or(default)
}

/// Compute the cost of one request in micro-USD.
///
/// Anthropic: `input x in + output x out + cache_write x cw + cache_read x cr`.
/// OpenAI: `(prompt - cached) x in + cached x cached_in + completion x out`,
/// with saturating subtraction so malformed counts cannot underflow.
pub fn cost_micro_usd(family: ProviderFamily, model: &str, usage: &TokenUsage) -> u64 {
    let rates = rate_card(family, model);
    let total = match family {
        ProviderFamily::Anthropic => usage
            .input_tokens
            .saturating_mul(rates.input)
            .saturating_add(usage.output_tokens.saturating_mul(rates.output))
            .saturating_add(usage.cache_write_tokens.saturating_mul(rates.cache_write))
            .saturating_add(usage.cache_read_tokens.saturating_mul(rates.cache_read)),
        ProviderFamily::OpenAi => {
            let cached = usage.cached_prompt_tokens.min(usage.input_tokens);
            (usage.input_tokens - cached)
                .saturating_mul(rates.input)
                .saturating_add(cached.saturating_mul(rates.cached_input))
                .saturating_add(usage.output_tokens.saturating_mul(rates.output))
        }
    };
    total / MICRO_PER_UNIT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_usage_costs_zero() {
        for family in [ProviderFamily::OpenAi, ProviderFamily::Anthropic] {
            assert_eq!(cost_micro_usd(family, "anything", &TokenUsage::default()), 0);
        }
    }

    #[test]
    fn test_openai_basic_cost() {
        // 1000 in x $2.50/M + 500 out x $10/M = $0.0025 + $0.005 = 7500 micro.
        let cost = cost_micro_usd(ProviderFamily::OpenAi, "gpt-4o", &usage(1000, 500));
        assert_eq!(cost, 7500);
    }

    #[test]
    fn test_openai_cached_prompt_discount() {
        let u = TokenUsage {
            input_tokens: 2000,
            output_tokens: 0,
            cached_prompt_tokens: 500,
            ..Default::default()
        };
        // 1500 x 2.5 + 500 x 1.25 = 3750 + 625 = 4375 micro.
        assert_eq!(cost_micro_usd(ProviderFamily::OpenAi, "gpt-4o", &u), 4375);
    }

    #[test]
    fn test_openai_cached_exceeding_prompt_saturates() {
        let u = TokenUsage {
            input_tokens: 100,
            cached_prompt_tokens: 500,
            ..Default::default()
        };
        // All 100 prompt tokens bill at the cached rate; no underflow.
        // 100 x 1.25/M = 125 micro.
        assert_eq!(cost_micro_usd(ProviderFamily::OpenAi, "gpt-4o", &u), 125);
    }

    #[test]
    fn test_anthropic_cost_with_cache_fields() {
        let u = TokenUsage {
            input_tokens: 1000,
            output_tokens: 200,
            cache_write_tokens: 400,
            cache_read_tokens: 2000,
            ..Default::default()
        };
        // sonnet: 1000x3 + 200x15 + 400x3.75 + 2000x0.3 = 3000+3000+1500+600 = 8100 micro.
        let cost = cost_micro_usd(ProviderFamily::Anthropic, "claude-3-5-sonnet-20241022", &u);
        assert_eq!(cost, 8100);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        // 1 token x 150_000 / 1M = 0.15 -> 0.
        assert_eq!(
            cost_micro_usd(ProviderFamily::OpenAi, "gpt-4o-mini", &usage(1, 0)),
            0
        );
        // 7 tokens x 150_000 / 1M = 1.05 -> 1.
        assert_eq!(
            cost_micro_usd(ProviderFamily::OpenAi, "gpt-4o-mini", &usage(7, 0)),
            1
        );
    }

    #[test]
    fn test_unknown_model_uses_family_default() {
        assert_eq!(
            rate_card(ProviderFamily::OpenAi, "experimental-model-x"),
            OPENAI_DEFAULT
        );
        assert_eq!(
            rate_card(ProviderFamily::Anthropic, "claude-99"),
            ANTHROPIC_DEFAULT
        );
        // A miss prices like the default, never fails.
        assert_eq!(
            cost_micro_usd(ProviderFamily::OpenAi, "experimental-model-x", &usage(1000, 0)),
            2500
        );
    }

    #[test]
    fn test_mini_variants_match_before_base_models() {
        assert_eq!(
            rate_card(ProviderFamily::OpenAi, "gpt-4o-mini-2024-07-18").input,
            150_000
        );
        assert_eq!(
            rate_card(ProviderFamily::Anthropic, "claude-3-5-haiku-latest").input,
            800_000
        );
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert_eq!(
            rate_card(ProviderFamily::OpenAi, "GPT-4O"),
            rate_card(ProviderFamily::OpenAi, "gpt-4o")
        );
    }

    #[test]
    fn test_cost_is_deterministic() {
        let u = usage(12_345, 6_789);
        let first = cost_micro_usd(ProviderFamily::Anthropic, "claude-3-opus", &u);
        for _ in 0..10 {
            assert_eq!(cost_micro_usd(ProviderFamily::Anthropic, "claude-3-opus", &u), first);
        }
    }
}
