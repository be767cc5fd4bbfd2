use serde::{Deserialize, Serialize};

use crate::types::{CostBreakdown, TokenCounts};

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Rates for one model in USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    pub input_rate: f64,
    pub output_rate: f64,
    pub cache_write_rate: f64,
    pub cache_read_rate: f64,
}

impl ModelRates {
    pub const fn new(input: f64, output: f64, cache_write: f64, cache_read: f64) -> Self {
        Self {
            input_rate: input,
            output_rate: output,
            cache_write_rate: cache_write,
            cache_read_rate: cache_read,
        }
    }

    /// Build from per-token prices, as published by the remote feed.
    pub fn from_per_token(input: f64, output: f64, cache_write: f64, cache_read: f64) -> Self {
        Self::new(
            input * TOKENS_PER_MILLION,
            output * TOKENS_PER_MILLION,
            cache_write * TOKENS_PER_MILLION,
            cache_read * TOKENS_PER_MILLION,
        )
    }

    pub fn is_valid(&self) -> bool {
        [
            self.input_rate,
            self.output_rate,
            self.cache_write_rate,
            self.cache_read_rate,
        ]
        .iter()
        .all(|r| r.is_finite() && *r >= 0.0)
    }
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn token_cost(count: u64, rate_per_million: f64) -> f64 {
    (count as f64 / TOKENS_PER_MILLION) * rate_per_million
}

/// Cost of a token bundle at the given rates.
///
/// Each component is rounded to 6 places on its own; the total is summed at
/// full precision first and then rounded.
pub fn calculate_cost(tokens: &TokenCounts, rates: &ModelRates) -> CostBreakdown {
    let input = token_cost(tokens.input_tokens, rates.input_rate);
    let output = token_cost(tokens.output_tokens, rates.output_rate);
    let cache_creation = token_cost(tokens.cache_creation_tokens, rates.cache_write_rate);
    let cache_read = token_cost(tokens.cache_read_tokens, rates.cache_read_rate);

    CostBreakdown {
        input_cost: round_to(input, 6),
        output_cost: round_to(output, 6),
        cache_creation_cost: round_to(cache_creation, 6),
        cache_read_cost: round_to(cache_read, 6),
        total_cost: round_to(input + output + cache_creation + cache_read, 6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn calculate_cost_mixed_categories() {
        let tokens = TokenCounts {
            input_tokens: 1000,
            output_tokens: 2000,
            cache_creation_tokens: 500,
            cache_read_tokens: 800,
        };
        let rates = ModelRates::new(3.00, 15.00, 3.75, 0.30);
        let c = calculate_cost(&tokens, &rates);
        assert!(close(c.input_cost, 0.003));
        assert!(close(c.output_cost, 0.03));
        assert!(close(c.cache_creation_cost, 0.001875));
        assert!(close(c.cache_read_cost, 0.00024));
        assert!(close(c.total_cost, 0.035115));
    }

    #[test]
    fn total_matches_rounded_component_sum() {
        let tokens = TokenCounts {
            input_tokens: 123_457,
            output_tokens: 98_765,
            cache_creation_tokens: 4_321,
            cache_read_tokens: 1_234_567,
        };
        let c = calculate_cost(&tokens, &ModelRates::new(3.0, 15.0, 3.75, 0.3));
        let sum = c.input_cost + c.output_cost + c.cache_creation_cost + c.cache_read_cost;
        assert!((c.total_cost - round_to(sum, 6)).abs() < 2e-6);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        let c = calculate_cost(&TokenCounts::default(), &ModelRates::new(15.0, 75.0, 18.75, 1.5));
        assert_eq!(c, CostBreakdown::default());
    }

    #[test]
    fn per_token_prices_scale_to_per_million() {
        let r = ModelRates::from_per_token(0.000003, 0.000015, 0.00000375, 0.0000003);
        assert!((r.input_rate - 3.0).abs() < 1e-9);
        assert!((r.output_rate - 15.0).abs() < 1e-9);
        assert!((r.cache_write_rate - 3.75).abs() < 1e-9);
        assert!((r.cache_read_rate - 0.3).abs() < 1e-9);
    }

    #[test]
    fn rejects_negative_and_nan_rates() {
        assert!(ModelRates::new(1.0, 2.0, 0.0, 0.0).is_valid());
        assert!(!ModelRates::new(-1.0, 2.0, 0.0, 0.0).is_valid());
        assert!(!ModelRates::new(1.0, f64::NAN, 0.0, 0.0).is_valid());
    }

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(0.0351149, 4), 0.0351);
        assert_eq!(round_to(1.23456789, 6), 1.234568);
    }
}
