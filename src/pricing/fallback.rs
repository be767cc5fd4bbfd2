use crate::cost::ModelRates;

use super::normalize::{model_variants, strip_date_suffix};

/// Built-in rates (USD per million tokens) used when neither the cache nor
/// the remote feed can answer. Snapshot of LiteLLM pricing, 2025-12-12.
pub static FALLBACK_RATES: &[(&str, ModelRates)] = &[
    ("claude-sonnet-4-5-20250929", ModelRates::new(3.00, 15.00, 3.75, 0.30)),
    ("claude-opus-4-5-20251101", ModelRates::new(5.00, 25.00, 6.25, 0.50)),
    ("claude-opus-4-20250514", ModelRates::new(15.00, 75.00, 18.75, 1.50)),
    ("claude-haiku-4-5-20251001", ModelRates::new(1.00, 5.00, 1.25, 0.10)),
    ("claude-3-5-sonnet-20241022", ModelRates::new(3.00, 15.00, 3.75, 0.30)),
    ("claude-3-5-haiku-20241022", ModelRates::new(0.80, 4.00, 1.00, 0.08)),
];

/// Find a table entry for `model`, trying each normalized variant first by
/// exact key and then ignoring release dates.
pub fn lookup(
    table: &'static [(&'static str, ModelRates)],
    model: &str,
) -> Option<(&'static str, ModelRates)> {
    let variants = model_variants(model);

    for variant in &variants {
        if let Some(entry) = table.iter().find(|(key, _)| *key == variant.as_str()) {
            return Some(*entry);
        }
    }

    for variant in &variants {
        let undated = strip_date_suffix(variant);
        if let Some(entry) = table
            .iter()
            .find(|(key, _)| strip_date_suffix(key) == undated)
        {
            return Some(*entry);
        }
    }

    None
}
