use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use super::normalize::model_variants;
use crate::cost::ModelRates;

/// LiteLLM responses are a couple of MB; ureq's default body limit is 10 MB.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Raw feed table: model id -> entry with per-token prices.
pub type FeedTable = Map<String, Value>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("malformed pricing feed: {0}")]
    Malformed(String),
}

/// Source of the full remote pricing table.
pub trait PricingFeed {
    fn url(&self) -> &str;
    fn fetch(&self) -> Result<FeedTable, FeedError>;
}

/// Blocking HTTP fetch of the LiteLLM pricing JSON.
pub struct HttpFeed {
    agent: ureq::Agent,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            url: url.into(),
        }
    }
}

impl PricingFeed for HttpFeed {
    fn url(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<FeedTable, FeedError> {
        let transport = |source: ureq::Error| FeedError::Transport {
            url: self.url.clone(),
            source: Box::new(source),
        };
        let body = self
            .agent
            .get(&self.url)
            .call()
            .map_err(transport)?
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(transport)?;
        parse_feed(&body)
    }
}

pub fn parse_feed(data: &str) -> Result<FeedTable, FeedError> {
    let root: Value =
        serde_json::from_str(data).map_err(|e| FeedError::Malformed(e.to_string()))?;
    let Value::Object(table) = root else {
        return Err(FeedError::Malformed("top level is not an object".into()));
    };
    if table.is_empty() {
        return Err(FeedError::Malformed("no models listed".into()));
    }
    Ok(table)
}

/// Per-million rates for one feed entry. Absent prices count as zero;
/// entries that are not objects or carry negative/non-finite prices are
/// rejected.
fn entry_rates(entry: &Value) -> Option<ModelRates> {
    let obj = entry.as_object()?;
    let price = |field: &str| obj.get(field).and_then(Value::as_f64).unwrap_or(0.0);

    let rates = ModelRates::from_per_token(
        price("input_cost_per_token"),
        price("output_cost_per_token"),
        price("cache_creation_input_token_cost"),
        price("cache_read_input_token_cost"),
    );
    rates.is_valid().then_some(rates)
}

/// Look `model` up in a feed table, trying each normalized variant in turn.
/// Returns the matching key alongside the rates.
pub fn extract_rates(table: &FeedTable, model: &str) -> Option<(String, ModelRates)> {
    model_variants(model).into_iter().find_map(|variant| {
        let rates = table.get(&variant).and_then(entry_rates)?;
        Some((variant, rates))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(v: Value) -> FeedTable {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn converts_per_token_to_per_million() {
        let t = table(json!({
            "claude-sonnet-4-5-20250929": {
                "input_cost_per_token": 0.000003,
                "output_cost_per_token": 0.000015,
                "cache_creation_input_token_cost": 0.00000375,
                "cache_read_input_token_cost": 0.0000003
            }
        }));
        let (key, r) = extract_rates(&t, "claude-sonnet-4-5-20250929").unwrap();
        assert_eq!(key, "claude-sonnet-4-5-20250929");
        assert!((r.input_rate - 3.00).abs() < 1e-9);
        assert!((r.output_rate - 15.00).abs() < 1e-9);
        assert!((r.cache_write_rate - 3.75).abs() < 1e-9);
        assert!((r.cache_read_rate - 0.30).abs() < 1e-9);
    }

    #[test]
    fn profile_id_finds_base_entry() {
        let t = table(json!({
            "claude-opus-4-20250514": {
                "input_cost_per_token": 0.000015,
                "output_cost_per_token": 0.000075
            }
        }));
        let (key, r) = extract_rates(&t, "us.anthropic.claude-opus-4-20250514-v1:0").unwrap();
        assert_eq!(key, "claude-opus-4-20250514");
        assert_eq!(r.cache_write_rate, 0.0);
    }

    #[test]
    fn bedrock_prefixed_key() {
        let t = table(json!({
            "bedrock/us.anthropic.claude-x-v1:0": { "input_cost_per_token": 0.000001 }
        }));
        let (key, _) = extract_rates(&t, "us.anthropic.claude-x-v1:0").unwrap();
        assert_eq!(key, "bedrock/us.anthropic.claude-x-v1:0");
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let t = table(json!({
            "sample_spec": "documentation",
            "neg": { "input_cost_per_token": -1.0 }
        }));
        assert!(extract_rates(&t, "sample_spec").is_none());
        assert!(extract_rates(&t, "neg").is_none());
        assert!(extract_rates(&t, "absent").is_none());
    }

    #[test]
    fn parse_feed_rejects_garbage() {
        assert!(matches!(parse_feed("<html>"), Err(FeedError::Malformed(_))));
        assert!(matches!(parse_feed("[1, 2]"), Err(FeedError::Malformed(_))));
        assert!(matches!(parse_feed("{}"), Err(FeedError::Malformed(_))));
        assert!(parse_feed(r#"{"m": {"input_cost_per_token": 1e-6}}"#).is_ok());
    }
}
