use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::types::TokenCounts;

fn count(usage: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| usage.get(*k).and_then(Value::as_u64))
        .unwrap_or(0)
}

impl TokenCounts {
    /// Adapt the agent runtime's usage object. Accepts both the runtime's
    /// `cache_*_input_tokens` names and the ledger's own; anything absent or
    /// non-integer counts as zero.
    pub fn from_runtime_usage(usage: &Value) -> Result<Self> {
        if !usage.is_object() {
            bail!("usage must be a JSON object, got {usage}");
        }
        Ok(Self {
            input_tokens: count(usage, &["input_tokens"]),
            output_tokens: count(usage, &["output_tokens"]),
            cache_creation_tokens: count(
                usage,
                &["cache_creation_input_tokens", "cache_creation_tokens"],
            ),
            cache_read_tokens: count(usage, &["cache_read_input_tokens", "cache_read_tokens"]),
        })
    }
}

/// The parts of a finished agent run the ledger needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub session_id: String,
    pub model: Option<String>,
    pub duration_ms: u64,
    pub num_turns: u64,
    pub tokens: TokenCounts,
}

impl SessionResult {
    /// Parse a runtime result message such as
    /// `{"session_id": "...", "duration_ms": 1200, "num_turns": 4, "usage": {...}}`.
    pub fn from_json(data: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(data).context("Result is not valid JSON")?;
        let usage = root.get("usage").context("Result has no usage data")?;

        Ok(Self {
            session_id: root
                .get("session_id")
                .and_then(Value::as_str)
                .context("Result has no session_id")?
                .to_string(),
            model: root
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string),
            duration_ms: root.get("duration_ms").and_then(Value::as_u64).unwrap_or(0),
            num_turns: root.get("num_turns").and_then(Value::as_u64).unwrap_or(0),
            tokens: TokenCounts::from_runtime_usage(usage)?,
        })
    }
}
