use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token counts for one session, split by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }
}

/// Token counts as persisted on a session record, with the derived total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    #[serde(flatten)]
    pub counts: TokenCounts,
    pub total_tokens: u64,
}

impl From<TokenCounts> for SessionTokens {
    fn from(counts: TokenCounts) -> Self {
        Self {
            total_tokens: counts.total(),
            counts,
        }
    }
}

/// Per-category cost in USD, each field rounded to 6 decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_creation_cost: f64,
    pub cache_read_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_type: String,
    pub model: String,
    pub duration_ms: u64,
    pub num_turns: u64,
    pub tokens: SessionTokens,
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_sessions: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_creation_tokens: u64,
    pub total_cache_read_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for UsageSummary {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_creation_tokens: 0,
            total_cache_read_tokens: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            last_updated: Utc::now(),
        }
    }
}

/// Everything stored in `usage_statistics.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub summary: UsageSummary,
}

impl LedgerState {
    /// Sum of each cost category across all sessions, unrounded.
    pub fn category_costs(&self) -> CostBreakdown {
        let mut out = CostBreakdown::default();
        for s in &self.sessions {
            out.input_cost += s.costs.input_cost;
            out.output_cost += s.costs.output_cost;
            out.cache_creation_cost += s.costs.cache_creation_cost;
            out.cache_read_cost += s.costs.cache_read_cost;
            out.total_cost += s.costs.total_cost;
        }
        out
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.sessions
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.duration_ms))
    }
}
