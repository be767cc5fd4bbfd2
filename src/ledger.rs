use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cost::{calculate_cost, round_to};
use crate::pricing::PricingSource;
use crate::storage;
use crate::types::{LedgerState, SessionRecord, SessionTokens, TokenCounts, UsageSummary};

pub const STATS_FILENAME: &str = "usage_statistics.json";

pub fn stats_path(project_dir: &Path) -> PathBuf {
    project_dir.join(STATS_FILENAME)
}

/// Load the statistics file, degrading to an empty ledger when it is
/// missing or unreadable.
pub fn load_state(path: &Path) -> LedgerState {
    match storage::read_json(path) {
        Ok(Some(state)) => state,
        Ok(None) => LedgerState::default(),
        Err(e) => {
            warn!("could not load usage statistics: {e:#}");
            warn!("starting with fresh statistics");
            LedgerState::default()
        }
    }
}

/// Recompute the summary from every session.
pub fn summarize(sessions: &[SessionRecord]) -> UsageSummary {
    let mut summary = UsageSummary {
        total_sessions: sessions.len(),
        ..UsageSummary::default()
    };
    let mut total_cost = 0.0;

    for s in sessions {
        let t = &s.tokens.counts;
        summary.total_input_tokens = summary.total_input_tokens.saturating_add(t.input_tokens);
        summary.total_output_tokens = summary.total_output_tokens.saturating_add(t.output_tokens);
        summary.total_cache_creation_tokens = summary
            .total_cache_creation_tokens
            .saturating_add(t.cache_creation_tokens);
        summary.total_cache_read_tokens = summary
            .total_cache_read_tokens
            .saturating_add(t.cache_read_tokens);
        total_cost += s.costs.total_cost;
    }

    summary.total_tokens = TokenCounts {
        input_tokens: summary.total_input_tokens,
        output_tokens: summary.total_output_tokens,
        cache_creation_tokens: summary.total_cache_creation_tokens,
        cache_read_tokens: summary.total_cache_read_tokens,
    }
    .total();
    summary.total_cost_usd = round_to(total_cost, 4);
    summary
}

/// Append-only per-project record of agent sessions and their cost.
pub struct UsageLedger {
    project_dir: PathBuf,
    stats_file: PathBuf,
    pricing: PricingSource,
    state: LedgerState,
}

impl UsageLedger {
    pub fn open(project_dir: &Path, pricing: PricingSource) -> Self {
        let stats_file = stats_path(project_dir);
        let state = load_state(&stats_file);
        Self {
            project_dir: project_dir.to_path_buf(),
            stats_file,
            pricing,
            state,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn stats_file(&self) -> &Path {
        &self.stats_file
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn get_summary(&self) -> &UsageSummary {
        &self.state.summary
    }

    pub fn get_session_history(&self) -> &[SessionRecord] {
        &self.state.sessions
    }

    pub fn average_cost_per_session(&self) -> f64 {
        let summary = self.get_summary();
        if summary.total_sessions == 0 {
            0.0
        } else {
            summary.total_cost_usd / summary.total_sessions as f64
        }
    }

    /// Price a completed session, append it, and persist the whole ledger.
    ///
    /// The record is kept in memory even if the write fails; the next
    /// successful save carries it.
    pub fn record_session(
        &mut self,
        session_id: &str,
        session_type: &str,
        model: &str,
        duration_ms: u64,
        num_turns: u64,
        tokens: TokenCounts,
    ) -> Result<SessionRecord> {
        let rates = self.pricing.get_rates(model);
        let record = SessionRecord {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            session_type: session_type.to_string(),
            model: model.to_string(),
            duration_ms,
            num_turns,
            tokens: SessionTokens::from(tokens),
            costs: calculate_cost(&tokens, &rates),
        };

        self.state.sessions.push(record.clone());
        let mut summary = summarize(&self.state.sessions);
        summary.last_updated = record.timestamp;
        self.state.summary = summary;

        self.save().context("Failed to save usage statistics")?;
        info!(
            "recorded session {} ({} tokens, ${:.4})",
            record.session_id, record.tokens.total_tokens, record.costs.total_cost
        );
        Ok(record)
    }

    /// Write the current state atomically. Does not touch `last_updated`.
    pub fn save(&self) -> Result<()> {
        storage::write_json_atomic(&self.stats_file, &self.state)
    }
}
