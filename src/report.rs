use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::ledger::UsageLedger;
use crate::output::group_thousands;
use crate::storage;
use crate::types::{LedgerState, UsageSummary};

pub const REPORTS_DIRNAME: &str = "test-reports";
pub const REPORT_FILENAME: &str = "cost_statistics.md";

/// Approximate input vs cache-read rate, for the savings estimate.
const INPUT_RATE_ESTIMATE: f64 = 3.00;
const CACHE_READ_RATE_ESTIMATE: f64 = 0.30;
const OUTPUT_COST_SHARE_THRESHOLD: f64 = 70.0;

/// Markdown cost report over a ledger snapshot.
pub struct CostReport<'a> {
    state: &'a LedgerState,
    project: String,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// "test_executor" -> "Executor", "smoke check" -> "Smoke Check".
fn display_session_type(raw: &str) -> String {
    let raw = raw.strip_prefix("test_").unwrap_or(raw);
    let mut out = String::with_capacity(raw.len());
    let mut start_of_word = true;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

impl<'a> CostReport<'a> {
    pub fn new(state: &'a LedgerState, project: impl Into<String>) -> Self {
        Self {
            state,
            project: project.into(),
        }
    }

    pub fn from_ledger(ledger: &'a UsageLedger) -> Self {
        let project = ledger
            .project_dir()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(ledger.state(), project)
    }

    pub fn generate_markdown_report(&self) -> String {
        self.render_at(Utc::now())
    }

    pub fn render_at(&self, generated: DateTime<Utc>) -> String {
        let summary = &self.state.summary;
        let mut md = String::new();

        md.push_str("# Cost Statistics Report\n\n");
        let _ = writeln!(
            md,
            "**Generated:** {} UTC\n",
            generated.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(md, "**Project:** {}\n", self.project);

        md.push_str("\n---\n\n## Executive Summary\n\n");
        md.push_str("| Metric | Value |\n|--------|-------|\n");
        let _ = writeln!(md, "| Total Sessions | {} |", summary.total_sessions);
        let _ = writeln!(md, "| Total Tokens | {} |", group_thousands(summary.total_tokens));
        let _ = writeln!(md, "| Total Cost | ${:.4} |", summary.total_cost_usd);
        if summary.total_sessions > 0 {
            let avg = summary.total_cost_usd / summary.total_sessions as f64;
            let _ = writeln!(md, "| Average Cost per Session | ${avg:.4} |");
        }

        self.token_breakdown(&mut md);
        self.session_details(&mut md);

        md.push_str("\n---\n\n## Cost Optimization Recommendations\n");
        for rec in recommendations(self.state) {
            let _ = write!(md, "\n{rec}\n");
        }

        md.push_str("\n---\n\n");
        md.push_str(
            "**Note:** Costs are estimates based on published pricing and may not reflect actual billing.\n",
        );
        md
    }

    fn token_breakdown(&self, md: &mut String) {
        let summary = &self.state.summary;
        md.push_str("\n---\n\n## Token Usage Breakdown\n\n");
        md.push_str("| Token Type | Count | Percentage | Cost |\n");
        md.push_str("|------------|-------|------------|------|\n");

        let total = summary.total_tokens;
        if total == 0 {
            return;
        }

        let costs = self.state.category_costs();
        let rows = [
            ("Input Tokens", summary.total_input_tokens, costs.input_cost),
            ("Output Tokens", summary.total_output_tokens, costs.output_cost),
            (
                "Cache Creation",
                summary.total_cache_creation_tokens,
                costs.cache_creation_cost,
            ),
            (
                "Cache Read",
                summary.total_cache_read_tokens,
                costs.cache_read_cost,
            ),
        ];
        for (label, count, cost) in rows {
            let _ = writeln!(
                md,
                "| {label} | {} | {:.1}% | ${cost:.4} |",
                group_thousands(count),
                percent(count, total)
            );
        }
        let _ = writeln!(
            md,
            "| **Total** | **{}** | **100%** | **${:.4}** |",
            group_thousands(total),
            summary.total_cost_usd
        );
    }

    fn session_details(&self, md: &mut String) {
        md.push_str("\n---\n\n## Session Details\n\n");
        md.push_str("| Session | Type | Duration | Tokens | Cost |\n");
        md.push_str("|---------|------|----------|--------|------|\n");

        for (i, s) in self.state.sessions.iter().enumerate() {
            let _ = writeln!(
                md,
                "| {} | {} | {:.1}s | {} | ${:.4} |",
                i + 1,
                display_session_type(&s.session_type),
                s.duration_ms as f64 / 1000.0,
                group_thousands(s.tokens.total_tokens),
                s.costs.total_cost
            );
        }
    }
}

/// Advisory notes derived from the summary. Never affects any figures.
pub fn recommendations(state: &LedgerState) -> Vec<String> {
    let summary: &UsageSummary = &state.summary;
    let sessions = &state.sessions;
    let total = summary.total_tokens;
    let mut recs = Vec::new();

    let cache_read = summary.total_cache_read_tokens;
    if total > 0 && cache_read > 0 {
        let savings =
            cache_read as f64 / 1_000_000.0 * (INPUT_RATE_ESTIMATE - CACHE_READ_RATE_ESTIMATE);
        recs.push(format!(
            "**Prompt Caching Efficiency**: {:.1}% of tokens were cache reads, saving approximately ${savings:.4}. \
             Consider increasing prompt caching coverage for more savings.",
            percent(cache_read, total)
        ));
    }

    if total > 0 && summary.total_cost_usd > 0.0 {
        let output_cost: f64 = sessions.iter().map(|s| s.costs.output_cost).sum();
        let share = output_cost / summary.total_cost_usd * 100.0;
        if share > OUTPUT_COST_SHARE_THRESHOLD {
            recs.push(format!(
                "**Output Token Optimization**: Output tokens account for {share:.1}% of costs. \
                 Review test reports for verbosity and consider more concise outputs."
            ));
        }
    }

    if sessions.len() > 1 {
        let avg_secs = state.total_duration_ms() as f64 / sessions.len() as f64 / 1000.0;
        recs.push(format!(
            "**Session Duration**: Average session duration is {avg_secs:.1}s. \
             Consider batching test cases to reduce session overhead."
        ));
    }

    recs
}

/// Most recently modified subdirectory of `<project>/test-reports`.
pub fn latest_report_dir(project_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(project_dir.join(REPORTS_DIRNAME)).ok()?;
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            if !meta.is_dir() {
                return None;
            }
            Some((meta.modified().ok()?, e.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

/// Save the markdown next to the latest test report, or in the project root
/// when there is none.
pub fn write_cost_report(project_dir: &Path, markdown: &str) -> Result<PathBuf> {
    let dir = latest_report_dir(project_dir).unwrap_or_else(|| project_dir.to_path_buf());
    let path = dir.join(REPORT_FILENAME);
    storage::write_atomic(&path, markdown.as_bytes())?;
    Ok(path)
}
