use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::{info, warn};

use crate::ledger::stats_path;
use crate::output::group_thousands;
use crate::report::latest_report_dir;
use crate::storage;
use crate::types::LedgerState;

pub const HTML_REPORT_FILENAME: &str = "Test_Report_Viewer.html";

/// Display strings substituted into the HTML viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct CostFigures {
    pub cost: String,
    pub tokens: String,
    pub duration: String,
    pub sessions: String,
}

impl CostFigures {
    pub fn from_state(state: &LedgerState) -> Self {
        let duration_ms = state.total_duration_ms();
        let minutes = duration_ms as f64 / 1000.0 / 60.0;
        let duration = if minutes >= 1.0 {
            format!("~{minutes:.0}min")
        } else {
            format!("~{:.0}s", duration_ms as f64 / 1000.0)
        };

        Self {
            cost: format!("${:.4}", state.summary.total_cost_usd),
            tokens: group_thousands(state.summary.total_tokens),
            duration,
            sessions: state.summary.total_sessions.to_string(),
        }
    }
}

/// `<div class="cost-value">VALUE</div> <div class="cost-label">LABEL</div>`
/// slots whose VALUE looks like a default the template shipped with.
fn labeled_slots() -> &'static [(Regex, Field)] {
    static SLOTS: OnceLock<Vec<(Regex, Field)>> = OnceLock::new();
    SLOTS.get_or_init(|| {
        [
            (r"\$[\d.,]+", "Total Cost", Field::Cost),
            (r"~?[\d,]+K?|N/A", "Total Tokens", Field::Tokens),
            (r"~?[\d.]+(?:min|s)|N/A", "Duration", Field::Duration),
            (r"\d+", "Sessions", Field::Sessions),
        ]
        .into_iter()
        .filter_map(|(value, label, field)| {
            let re = Regex::new(&format!(
                r#"(?is)(<div class="cost-value">)(?:{value})(</div>\s*<div class="cost-label">{label}</div>)"#
            ))
            .ok()?;
            Some((re, field))
        })
        .collect()
    })
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Cost,
    Tokens,
    Duration,
    Sessions,
}

impl CostFigures {
    fn get(&self, field: Field) -> &str {
        match field {
            Field::Cost => &self.cost,
            Field::Tokens => &self.tokens,
            Field::Duration => &self.duration,
            Field::Sessions => &self.sessions,
        }
    }
}

/// Substitute the figures into `html`. Returns `None` if neither a
/// placeholder nor a labeled default slot was found.
pub fn patch_html(html: &str, figures: &CostFigures) -> Option<String> {
    let mut out = html.to_string();
    let mut matched = false;

    let placeholders = [
        ("{{TOTAL_COST}}", Field::Cost),
        ("{{TOTAL_TOKENS}}", Field::Tokens),
        ("{{DURATION}}", Field::Duration),
        ("{{SESSIONS}}", Field::Sessions),
    ];
    for (token, field) in placeholders {
        if out.contains(token) {
            out = out.replace(token, figures.get(field));
            matched = true;
        }
    }

    // Legacy templates carry sample values in labeled slots instead.
    for (re, field) in labeled_slots() {
        if re.is_match(&out) {
            let value = figures.get(*field);
            out = re
                .replace_all(&out, |caps: &Captures| format!("{}{}{}", &caps[1], value, &caps[2]))
                .into_owned();
            matched = true;
        }
    }

    matched.then_some(out)
}

/// Patch the latest `Test_Report_Viewer.html` under `<project>/test-reports`
/// with the figures from `usage_statistics.json`.
///
/// Best effort: every failure is logged and reported as `false`.
pub fn update_html_report(project_dir: &Path) -> bool {
    let stats_file = stats_path(project_dir);
    let state: LedgerState = match storage::read_json(&stats_file) {
        Ok(Some(state)) => state,
        Ok(None) => {
            info!("no {} found, skipping HTML update", stats_file.display());
            return false;
        }
        Err(e) => {
            warn!("failed to read usage statistics: {e:#}");
            return false;
        }
    };

    let Some(report_dir) = latest_report_dir(project_dir) else {
        warn!("no report directories under {}", project_dir.display());
        return false;
    };
    let html_path = report_dir.join(HTML_REPORT_FILENAME);
    let html = match fs::read_to_string(&html_path) {
        Ok(html) => html,
        Err(e) => {
            warn!("HTML report not readable at {}: {e}", html_path.display());
            return false;
        }
    };

    let figures = CostFigures::from_state(&state);
    let Some(patched) = patch_html(&html, &figures) else {
        warn!("no cost placeholders or default values found in HTML report");
        return false;
    };

    if patched != html {
        if let Err(e) = storage::write_atomic(&html_path, patched.as_bytes()) {
            warn!("failed to write updated HTML: {e:#}");
            return false;
        }
    }

    info!(
        "updated HTML report: cost {}, tokens {}, duration {}, sessions {}",
        figures.cost, figures.tokens, figures.duration, figures.sessions
    );
    true
}
