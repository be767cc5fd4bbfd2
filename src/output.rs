use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};

use crate::ledger::UsageLedger;
use crate::pricing::ResolvedRates;
use crate::types::{SessionRecord, UsageSummary};

/// 1234567 -> "1,234,567"
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_cost(cost: f64) -> String {
    format!("${:.4}", cost)
}

fn format_seconds(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Token/cost breakdown for a single session.
fn session_breakdown_table(record: &SessionRecord) -> Table {
    let t = &record.tokens.counts;
    let c = &record.costs;

    let mut table = new_table();
    table.set_header(vec!["Token Type", "Tokens", "Cost"]);
    let rows = [
        ("Input", t.input_tokens, c.input_cost),
        ("Output", t.output_tokens, c.output_cost),
        ("Cache Write", t.cache_creation_tokens, c.cache_creation_cost),
        ("Cache Read", t.cache_read_tokens, c.cache_read_cost),
        ("Total", record.tokens.total_tokens, c.total_cost),
    ];
    for (label, tokens, cost) in rows {
        table.add_row(vec![
            Cell::new(label),
            right(group_thousands(tokens)),
            right(format_cost(cost)),
        ]);
    }
    table
}

fn project_totals(summary: &UsageSummary) -> String {
    let avg = if summary.total_sessions > 0 {
        summary.total_cost_usd / summary.total_sessions as f64
    } else {
        0.0
    };
    format!(
        "Project totals: {} sessions, {} tokens, {} (avg {}/session)",
        summary.total_sessions,
        group_thousands(summary.total_tokens),
        format_cost(summary.total_cost_usd),
        format_cost(avg)
    )
}

/// Statistics block shown right after a session is recorded.
pub fn print_session_stats(record: &SessionRecord, summary: &UsageSummary) {
    println!(
        "Session {} ({}) on {}: {}, {} turns",
        record.session_id,
        record.session_type,
        record.model,
        format_seconds(record.duration_ms),
        record.num_turns
    );
    println!("{}", session_breakdown_table(record));
    println!("{}", project_totals(summary));
}

/// Full ledger view: summary, per-session table, latest session breakdown.
pub fn print_ledger(ledger: &UsageLedger) {
    let summary = ledger.get_summary();
    let sessions = ledger.get_session_history();

    println!("Project:    {}", ledger.project_dir().display());
    println!("Statistics: {}", ledger.stats_file().display());
    println!("Updated:    {}", summary.last_updated.to_rfc3339());

    let mut totals = new_table();
    totals.set_header(vec!["Metric", "Value"]);
    totals.add_row(vec![
        Cell::new("Total Sessions"),
        right(summary.total_sessions.to_string()),
    ]);
    for (label, value) in [
        ("Total Tokens", summary.total_tokens),
        ("  Input", summary.total_input_tokens),
        ("  Output", summary.total_output_tokens),
        ("  Cache Creation", summary.total_cache_creation_tokens),
        ("  Cache Read", summary.total_cache_read_tokens),
    ] {
        totals.add_row(vec![Cell::new(label), right(group_thousands(value))]);
    }
    totals.add_row(vec![
        Cell::new("Total Cost (USD)"),
        right(format_cost(summary.total_cost_usd)),
    ]);
    totals.add_row(vec![
        Cell::new("Avg Cost/Session"),
        right(format_cost(ledger.average_cost_per_session())),
    ]);
    println!("{totals}");

    let mut table = new_table();
    table.set_header(vec!["#", "Type", "Model", "Duration", "Tokens", "Cost"]);
    for (i, s) in sessions.iter().enumerate() {
        table.add_row(vec![
            right((i + 1).to_string()),
            Cell::new(&s.session_type),
            Cell::new(&s.model),
            right(format_seconds(s.duration_ms)),
            right(group_thousands(s.tokens.total_tokens)),
            right(format_cost(s.costs.total_cost)),
        ]);
    }
    println!("{table}");

    if let Some(latest) = sessions.last() {
        println!(
            "Latest session {} ({}) at {}: {}, {} turns",
            latest.session_id,
            latest.session_type,
            latest.timestamp.to_rfc3339(),
            format_seconds(latest.duration_ms),
            latest.num_turns
        );
        println!("{}", session_breakdown_table(latest));
    }
}

pub fn print_rates(model: &str, resolved: &ResolvedRates) {
    let r = &resolved.rates;
    let mut table = new_table();
    table.set_header(vec!["Category", "USD / 1M tokens"]);
    for (label, rate) in [
        ("Input", r.input_rate),
        ("Output", r.output_rate),
        ("Cache Write", r.cache_write_rate),
        ("Cache Read", r.cache_read_rate),
    ] {
        table.add_row(vec![Cell::new(label), right(format!("{rate:.4}"))]);
    }
    println!(
        "{model} -> {} (from {})",
        resolved.matched_key, resolved.tier
    );
    println!("{table}");
}
