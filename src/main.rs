mod cli;
mod config;
mod cost;
mod html;
mod ledger;
mod output;
mod pricing;
mod report;
mod session;
mod storage;
mod types;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, RecordArgs};
use config::PricingSettings;
use ledger::UsageLedger;
use pricing::PricingSource;
use report::CostReport;
use session::SessionResult;
use types::TokenCounts;

fn init_logging(verbose: bool) {
    let default = if verbose { "e2e_cost=debug" } else { "e2e_cost=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn pricing_settings(cli: &Cli) -> PricingSettings {
    let mut settings = PricingSettings::resolve(config::load_config());
    if let Some(ref dir) = cli.cache_dir {
        settings.cache_dir = dir.clone();
    }
    settings.offline = cli.offline;
    settings
}

fn open_ledger(project_dir: &Path, settings: PricingSettings) -> Result<UsageLedger> {
    if !project_dir.is_dir() {
        bail!("Project directory not found: {}", project_dir.display());
    }
    let pricing = PricingSource::from_settings(settings)?;
    Ok(UsageLedger::open(project_dir, pricing))
}

fn generate_report(ledger: &UsageLedger) -> Result<()> {
    let markdown = CostReport::from_ledger(ledger).generate_markdown_report();
    let path = report::write_cost_report(ledger.project_dir(), &markdown)?;
    println!("Cost report saved to {}", path.display());
    Ok(())
}

fn record(args: RecordArgs, settings: PricingSettings) -> Result<()> {
    let result = match args.result_json {
        Some(ref path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(SessionResult::from_json(&data)?)
        }
        None => None,
    };

    let session_id = args
        .session_id
        .or_else(|| result.as_ref().map(|r| r.session_id.clone()))
        .context("--session-id is required without --result-json")?;
    let model = args
        .model
        .or_else(|| result.as_ref().and_then(|r| r.model.clone()))
        .context("--model is required when the result carries no model")?;

    let (tokens, duration_ms, num_turns) = match result {
        Some(r) => (
            r.tokens,
            if args.duration_ms > 0 { args.duration_ms } else { r.duration_ms },
            if args.num_turns > 0 { args.num_turns } else { r.num_turns },
        ),
        None => (
            TokenCounts {
                input_tokens: args.input_tokens,
                output_tokens: args.output_tokens,
                cache_creation_tokens: args.cache_creation_tokens,
                cache_read_tokens: args.cache_read_tokens,
            },
            args.duration_ms,
            args.num_turns,
        ),
    };

    let mut ledger = open_ledger(&args.project_dir, settings)?;
    let record = ledger.record_session(
        &session_id,
        &args.session_type,
        &model,
        duration_ms,
        num_turns,
        tokens,
    )?;
    output::print_session_stats(&record, ledger.get_summary());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = pricing_settings(&cli);

    match cli.command {
        Command::Show {
            ref project_dir,
            generate_report: write_report,
        } => {
            let ledger = open_ledger(project_dir, settings)?;
            if ledger.get_session_history().is_empty() {
                println!("No sessions recorded yet.");
                return Ok(());
            }
            output::print_ledger(&ledger);
            if write_report {
                generate_report(&ledger)?;
            }
        }
        Command::Record(args) => record(args, settings)?,
        Command::Report { ref project_dir } => {
            let ledger = open_ledger(project_dir, settings)?;
            if let Err(e) = generate_report(&ledger) {
                warn!("failed to generate cost report: {e:#}");
            }
            if html::update_html_report(project_dir) {
                info!("HTML report updated");
            } else {
                warn!("HTML report was not updated");
            }
        }
        Command::Rates { ref model } => {
            let mut pricing = PricingSource::from_settings(settings)?;
            let resolved = pricing.resolve(model);
            output::print_rates(model, &resolved);
        }
    }

    Ok(())
}
