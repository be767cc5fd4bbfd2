use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "e2e-cost",
    about = "Token usage and cost ledger for autonomous test agent sessions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Use cached or built-in pricing only, don't fetch
    #[arg(long, global = true)]
    pub offline: bool,

    /// Directory for the pricing cache (overrides config)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Log lookups and cache decisions
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show usage statistics for a project
    Show {
        project_dir: PathBuf,
        /// Also write cost_statistics.md
        #[arg(long)]
        generate_report: bool,
    },
    /// Record one completed agent session
    Record(RecordArgs),
    /// Write the cost report and patch the HTML report viewer
    Report { project_dir: PathBuf },
    /// Show the rates a model resolves to
    Rates { model: String },
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    pub project_dir: PathBuf,

    /// Session id (taken from --result-json when omitted)
    #[arg(long)]
    pub session_id: Option<String>,

    /// Free-form session tag, e.g. test_planner / test_executor
    #[arg(long)]
    pub session_type: String,

    /// Model id (taken from --result-json when omitted)
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub duration_ms: u64,

    #[arg(long, default_value_t = 0)]
    pub num_turns: u64,

    #[arg(long, default_value_t = 0, conflicts_with = "result_json")]
    pub input_tokens: u64,

    #[arg(long, default_value_t = 0, conflicts_with = "result_json")]
    pub output_tokens: u64,

    #[arg(long, default_value_t = 0, conflicts_with = "result_json")]
    pub cache_creation_tokens: u64,

    #[arg(long, default_value_t = 0, conflicts_with = "result_json")]
    pub cache_read_tokens: u64,

    /// Agent runtime result message (JSON with session_id, duration_ms,
    /// num_turns and usage)
    #[arg(long)]
    pub result_json: Option<PathBuf>,
}
