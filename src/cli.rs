use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_TABLE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/urinary_cpt.csv");

/// Sampling temperatures above this break the labelled reply format.
pub const MAX_TEMPERATURE: f32 = 0.3;

#[derive(Parser, Debug)]
#[command(name = "cpt-advisor")]
#[command(about = "Two-stage CPT code advisor for urinary-system procedures", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Analyze one scenario and print the result as JSON.
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct TableArgs {
    /// CSV reference table of codes and descriptions.
    #[arg(long = "table", env = "CPT_TABLE_PATH", default_value = DEFAULT_TABLE_PATH)]
    pub table_path: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct OracleArgs {
    /// Base URL of an OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Per-request transport timeout.
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Model used by the suggestion stage.
    #[arg(long, default_value = "gpt-3.5-turbo")]
    pub suggest_model: String,

    #[arg(long, default_value_t = 500)]
    pub suggest_max_tokens: u32,

    /// Model used by the validation stage.
    #[arg(long, default_value = "gpt-4o")]
    pub validate_model: String,

    #[arg(long, default_value_t = 800)]
    pub validate_max_tokens: u32,

    /// Sampling temperature for both stages (at most 0.3).
    #[arg(long, default_value_t = 0.1)]
    pub temperature: f32,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub table: TableArgs,

    #[command(flatten)]
    pub oracle: OracleArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub table: TableArgs,

    #[command(flatten)]
    pub oracle: OracleArgs,

    /// Scenario text.
    #[arg(long, conflicts_with = "scenario_file")]
    pub scenario: Option<String>,

    /// Read the scenario from a file instead.
    #[arg(long)]
    pub scenario_file: Option<PathBuf>,
}
