mod cli;
mod codes;
mod oracle;
mod pipeline;
mod prompts;
mod reply;
mod server;
mod stage;
mod suggest;
mod table;
mod validate;

use anyhow::{Context, bail};
use clap::Parser;

use crate::cli::AnalyzeArgs;
use crate::pipeline::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal; configuration can come from the real environment.
    let dotenv = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(err) = dotenv_problem(dotenv) {
        tracing::warn!(error = %err, "ignoring unreadable .env file");
    }

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Analyze(cmd) => analyze(cmd).await.context("analyze failed"),
    }
}

async fn analyze(cmd: AnalyzeArgs) -> anyhow::Result<()> {
    let scenario = match (&cmd.scenario, &cmd.scenario_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read scenario from {}", path.display()))?,
        (None, None) => bail!("pass --scenario or --scenario-file"),
    };

    let pipeline = Pipeline::from_args(&cmd.table, &cmd.oracle)?;
    let analysis = pipeline.analyze(&scenario).await?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

/// Errors worth reporting from loading `.env`; an absent file is not one.
fn dotenv_problem<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match result {
        Err(err) if !err.not_found() => Some(err),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_env_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let result = dotenvy::from_path(dir.path().join(".env"));
        assert!(dotenv_problem(result).is_none());
    }

    #[test]
    fn malformed_env_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CPT_ADVISOR_TEST_KEY='unterminated").unwrap();
        let result = dotenvy::from_path(file.path());
        assert!(dotenv_problem(result).is_some());
    }
}
