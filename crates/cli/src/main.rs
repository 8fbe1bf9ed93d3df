mod cli;
mod commands;
mod config;
mod error;
mod state;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Prepared};
use crate::config::{AppConfig, LogFormat};
use crate::error::{CliError, CliResult};
use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version come through here too
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(cursor) = err.resume_cursor() {
                eprintln!("resume with: review-lake migrate --commit --startAfter {cursor}");
            }
            err.exit_code()
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let prepared = cli.command.prepare().map_err(CliError::InvalidArgs)?;

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    if let Err(err) = init_tracing(&config) {
        eprintln!("warning: {err:#}");
    }

    let state = AppState::connect(config).await?;
    tracing::info!(
        dataset_id = %state.config().dataset_id,
        doc_type = %state.config().doc_type,
        "database connection pool established"
    );
    match prepared {
        Prepared::Migrate(driver_config) => {
            commands::migrate::run(state.store(), driver_config).await?;
        }
        Prepared::Census { config, json } => {
            commands::census::run(state.store(), &config, json).await?;
        }
    }
    Ok(())
}

/// Logs go to stderr so census output on stdout stays machine readable.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid LOG_LEVEL {:?}", config.log_level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|err| anyhow::anyhow!(err))
    .context("failed to install tracing subscriber")
}
