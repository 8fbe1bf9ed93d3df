use std::process::ExitCode;

use review_lake_core::census::CensusError;
use review_lake_core::RunError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(#[source] CensusError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] RunError),

    #[error("census failed: {0}")]
    Census(#[from] CensusError),

    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::FAILURE
    }

    /// Where an aborted migration can be resumed from, if anywhere.
    pub fn resume_cursor(&self) -> Option<&str> {
        match self {
            CliError::Migration(err) => err.resume_cursor.as_deref(),
            _ => None,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
