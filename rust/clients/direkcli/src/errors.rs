use direktiv_api::types::CommandError;
use nats_utils::types::TransportError;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Failed to read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Connection check failed: {0}")]
    Connection(String),

    #[error("Output failed: {0}")]
    Output(String),
}

impl CliError {
    pub fn read_file(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        Self::Command(err.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(format!("JSON serialization failed: {err}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Writes `err` for the user, independently of the log level.
pub fn report<W: Write>(writer: &mut W, err: &CliError) {
    let _ = writeln!(writer, "Error: {err}");
}
