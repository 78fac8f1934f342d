//! CLI-layer error taxonomy: every subcommand funnels its failures through
//! one enum so `main` can map them to the spec §6 exit-code contract
//! (0 success, 1 any ingest/delete error tally > 0, and any other failure
//! here is the CLI-framing equivalent of a tallied error).

use thiserror::Error;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] entity_search_core::error::CoreError),

    #[error(transparent)]
    Client(#[from] entity_search_client::ClientError),

    #[error(transparent)]
    Transform(#[from] entity_search_transform::TransformError),

    #[error(transparent)]
    Ingest(#[from] entity_search_ingest::IngestError),

    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("failed to read input entities from {0}: {1}")]
    Input(String, String),

    #[error("invalid entity JSON on line {line}: {message}")]
    InvalidEntityJson { line: usize, message: String },
}
