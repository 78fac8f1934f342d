//! Ingest-layer error taxonomy (spec §4.4 "fatal bulk-level error", §4.5).

use thiserror::Error;

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Transform(#[from] entity_search_transform::TransformError),

    #[error("bulk request failed: {0}")]
    Bulk(String),

    #[error("fatal bulk-level error after {failed_samples} sampled failures: {message}")]
    Fatal { message: String, failed_samples: usize },

    #[error("failed to apply bulk-indexing-mode settings to {index}: {message}")]
    SettingsToggle { index: String, message: String },
}

impl IngestError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Transform(_) => "TRANSFORM_ERROR",
            Self::Bulk(_) => "BULK_ERROR",
            Self::Fatal { .. } => "FATAL_BULK_ERROR",
            Self::SettingsToggle { .. } => "SETTINGS_TOGGLE_ERROR",
        }
    }

    /// Transport-level and bulk-level failures are plausibly transient;
    /// a fatal abort after detailed logging is not retried automatically.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Bulk(_))
    }
}
