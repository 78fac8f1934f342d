use entity_search_core::error::CoreError;
use thiserror::Error;

pub type TransformResult<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("cannot transform abstract schema: {0}")]
    AbstractSchema(String),

    #[error("invalid dataset name: {0:?}")]
    InvalidDataset(String),
}

impl TransformError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Core(_) => "CORE_ERROR",
            Self::AbstractSchema(_) => "ABSTRACT_SCHEMA",
            Self::InvalidDataset(_) => "INVALID_DATASET",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}
