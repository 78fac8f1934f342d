//! `entity-search-match` error taxonomy (spec §4.8/§4.9).

use thiserror::Error;

pub type MatchResult<T> = std::result::Result<T, MatchError>;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Core(#[from] entity_search_core::error::CoreError),

    #[error(transparent)]
    Query(#[from] entity_search_query::QueryError),

    #[error(transparent)]
    Ingest(#[from] entity_search_ingest::IngestError),

    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("xref deletion requires a dataset or an entity id")]
    EmptyDeleteSelector,
}

impl MatchError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Core(_) => "CORE_ERROR",
            Self::Query(_) => "QUERY_ERROR",
            Self::Ingest(_) => "INGEST_ERROR",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::EmptyDeleteSelector => "EMPTY_DELETE_SELECTOR",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}
