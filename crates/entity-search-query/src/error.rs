//! Query-layer error taxonomy (spec §4.6/§4.7).

use thiserror::Error;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Core(#[from] entity_search_core::error::CoreError),

    #[error("offset+limit {0} exceeds the maximum page {1}")]
    PageTooDeep(u64, u64),

    #[error("invalid range operator {0:?} for filter:{1}")]
    InvalidRangeOperator(String, String),

    #[error("invalid numeric value {0:?} for parameter {1}")]
    InvalidNumber(String, &'static str),

    #[error("authorization context is mandatory but was not provided")]
    AuthRequired,

    #[error("geo distance query requires an entity with latitude and longitude")]
    MissingGeoPoint,
}

impl QueryError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Core(_) => "CORE_ERROR",
            Self::PageTooDeep(..) => "PAGE_TOO_DEEP",
            Self::InvalidRangeOperator(..) => "INVALID_RANGE_OPERATOR",
            Self::InvalidNumber(..) => "INVALID_NUMBER",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::MissingGeoPoint => "MISSING_GEO_POINT",
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}
