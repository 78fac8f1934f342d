//! Shared error taxonomy for the entity search subsystem.
//!
//! Follows the teacher's `error_type()` / `is_retryable()` convention so
//! downstream crates can classify failures uniformly (bounded-sample logging,
//! retry policy dispatch) without matching on error variants directly.

use thiserror::Error;

/// Result type alias used throughout `entity-search-core`.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by the schema/entity model, configuration, and name-analysis
/// layers. Downstream crates (`entity-search-client`, `-ingest`, `-query`, ...)
/// define their own error enums and wrap this one via `#[from]`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A schema name was not found in the registry.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// An operation required a concrete (non-abstract) schema.
    #[error("schema is abstract: {0}")]
    AbstractSchema(String),

    /// A dataset name failed validation (empty, or the reserved literal `default`).
    #[error("invalid dataset name: {0:?}")]
    InvalidDataset(String),

    /// A property name was not declared on the schema it was looked up against.
    #[error("unknown property {property} on schema {schema}")]
    UnknownProperty { schema: String, property: String },

    /// Configuration was missing or failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation — should not occur in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable classification, used in logs and CLI exit
    /// diagnostics.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownSchema(_) => "UNKNOWN_SCHEMA",
            Self::AbstractSchema(_) => "ABSTRACT_SCHEMA",
            Self::InvalidDataset(_) => "INVALID_DATASET",
            Self::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same call with the same inputs could plausibly
    /// succeed. Every variant here is a validation/configuration failure, so
    /// none are retryable — kept for symmetry with the transport-facing error
    /// enums that do have retryable variants.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_type_mapping_is_stable() {
        assert_eq!(
            CoreError::UnknownSchema("Foo".into()).error_type(),
            "UNKNOWN_SCHEMA"
        );
        assert_eq!(
            CoreError::AbstractSchema("Thing".into()).error_type(),
            "ABSTRACT_SCHEMA"
        );
        assert!(!CoreError::Internal("x".into()).is_retryable());
    }
}
