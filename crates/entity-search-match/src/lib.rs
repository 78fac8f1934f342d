//! Entity-matching blocking/scoring query construction and cross-reference
//! match storage (spec §4.8 `Matcher`, §4.9 `XrefStore`).
//!
//! Builds on `entity-search-query`'s [`entity_search_query::QueryClass`] for
//! the search half and `entity-search-ingest`'s bulk/scan primitives for the
//! storage half — this crate contains no HTTP wiring of its own beyond the
//! xref index's `delete_by_query` calls.

pub mod error;
pub mod matcher;
pub mod xref;

pub use error::{MatchError, MatchResult};
pub use matcher::{blocking_query, build_geo_distance_class, build_match_class};
pub use xref::{delete_dataset, delete_entity, iter_matches, iter_matches_query, write_matches, xref_id, XrefRecord, random_tiebreaker};
