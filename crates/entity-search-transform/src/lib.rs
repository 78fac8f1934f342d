//! Entity-to-document denormalization (spec §4.2 `EntityTransformer`).
//!
//! Turns a single `(dataset, Entity)` pair into the backend-shaped bulk
//! action the Ingester consumes. Grounded on
//! `examples/original_source/openaleph_search/transform/entity.py`
//! (`format_entity`) and `transform/util.py` (`get_geopoints`), generalized
//! to Rust's ownership model and the `entity-search-core` model types.

pub mod error;
pub mod transformer;

pub use error::{TransformError, TransformResult};
pub use transformer::{transform_entity, IndexAction, TransformerConfig};
