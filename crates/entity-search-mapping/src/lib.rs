//! Index bucket topology and mapping synthesis (spec §4.1/§4.3).
//!
//! Pure, deterministic functions over a [`entity_search_core::model::SchemaRegistry`]:
//! no network calls, no backend client. Grounded on
//! `examples/original_source/openaleph_search/{mapping.py,index/indexes.py,index/util.py}`
//! and `mcp-agent-mail-search-core/src/{tantivy_schema.rs,index_layout.rs}`.

pub mod mapping;
pub mod topology;

pub use mapping::{
    all_buckets_mappings, analysis_settings, build_bucket_mapping, index_settings,
    rewrite_mapping_safe, schema_field_names, settings_changed, source_excludes, xref_mapping,
    xref_source_excludes, DATE_FORMAT,
};
pub use topology::{
    bucket_index, describe_index, entities_read_indexes, entities_write_index, schema_bucket,
    schema_index, schema_scope, xref_index, Bucket, IndexDescription,
};
