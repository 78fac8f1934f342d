//! Index bucket topology: which of the four buckets a schema belongs to,
//! and how bucket/version pairs turn into concrete index names (spec §4.1/§4.4).
//!
//! Grounded on `mcp-agent-mail-search-core/src/index_layout.rs` (`IndexScope`,
//! versioned index naming, checkpoint plumbing) and
//! `original_source/index/indexes.py` (`schema_bucket`, `bucket_index`,
//! `schema_index`, `entities_read_index`/`entities_write_index`), which this
//! module follows field-for-field.

use std::collections::BTreeSet;

use entity_search_core::error::{CoreError, CoreResult};
use entity_search_core::model::SchemaRegistry;

/// The four entity index buckets (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Things,
    Intervals,
    Documents,
    Pages,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Self::Things, Self::Intervals, Self::Documents, Self::Pages];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Things => "things",
            Self::Intervals => "intervals",
            Self::Documents => "documents",
            Self::Pages => "pages",
        }
    }
}

/// Classifies a schema into its bucket (spec §4.1 invariant): `Page`/`Pages`
/// go to `pages`; anything `is_a(Document)` (other than `Page`/`Pages`
/// themselves, already handled above) goes to `documents`; anything
/// `is_a(Interval)` goes to `intervals`; everything else — including the
/// catch-all `is_a(Thing)` case — goes to `things`.
///
/// Order matters: `Pages`/`Page` are checked before `Document` since both
/// schemata also satisfy `is_a(Document)`.
pub fn schema_bucket(registry: &SchemaRegistry, schema: &str) -> CoreResult<Bucket> {
    let s = registry.require(schema)?;
    if s.abstract_ {
        return Err(CoreError::AbstractSchema(schema.to_string()));
    }
    if schema == "Page" || schema == "Pages" {
        return Ok(Bucket::Pages);
    }
    if registry.is_a(schema, "Document") {
        return Ok(Bucket::Documents);
    }
    if registry.is_a(schema, "Interval") {
        return Ok(Bucket::Intervals);
    }
    Ok(Bucket::Things)
}

/// Index naming: `{prefix}-entity-{bucket}-{version}`, mirroring
/// `index_name()` / `bucket_index()`.
#[must_use]
pub fn bucket_index(prefix: &str, bucket: Bucket, version: &str) -> String {
    format!("{prefix}-entity-{}-{version}", bucket.as_str())
}

/// Index name for a concrete schema at a given version. Returns
/// [`CoreError::AbstractSchema`] for abstract schemata, matching
/// `schema_index()`'s `InvalidData` raise in the original.
pub fn schema_index(
    registry: &SchemaRegistry,
    prefix: &str,
    schema: &str,
    version: &str,
) -> CoreResult<String> {
    let bucket = schema_bucket(registry, schema)?;
    Ok(bucket_index(prefix, bucket, version))
}

/// Expands a schema selector (or `None` for "all schemata") to the set of
/// concrete (non-abstract) schema names in scope, optionally including
/// descendants — mirrors `schema_scope()`.
#[must_use]
pub fn schema_scope(
    registry: &SchemaRegistry,
    schema: Option<&str>,
    expand: bool,
) -> BTreeSet<String> {
    let mut scope = BTreeSet::new();
    let roots: Vec<String> = match schema {
        Some(name) => vec![name.to_string()],
        None => registry.names_all(),
    };
    for root in roots {
        scope.insert(root.clone());
        if expand {
            scope.extend(registry.descendants(&root));
        }
    }
    scope
        .into_iter()
        .filter(|name| registry.get(name).is_some_and(|s| !s.abstract_))
        .collect()
}

/// Combined read index list for a schema selector across every configured
/// read version — mirrors `entities_index_list()` / `entities_read_index()`.
pub fn entities_read_indexes(
    registry: &SchemaRegistry,
    prefix: &str,
    schema: Option<&str>,
    expand: bool,
    read_versions: &[String],
) -> CoreResult<Vec<String>> {
    let mut indexes = BTreeSet::new();
    for name in schema_scope(registry, schema, expand) {
        for version in read_versions {
            indexes.insert(schema_index(registry, prefix, &name, version)?);
        }
    }
    Ok(indexes.into_iter().collect())
}

/// The single currently-written index for a schema — mirrors
/// `entities_write_index()`.
pub fn entities_write_index(
    registry: &SchemaRegistry,
    prefix: &str,
    schema: &str,
    write_version: &str,
) -> CoreResult<String> {
    schema_index(registry, prefix, schema, write_version)
}

/// Name of the standalone cross-reference match index, mirroring
/// `original_source/index/xref.py::xref_index()` (`index_name("xref", "v1")`).
/// Unlike the bucket indexes this is not schema-scoped and carries a fixed
/// version, since xref records are keyed by entity pair rather than schema.
#[must_use]
pub fn xref_index(prefix: &str) -> String {
    format!("{prefix}-xref-v1")
}

/// Administrative introspection for a single schema (spec SPEC_FULL.md §2,
/// grounded on `original_source/index/debug.py`): the resolved bucket,
/// write index, and full read-index list, for CLI/test use.
#[derive(Debug, Clone)]
pub struct IndexDescription {
    pub schema: String,
    pub bucket: Bucket,
    pub write_index: String,
    pub read_indexes: Vec<String>,
}

/// Describes how a schema resolves to buckets and index names under the
/// given prefix/version configuration.
pub fn describe_index(
    registry: &SchemaRegistry,
    prefix: &str,
    schema: &str,
    write_version: &str,
    read_versions: &[String],
) -> CoreResult<IndexDescription> {
    let bucket = schema_bucket(registry, schema)?;
    let write_index = entities_write_index(registry, prefix, schema, write_version)?;
    let read_indexes = entities_read_indexes(registry, prefix, Some(schema), false, read_versions)?;
    Ok(IndexDescription { schema: schema.to_string(), bucket, write_index, read_indexes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_pages_land_in_pages_bucket() {
        let reg = SchemaRegistry::bundled();
        assert_eq!(schema_bucket(&reg, "Page").unwrap(), Bucket::Pages);
        assert_eq!(schema_bucket(&reg, "Pages").unwrap(), Bucket::Pages);
    }

    #[test]
    fn document_subtype_other_than_page_lands_in_documents() {
        let mut reg = SchemaRegistry::bundled();
        reg.insert(entity_search_core::model::Schema {
            name: "Email".into(),
            abstract_: false,
            extends: vec!["Document".into()],
            matchable: false,
            caption: vec!["title".into()],
            properties: Default::default(),
        });
        assert_eq!(schema_bucket(&reg, "Email").unwrap(), Bucket::Documents);
    }

    #[test]
    fn event_lands_in_intervals() {
        let reg = SchemaRegistry::bundled();
        assert_eq!(schema_bucket(&reg, "Event").unwrap(), Bucket::Intervals);
    }

    #[test]
    fn person_lands_in_things_catch_all() {
        let reg = SchemaRegistry::bundled();
        assert_eq!(schema_bucket(&reg, "Person").unwrap(), Bucket::Things);
    }

    #[test]
    fn abstract_schema_is_rejected() {
        let reg = SchemaRegistry::bundled();
        assert!(matches!(
            schema_bucket(&reg, "Thing"),
            Err(CoreError::AbstractSchema(_))
        ));
    }

    #[test]
    fn bucket_index_naming_matches_prefix_entity_bucket_version() {
        assert_eq!(
            bucket_index("acme", Bucket::Things, "v1"),
            "acme-entity-things-v1"
        );
    }

    #[test]
    fn xref_index_naming_is_prefix_scoped_and_version_pinned() {
        assert_eq!(xref_index("acme"), "acme-xref-v1");
    }

    #[test]
    fn schema_scope_excludes_abstract_schemata() {
        let reg = SchemaRegistry::bundled();
        let scope = schema_scope(&reg, Some("LegalEntity"), true);
        assert!(scope.contains("Person"));
        assert!(scope.contains("Company"));
        assert!(!scope.contains("LegalEntity"));
    }

    #[test]
    fn describe_index_reports_bucket_and_indexes() {
        let reg = SchemaRegistry::bundled();
        let versions = vec!["v1".to_string()];
        let desc = describe_index(&reg, "acme", "Person", "v1", &versions).unwrap();
        assert_eq!(desc.bucket, Bucket::Things);
        assert_eq!(desc.write_index, "acme-entity-things-v1");
        assert_eq!(desc.read_indexes, vec!["acme-entity-things-v1".to_string()]);
    }
}
