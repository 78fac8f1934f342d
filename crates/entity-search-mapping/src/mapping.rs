//! Mapping synthesis: turns a schema bucket's properties into a backend
//! mapping document, with group-field `copy_to` fan-out and a merge-safe
//! reconciliation pass for existing live indexes (spec §4.1/§4.4).
//!
//! Grounded on `mcp-agent-mail-search-core/src/tantivy_schema.rs` (field
//! builder shape) and, for exact field names/types/merge semantics,
//! `original_source/mapping.py` and `original_source/index/util.py`'s
//! `rewrite_mapping_safe`/`check_settings_changed`.

use std::collections::BTreeSet;

use entity_search_core::model::{PropertyType, SchemaRegistry};
use serde_json::{json, Value};

use crate::topology::{schema_bucket, Bucket};

/// ElasticSearch-ish date format string accepting full timestamps down to
/// bare years, matching `original_source/mapping.py::DATE_FORMAT`.
pub const DATE_FORMAT: &str =
    "yyyy-MM-dd'T'HH:mm:ss||yyyy-MM-dd'T'HH:mm||yyyy-MM-dd||yyyy-MM||yyyy";

/// Fields excluded from the default `_source` response: every group field,
/// plus the derived full-text/name-analysis fields (spec §4.1).
#[must_use]
pub fn source_excludes() -> Vec<&'static str> {
    let mut excludes: Vec<&'static str> = PropertyType::Entity
        .group_field()
        .into_iter()
        .chain([
            PropertyType::Language.group_field().unwrap(),
            PropertyType::Country.group_field().unwrap(),
            PropertyType::Checksum.group_field().unwrap(),
            PropertyType::Ip.group_field().unwrap(),
            PropertyType::Url.group_field().unwrap(),
            PropertyType::Email.group_field().unwrap(),
            PropertyType::Phone.group_field().unwrap(),
            PropertyType::Mimetype.group_field().unwrap(),
            PropertyType::Identifier.group_field().unwrap(),
            PropertyType::Date.group_field().unwrap(),
            PropertyType::Address.group_field().unwrap(),
            PropertyType::Name.group_field().unwrap(),
        ])
        .collect();
    excludes.extend(["text", "names", "name_keys", "name_parts", "name_symbols", "name_phonetic"]);
    excludes
}

fn field_type_for(type_: PropertyType) -> Value {
    match type_ {
        PropertyType::Html => {
            json!({"type": "text", "analyzer": "strip-html", "index": false})
        }
        PropertyType::Text | PropertyType::Json => {
            json!({"type": "text", "index": false})
        }
        PropertyType::Date => json!({"type": "date", "format": DATE_FORMAT}),
        _ => json!({"type": "keyword"}),
    }
}

/// Base (non-schema-specific) field mapping shared by every bucket, mirroring
/// `original_source/mapping.py::PROPERTIES`.
fn base_properties() -> Value {
    json!({
        "dataset": {"type": "keyword"},
        "schema": {"type": "keyword"},
        "schemata": {"type": "keyword"},
        "caption": {"type": "keyword", "copy_to": "name"},
        "name": {"type": "keyword"},
        "names": {"type": "keyword", "copy_to": "text", "similarity": "weak_length_norm"},
        "name_keys": {"type": "keyword"},
        "name_parts": {"type": "keyword", "copy_to": "text"},
        "name_symbols": {"type": "keyword"},
        "name_phonetic": {"type": "keyword"},
        "geo_point": {"type": "geo_point"},
        "text": {"type": "text", "analyzer": "default", "search_analyzer": "default", "index_phrases": true},
        "updated_at": {"type": "date"},
        "created_at": {"type": "date"},
        "role_id": {"type": "keyword"},
        "profile_id": {"type": "keyword"},
        "origin": {"type": "keyword"},
        "entities": {"type": "keyword"},
        "languages": {"type": "keyword"},
        "countries": {"type": "keyword"},
        "checksums": {"type": "keyword"},
        "ips": {"type": "keyword"},
        "urls": {"type": "keyword"},
        "emails": {"type": "keyword"},
        "phones": {"type": "keyword"},
        "mimetypes": {"type": "keyword"},
        "identifiers": {"type": "keyword"},
        "dates": {"type": "date", "format": DATE_FORMAT},
        "addresses": {"type": "keyword"},
        "num_values": {"type": "integer"},
        "index_version": {"type": "keyword", "index": false},
        "indexed_at": {"type": "date", "index": false},
    })
}

/// Merges two property field mappings declared under the same name by
/// different schemas in the same bucket: `copy_to` targets are unioned, and
/// the type falls back to `keyword` if the two declarations disagree (spec
/// §4.1).
fn merge_property_field(existing: &Value, incoming: &Value) -> Value {
    let existing_type = existing.get("type").and_then(Value::as_str);
    let incoming_type = incoming.get("type").and_then(Value::as_str);
    let ty = if existing_type == incoming_type {
        existing_type.unwrap_or("keyword").to_string()
    } else {
        "keyword".to_string()
    };

    let mut copy_to: BTreeSet<String> = BTreeSet::new();
    for field in [existing, incoming] {
        if let Some(targets) = field.get("copy_to").and_then(Value::as_array) {
            for t in targets {
                if let Some(s) = t.as_str() {
                    copy_to.insert(s.to_string());
                }
            }
        }
    }

    let mut merged = serde_json::Map::new();
    merged.insert("type".to_string(), json!(ty));
    if !copy_to.is_empty() {
        merged.insert("copy_to".to_string(), json!(copy_to.into_iter().collect::<Vec<_>>()));
    }
    if ty == "keyword" {
        if let Some(true) = existing.get("stored").and_then(Value::as_bool) {
            merged.insert("stored".to_string(), json!(true));
        }
    }
    Value::Object(merged)
}

/// Builds the full mapping document for a bucket: every property declared
/// by a schema that classifies into `bucket` becomes a `properties.<name>`
/// field with `copy_to: ["text"]`, plus a `numeric.<name>` double field for
/// every `number`/`date`-typed property across the whole registry.
///
/// `content` additionally gets `stored: true` in the `pages` bucket (spec §4.1,
/// see DESIGN.md Open Question 1 for why it stays in `_source`).
#[must_use]
pub fn build_bucket_mapping(registry: &SchemaRegistry, bucket: Bucket) -> Value {
    let mut schema_props = serde_json::Map::new();
    let mut numeric_props = serde_json::Map::new();

    for name in registry.names_all() {
        let Some(schema) = registry.get(&name) else {
            continue;
        };
        if schema.abstract_ {
            continue;
        }
        if schema_bucket(registry, &name).ok() != Some(bucket) {
            continue;
        }
        let is_caption = |prop_name: &str| schema.caption.iter().any(|c| c == prop_name);
        for prop in registry.effective_properties(&name).values() {
            let mut field = field_type_for(prop.type_);
            if let Value::Object(ref mut obj) = field {
                let mut copy_to = vec!["text".to_string()];
                if is_caption(&prop.name) {
                    copy_to.push("name".to_string());
                }
                obj.insert("copy_to".to_string(), json!(copy_to));
            }
            if bucket == Bucket::Pages && prop.name == "content" {
                if let Value::Object(ref mut obj) = field {
                    obj.insert("stored".to_string(), json!(true));
                    obj.insert("analyzer".to_string(), json!("strip-html"));
                }
            }

            // Union `copy_to` targets and fall back to `keyword` on a type
            // disagreement when another schema in this bucket already
            // declared a property of the same name (spec §4.1: "the union
            // of copy_to targets is taken and the type resolves to keyword
            // if any disagreement").
            match schema_props.get(&prop.name).cloned() {
                Some(existing) => {
                    let merged = merge_property_field(&existing, &field);
                    schema_props.insert(prop.name.clone(), merged);
                }
                None => {
                    schema_props.insert(prop.name.clone(), field);
                }
            }

            if prop.type_.is_numeric() {
                numeric_props.insert(prop.name.clone(), json!({"type": "double"}));
            }
        }
    }

    let mut properties = base_properties();
    if let Value::Object(ref mut obj) = properties {
        obj.insert(
            "properties".to_string(),
            json!({"type": "object", "properties": schema_props}),
        );
        obj.insert(
            "numeric".to_string(),
            json!({"type": "object", "properties": numeric_props}),
        );
    }

    json!({
        "date_detection": false,
        "dynamic": false,
        "_source": {"excludes": source_excludes()},
        "properties": properties,
    })
}

/// Analysis settings shared by every bucket index (spec §4.1 "Analysis
/// settings define..."): char filters for punctuation/whitespace squashing,
/// the `kw-normalizer`/`name-kw-normalizer` keyword normalizers built from
/// them, the `icu-default`/`strip-html` analyzers, a whitespace-squashing
/// `default` text analyzer, and the `weak_length_norm` similarity used by
/// the `names` field.
#[must_use]
pub fn analysis_settings() -> Value {
    json!({
        "char_filter": {
            "punctuation": {"type": "pattern_replace", "pattern": "\\p{Punct}", "replacement": " "},
            "whitespace_squash": {"type": "pattern_replace", "pattern": "\\s+", "replacement": " "},
        },
        "normalizer": {
            "kw-normalizer": {
                "type": "custom",
                "char_filter": ["punctuation", "whitespace_squash"],
                "filter": ["lowercase", "trim"],
            },
            "name-kw-normalizer": {
                "type": "custom",
                "char_filter": ["punctuation", "whitespace_squash"],
                "filter": ["lowercase", "trim"],
            },
        },
        "analyzer": {
            "icu-default": {
                "type": "custom",
                "tokenizer": "icu_tokenizer",
                "filter": ["icu_folding", "lowercase"],
            },
            "strip-html": {
                "type": "custom",
                "tokenizer": "icu_tokenizer",
                "char_filter": ["html_strip", "whitespace_squash"],
                "filter": ["icu_folding", "lowercase"],
            },
            "default": {
                "type": "custom",
                "tokenizer": "standard",
                "char_filter": ["whitespace_squash"],
                "filter": ["lowercase"],
            },
        },
        "similarity": {
            "weak_length_norm": {"type": "BM25", "b": 0.0},
        },
    })
}

/// Excludes applied to the standalone cross-reference index's `_source`
/// (spec §4.9, `original_source/index/xref.py::XREF_SOURCE`): the derived
/// `text`/`countries` summaries and the entity-set backlinks are write-only,
/// heavy fields a reader should ask for explicitly rather than get by default.
#[must_use]
pub fn xref_source_excludes() -> Vec<&'static str> {
    vec!["text", "countries", "entityset_ids"]
}

/// Mapping for the standalone cross-reference match index (spec §4.9),
/// mirroring `original_source/index/xref.py::configure_xref`'s property set
/// with this system's `dataset`/`match_dataset` naming in place of the
/// original's `collection_id`/`match_collection_id`.
#[must_use]
pub fn xref_mapping() -> Value {
    json!({
        "date_detection": false,
        "dynamic": false,
        "_source": {"excludes": xref_source_excludes()},
        "properties": {
            "score": {"type": "float"},
            "doubt": {"type": "float"},
            "method": {"type": "keyword"},
            "random": {"type": "integer"},
            "entity_id": {"type": "keyword"},
            "dataset": {"type": "keyword"},
            "entityset_ids": {"type": "keyword"},
            "match_id": {"type": "keyword"},
            "match_dataset": {"type": "keyword"},
            "countries": {"type": "keyword"},
            "schema": {"type": "keyword"},
            "text": {"type": "text"},
            "created_at": {"type": "date"},
        },
    })
}

/// Settings body for a freshly created bucket index (shards/replicas plus
/// analysis settings), mirroring `original_source/index/util.py::index_settings`
/// and spec §4.1's analysis-settings paragraph.
#[must_use]
pub fn index_settings(shards: u32, replicas: u32) -> Value {
    json!({
        "index": {
            "number_of_shards": shards.to_string(),
            "number_of_replicas": replicas.to_string(),
        },
        "analysis": analysis_settings(),
    })
}

/// Fields whose mapping is load-bearing once set and must not be silently
/// overwritten by a later mapping update — `type`, `analyzer`, `normalizer`,
/// `index`, `store` — mirroring `rewrite_mapping_safe`'s `IMMUTABLE` tuple.
const IMMUTABLE_KEYS: &[&str] = &["type", "analyzer", "normalizer", "index", "store"];

/// Merges a pending mapping update into an existing live mapping: for any
/// key present in both, immutable attributes (`type`, `analyzer`,
/// `normalizer`, `index`, `store`) are kept at the existing value; anything
/// only present in `existing` is carried forward untouched. New fields in
/// `pending` that don't exist yet pass through as-is. Mirrors
/// `rewrite_mapping_safe()` exactly, including its recursion into nested
/// `properties` objects.
#[must_use]
pub fn rewrite_mapping_safe(pending: &Value, existing: &Value) -> Value {
    let (Value::Object(pending_obj), Value::Object(existing_obj)) = (pending, existing) else {
        return pending.clone();
    };

    let mut merged = serde_json::Map::new();
    for (key, value) in pending_obj {
        let old_value = existing_obj.get(key);
        let mut new_value = match old_value {
            Some(old) => rewrite_mapping_safe(value, old),
            None => value.clone(),
        };
        if IMMUTABLE_KEYS.contains(&key.as_str()) {
            if let Some(old) = old_value {
                new_value = old.clone();
            }
        }
        merged.insert(key.clone(), new_value);
    }
    for (key, value) in existing_obj {
        merged.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(merged)
}

/// Recursively checks whether `updated` introduces any setting not already
/// in effect in `existing` — mirrors `check_settings_changed()`. Used to
/// avoid an unnecessary close/put_settings/open cycle.
#[must_use]
pub fn settings_changed(updated: &Value, existing: &Value) -> bool {
    match (updated, existing) {
        (Value::Object(updated_obj), Value::Object(existing_obj)) => updated_obj
            .iter()
            .any(|(key, value)| settings_changed(value, existing_obj.get(key).unwrap_or(&Value::Null))),
        _ => updated != existing,
    }
}

#[must_use]
pub fn all_buckets_mappings(registry: &SchemaRegistry) -> Vec<(Bucket, Value)> {
    Bucket::ALL
        .iter()
        .map(|&bucket| (bucket, build_bucket_mapping(registry, bucket)))
        .collect()
}

#[must_use]
pub fn schema_field_names(registry: &SchemaRegistry) -> BTreeSet<String> {
    registry
        .names_all()
        .into_iter()
        .filter_map(|name| registry.get(&name).map(|s| s.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn things_bucket_mapping_includes_person_name_property() {
        let reg = SchemaRegistry::bundled();
        let mapping = build_bucket_mapping(&reg, Bucket::Things);
        let props = &mapping["properties"]["properties"]["properties"];
        assert!(props.get("name").is_some());
        // `name` is also a caption property on `Person`/`LegalEntity`, so it
        // fans into both `text` and the top-level caption `name` field.
        assert_eq!(props["name"]["copy_to"], json!(["name", "text"]));
    }

    #[test]
    fn caption_field_copies_into_top_level_name_field() {
        let reg = SchemaRegistry::bundled();
        let base = base_properties();
        assert_eq!(base["caption"]["copy_to"], json!("name"));
        assert!(base.get("name").is_some());
        let mapping = build_bucket_mapping(&reg, Bucket::Documents);
        let props = &mapping["properties"]["properties"]["properties"];
        // `fileName`/`title` are Document's caption properties.
        assert!(props["title"]["copy_to"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "name"));
    }

    #[test]
    fn numeric_properties_get_double_mapping() {
        let reg = SchemaRegistry::bundled();
        let mapping = build_bucket_mapping(&reg, Bucket::Things);
        let numeric = &mapping["properties"]["numeric"]["properties"];
        assert_eq!(numeric["createdAt"]["type"], json!("double"));
    }

    #[test]
    fn pages_bucket_content_field_is_stored() {
        let mut reg = SchemaRegistry::bundled();
        reg.insert(entity_search_core::model::Schema {
            name: "Page".into(),
            abstract_: false,
            extends: vec!["Document".into()],
            matchable: false,
            caption: vec!["title".into()],
            properties: std::collections::BTreeMap::from([(
                "content".into(),
                entity_search_core::model::Property {
                    name: "content".into(),
                    type_: PropertyType::Text,
                },
            )]),
        });
        let mapping = build_bucket_mapping(&reg, Bucket::Pages);
        let content = &mapping["properties"]["properties"]["properties"]["content"];
        assert_eq!(content["stored"], json!(true));
    }

    #[test]
    fn rewrite_mapping_safe_keeps_existing_type() {
        let pending = json!({"foo": {"type": "text", "analyzer": "new"}});
        let existing = json!({"foo": {"type": "keyword"}});
        let merged = rewrite_mapping_safe(&pending, &existing);
        assert_eq!(merged["foo"]["type"], json!("keyword"));
        assert_eq!(merged["foo"]["analyzer"], json!("new"));
    }

    #[test]
    fn rewrite_mapping_safe_carries_forward_fields_only_in_existing() {
        let pending = json!({"foo": {"type": "text"}});
        let existing = json!({"foo": {"type": "text"}, "bar": {"type": "keyword"}});
        let merged = rewrite_mapping_safe(&pending, &existing);
        assert_eq!(merged["bar"]["type"], json!("keyword"));
    }

    #[test]
    fn analysis_settings_defines_the_custom_similarity_and_analyzers() {
        let analysis = analysis_settings();
        assert_eq!(analysis["similarity"]["weak_length_norm"]["type"], json!("BM25"));
        assert!(analysis["analyzer"].get("icu-default").is_some());
        assert!(analysis["analyzer"].get("strip-html").is_some());
        assert!(analysis["normalizer"].get("kw-normalizer").is_some());
        assert!(analysis["normalizer"].get("name-kw-normalizer").is_some());
    }

    #[test]
    fn index_settings_carries_the_analysis_block() {
        let settings = index_settings(5, 0);
        assert!(settings["analysis"]["analyzer"].get("default").is_some());
    }

    #[test]
    fn html_properties_use_the_strip_html_analyzer() {
        let reg = SchemaRegistry::bundled();
        let mapping = build_bucket_mapping(&reg, Bucket::Documents);
        let body_text = &mapping["properties"]["properties"]["properties"]["bodyText"];
        assert_eq!(body_text["analyzer"], json!("strip-html"));
    }

    #[test]
    fn xref_mapping_uses_dataset_naming_not_collection_id() {
        let mapping = xref_mapping();
        assert!(mapping["properties"].get("dataset").is_some());
        assert!(mapping["properties"].get("match_dataset").is_some());
        assert!(mapping["properties"].get("collection_id").is_none());
        assert_eq!(mapping["_source"]["excludes"], json!(["text", "countries", "entityset_ids"]));
    }

    #[test]
    fn settings_changed_detects_new_value() {
        let existing = json!({"index": {"number_of_replicas": "0"}});
        let updated = json!({"index": {"number_of_replicas": "1"}});
        assert!(settings_changed(&updated, &existing));
        assert!(!settings_changed(&existing, &existing));
    }

    proptest::proptest! {
        /// Spec §8 "Mapping reconciliation is idempotent": merging a live
        /// mapping against itself is a no-op, for any field/type/flag
        /// combination a schema might declare.
        #[test]
        fn rewrite_mapping_safe_is_idempotent_against_itself(
            field in "[a-z]{1,8}",
            ty in "keyword|text|date|double",
            indexed in proptest::bool::ANY,
        ) {
            let mapping = json!({"properties": {field.clone(): {"type": ty, "index": indexed}}});
            let merged = rewrite_mapping_safe(&mapping, &mapping);
            prop_assert_eq!(merged, mapping);
        }

        /// A second reconciliation pass against the just-reconciled mapping
        /// never drifts further (spec §8 "no settings drift detected").
        #[test]
        fn rewrite_mapping_safe_reaches_a_fixed_point(
            field in "[a-z]{1,8}",
            old_ty in "keyword|text",
            new_ty in "keyword|text|date",
        ) {
            let existing = json!({"properties": {field.clone(): {"type": old_ty}}});
            let pending = json!({"properties": {field.clone(): {"type": new_ty}}});
            let once = rewrite_mapping_safe(&pending, &existing);
            let twice = rewrite_mapping_safe(&once, &once);
            prop_assert_eq!(once, twice);
        }
    }
}
