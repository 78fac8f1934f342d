//! `EntityTransformer`: denormalizes a single entity into the document shape
//! the backend indexes (spec §4.2). Pure and deterministic except for the
//! `indexed_at` timestamp, which callers may override for reproducible tests.

use std::collections::{BTreeMap, BTreeSet};

use entity_search_core::model::{Entity, PropertyType, SchemaRegistry};
use entity_search_core::nameanalysis::NameAnalysis;
use entity_search_mapping::topology::{entities_write_index, Bucket};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{TransformError, TransformResult};

/// Marker prefix on `indexText` values that routes them to the `translation`
/// field instead of `content`/`text` (spec §4.2 step 5). Mirrors
/// `examples/original_source/tests/test_pages.py::test_pages_translation`.
pub const TRANSLATION_MARKER: &str = "__translation__ ";

/// Minimum phonetic code length kept in `name_phonetic` (spec §4.2 step 4);
/// shorter codes are dominated by stopword collisions.
const MIN_PHONETIC_LEN: usize = 3;

/// Knobs that vary the transform without changing its shape: the index
/// prefix/version the action is addressed to, and the optional id
/// namespacing transform (spec §4.2 step 10, DESIGN.md Open Question 3).
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub index_prefix: String,
    pub index_write_version: String,
    pub namespace_ids: bool,
    /// HMAC-like namespace key mixed into the id when `namespace_ids` is set.
    /// Any stable secret works; this is not a cryptographic boundary.
    pub namespace_key: String,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            index_prefix: "entity-search".to_string(),
            index_write_version: "v1".to_string(),
            namespace_ids: false,
            namespace_key: String::new(),
        }
    }
}

/// A bulk action ready for the Ingester: the backend's `_id`/`_index`/`_source`/`_routing`.
#[derive(Debug, Clone)]
pub struct IndexAction {
    pub id: String,
    pub index: String,
    pub routing: String,
    pub source: Value,
}

fn valid_dataset(dataset: &str) -> TransformResult<()> {
    if dataset.is_empty() || dataset == "default" {
        return Err(TransformError::InvalidDataset(dataset.to_string()));
    }
    Ok(())
}

fn namespaced_id(id: &str, namespace_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace_key.as_bytes());
    hasher.update(b":");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    format!("{id}.{}", hex::encode(&digest[..8]))
}

fn numeric_values(type_: PropertyType, values: &[String]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| match type_ {
            PropertyType::Date => parse_date_to_epoch(v),
            _ => v.parse::<f64>().ok(),
        })
        .collect()
}

/// Parses an ISO-ish date/datetime string into epoch seconds. Accepts the
/// same partial-precision formats the mapping's `DATE_FORMAT` declares:
/// full timestamp, date-only, year-month, or bare year.
fn parse_date_to_epoch(value: &str) -> Option<f64> {
    use chrono::{NaiveDate, NaiveDateTime};

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    None
}

/// `_get_symbols` (spec §4.2 step 3): `LegalEntity` entities get a generic
/// symbol set; everything else gets the union of person- and org-tagged
/// symbols over its names.
fn entity_symbols(
    registry: &SchemaRegistry,
    entity: &Entity,
    names: &[String],
    name_analysis: &dyn NameAnalysis,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if registry.is_a(&entity.schema, "LegalEntity") {
        for name in names {
            out.extend(name_analysis.symbols(name));
        }
    } else {
        for name in names {
            out.extend(name_analysis.tag_person_name(name));
            out.extend(name_analysis.tag_org_name(name));
        }
    }
    out
}

/// Transforms a single entity into a bulk index action, or returns
/// [`TransformError::AbstractSchema`] if the entity's schema cannot be
/// written (spec §4.2: "abstract entities are logged and skipped" — the
/// caller is expected to catch this variant and continue the stream).
pub fn transform_entity(
    registry: &SchemaRegistry,
    name_analysis: &dyn NameAnalysis,
    config: &TransformerConfig,
    dataset: &str,
    entity: &Entity,
    indexed_at: &str,
) -> TransformResult<IndexAction> {
    valid_dataset(dataset)?;
    let dataset = dataset.to_string();

    let schema = registry.require(&entity.schema)?;
    if schema.abstract_ {
        return Err(TransformError::AbstractSchema(entity.schema.clone()));
    }

    let bucket = entity_search_mapping::topology::schema_bucket(registry, &entity.schema)?;
    let effective = registry.effective_properties(&entity.schema);

    let mut properties_out: Map<String, Value> = Map::new();
    let mut groups: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let mut num_values: usize = 0;
    let mut numeric: Map<String, Value> = Map::new();

    for (name, values) in &entity.properties {
        if values.is_empty() {
            continue;
        }
        let Some(prop) = effective.get(name) else {
            continue;
        };
        if name == "indexText" {
            // Moved to top-level text/content/translation below, never
            // stored under `properties` (spec §4.2 step 5).
            continue;
        }
        num_values += values.len();
        properties_out.insert(name.clone(), Value::from(values.clone()));

        if let Some(group) = prop.type_.group_field() {
            groups.entry(group).or_default().extend(values.clone());
        }
        if prop.type_.is_numeric() {
            numeric.insert(
                name.clone(),
                Value::from(numeric_values(prop.type_, values)),
            );
        }
    }

    let names = entity.names(registry);
    let name_keys: Vec<String> = {
        let mut keys: Vec<String> = names.iter().map(|n| name_analysis.name_key(n)).collect();
        keys.sort();
        keys.dedup();
        keys
    };
    let name_parts: Vec<String> = {
        let mut parts: BTreeSet<String> = BTreeSet::new();
        for name in &names {
            parts.extend(name_analysis.symbols(name));
        }
        parts.into_iter().collect()
    };
    let name_phonetic: Vec<String> = {
        let mut codes: BTreeSet<String> = BTreeSet::new();
        for name in &names {
            for code in name_analysis.phonetic(name) {
                if code.len() >= MIN_PHONETIC_LEN {
                    codes.insert(code);
                }
            }
        }
        codes.into_iter().collect()
    };
    let name_symbols: Vec<String> = entity_symbols(registry, entity, &names, name_analysis)
        .into_iter()
        .collect();

    // indexText -> text / content / translation (spec §4.2 step 5).
    let mut text_values = Vec::new();
    let mut content_values = Vec::new();
    let mut translation_values = Vec::new();
    for value in entity.get("indexText") {
        if let Some(stripped) = value.strip_prefix(TRANSLATION_MARKER) {
            translation_values.push(stripped.to_string());
        } else if bucket == Bucket::Pages {
            content_values.push(value.clone());
        } else {
            text_values.push(value.clone());
        }
    }

    // dates group is cast into numeric too, regardless of per-property casts above.
    if let Some(dates) = groups.get("dates") {
        numeric.insert(
            "dates".to_string(),
            Value::from(numeric_values(PropertyType::Date, dates)),
        );
    } else {
        numeric.insert("dates".to_string(), Value::from(Vec::<f64>::new()));
    }

    let geo_point = if effective.contains_key("latitude") && effective.contains_key("longitude") {
        let lons = entity.get("longitude");
        let lats = entity.get("latitude");
        let mut points = Vec::new();
        for lon in lons {
            for lat in lats {
                points.push(serde_json::json!({"lon": lon, "lat": lat}));
            }
        }
        Some(points)
    } else {
        None
    };

    let created_at = entity.context.created_at.iter().min().cloned();
    let updated_at = entity
        .context
        .updated_at
        .iter()
        .max()
        .cloned()
        .or_else(|| created_at.clone());

    let mut source = Map::new();
    source.insert("dataset".to_string(), Value::String(dataset.clone()));
    source.insert("schema".to_string(), Value::String(entity.schema.clone()));
    source.insert(
        "schemata".to_string(),
        Value::from(registry.names(&entity.schema)),
    );
    if let Some(caption) = entity.caption(schema) {
        source.insert("caption".to_string(), Value::String(caption));
    }
    source.insert("properties".to_string(), Value::Object(properties_out));
    for (group, values) in &groups {
        let mut dedup: Vec<String> = values.clone();
        dedup.sort();
        dedup.dedup();
        source.insert((*group).to_string(), Value::from(dedup));
    }
    source.insert("names".to_string(), Value::from(names));
    source.insert("name_keys".to_string(), Value::from(name_keys));
    source.insert("name_parts".to_string(), Value::from(name_parts));
    source.insert("name_phonetic".to_string(), Value::from(name_phonetic));
    source.insert("name_symbols".to_string(), Value::from(name_symbols));
    source.insert("text".to_string(), Value::from(text_values));
    if !translation_values.is_empty() {
        source.insert("translation".to_string(), Value::from(translation_values));
    }
    if bucket == Bucket::Pages {
        source.insert("content".to_string(), Value::from(content_values));
    }
    source.insert("numeric".to_string(), Value::Object(numeric));
    if let Some(points) = geo_point {
        source.insert("geo_point".to_string(), Value::from(points));
    }
    source.insert("num_values".to_string(), Value::from(num_values as u64));
    source.insert(
        "role_id".to_string(),
        entity
            .context
            .role_id
            .first()
            .cloned()
            .map_or(Value::Null, Value::String),
    );
    source.insert(
        "profile_id".to_string(),
        entity
            .context
            .profile_id
            .first()
            .cloned()
            .map_or(Value::Null, Value::String),
    );
    source.insert("mutable".to_string(), Value::Bool(false));
    source.insert("origin".to_string(), Value::from(entity.context.origin.clone()));
    source.insert("tags".to_string(), Value::from(entity.context.tags.clone()));
    if let Some(c) = created_at {
        source.insert("created_at".to_string(), Value::String(c));
    }
    if let Some(u) = updated_at {
        source.insert("updated_at".to_string(), Value::String(u));
    }
    source.insert(
        "index_version".to_string(),
        Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    source.insert("indexed_at".to_string(), Value::String(indexed_at.to_string()));

    let index = entities_write_index(
        registry,
        &config.index_prefix,
        &entity.schema,
        &config.index_write_version,
    )?;

    let id = if config.namespace_ids {
        namespaced_id(&entity.id, &config.namespace_key)
    } else {
        entity.id.clone()
    };

    Ok(IndexAction {
        id,
        index,
        routing: dataset,
        source: Value::Object(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_search_core::model::EntityContext;
    use entity_search_core::nameanalysis::DefaultNameAnalysis;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::bundled()
    }

    fn config() -> TransformerConfig {
        TransformerConfig {
            index_prefix: "acme".into(),
            index_write_version: "v1".into(),
            namespace_ids: false,
            namespace_key: String::new(),
        }
    }

    #[test]
    fn abstract_schema_is_rejected() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "e1".into(),
            schema: "Thing".into(),
            properties: BTreeMap::new(),
            context: EntityContext::default(),
        };
        let result = transform_entity(&reg, &na, &config(), "ds", &entity, "2024-01-01T00:00:00");
        assert!(matches!(result, Err(TransformError::AbstractSchema(_))));
    }

    #[test]
    fn default_dataset_is_rejected() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::new(),
            context: EntityContext::default(),
        };
        let result =
            transform_entity(&reg, &na, &config(), "default", &entity, "2024-01-01T00:00:00");
        assert!(matches!(result, Err(TransformError::InvalidDataset(_))));
    }

    #[test]
    fn group_field_fan_out_matches_property_values() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "Q7747".into(),
            schema: "Person".into(),
            properties: BTreeMap::from([
                ("name".into(), vec!["Vladimir Putin".into()]),
                ("citizenship".into(), vec!["ru".into()]),
            ]),
            context: EntityContext::default(),
        };
        let action =
            transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        assert_eq!(action.routing, "ds1");
        assert_eq!(action.index, "acme-entity-things-v1");
        assert_eq!(action.source["countries"], serde_json::json!(["ru"]));
        assert_eq!(
            action.source["properties"]["citizenship"],
            serde_json::json!(["ru"])
        );
    }

    #[test]
    fn num_values_counts_leaf_values() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::from([
                ("name".into(), vec!["A".into(), "B".into()]),
                ("citizenship".into(), vec!["ru".into()]),
            ]),
            context: EntityContext::default(),
        };
        let action =
            transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        assert_eq!(action.source["num_values"], serde_json::json!(3));
    }

    #[test]
    fn geo_point_is_cartesian_product() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "addr1".into(),
            schema: "Address".into(),
            properties: BTreeMap::from([
                ("longitude".into(), vec!["1.0".into(), "2.0".into()]),
                ("latitude".into(), vec!["3.0".into()]),
            ]),
            context: EntityContext::default(),
        };
        let action =
            transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        let points = action.source["geo_point"].as_array().unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn translation_marker_routes_into_translation_field() {
        let mut reg = registry();
        reg.insert(entity_search_core::model::Schema {
            name: "Pages".into(),
            abstract_: false,
            extends: vec!["Document".into()],
            matchable: false,
            caption: vec!["fileName".into()],
            properties: BTreeMap::new(),
        });
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "pg1".into(),
            schema: "Pages".into(),
            properties: BTreeMap::from([(
                "indexText".into(),
                vec![
                    "Original German text".into(),
                    "__translation__ Translated English text".into(),
                ],
            )]),
            context: EntityContext::default(),
        };
        let action =
            transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        assert_eq!(
            action.source["content"],
            serde_json::json!(["Original German text"])
        );
        assert_eq!(
            action.source["translation"],
            serde_json::json!(["Translated English text"])
        );
    }

    #[test]
    fn created_updated_reduce_to_min_max() {
        let reg = registry();
        let na = DefaultNameAnalysis;
        let mut ctx = EntityContext::default();
        ctx.created_at = vec!["2020-01-01".into(), "2019-01-01".into()];
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::new(),
            context: ctx,
        };
        let action =
            transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        assert_eq!(action.source["created_at"], serde_json::json!("2019-01-01"));
        assert_eq!(action.source["updated_at"], serde_json::json!("2020-01-01"));
    }

    #[test]
    fn namespaced_id_is_deterministic_and_appends_suffix() {
        let mut cfg = config();
        cfg.namespace_ids = true;
        cfg.namespace_key = "secret".into();
        let reg = registry();
        let na = DefaultNameAnalysis;
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::new(),
            context: EntityContext::default(),
        };
        let a = transform_entity(&reg, &na, &cfg, "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        let b = transform_entity(&reg, &na, &cfg, "ds1", &entity, "2024-01-01T00:00:00").unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("e1."));
        assert_ne!(a.id, "e1");
    }

    proptest::proptest! {
        /// `num_values` always equals the total count of leaf property values,
        /// regardless of how many properties or values per property an entity
        /// carries (spec §8 "num_values reflects the flattened value count").
        #[test]
        fn num_values_matches_total_property_value_count(
            citizenship_count in 0usize..5,
            name_count in 0usize..5,
        ) {
            let reg = registry();
            let na = DefaultNameAnalysis;
            let mut properties = BTreeMap::new();
            if name_count > 0 {
                properties.insert("name".to_string(), (0..name_count).map(|i| format!("Name{i}")).collect());
            }
            if citizenship_count > 0 {
                properties.insert("citizenship".to_string(), (0..citizenship_count).map(|_| "ru".to_string()).collect());
            }
            let entity = Entity {
                id: "e1".into(),
                schema: "Person".into(),
                properties,
                context: EntityContext::default(),
            };
            let action = transform_entity(&reg, &na, &config(), "ds1", &entity, "2024-01-01T00:00:00").unwrap();
            prop_assert_eq!(action.source["num_values"], serde_json::json!((name_count + citizenship_count) as u64));
        }
    }
}
