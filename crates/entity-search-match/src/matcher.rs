//! Two-phase entity matching: a blocking query (candidate recall, filter
//! context) and a scoring query (ranked refinement), composed into a
//! [`QueryClass::Match`] per DESIGN.md Open Question 2 (spec §4.8).
//! Grounded on `crates/mcp-agent-mail-db/src/search_candidates.rs` (query-class
//! shaping conventions) and
//! `examples/other_examples/9a9ba718_apognu-motiva__...elastic-queries.rs.rs`
//! (`build_shoulds`/`build_filters`/`add_term`, the `terms`/`match` clause
//! shapes this module generalizes to a typed blocking+scoring split).

use std::collections::BTreeMap;

use entity_search_core::model::{Entity, PropertyType, SchemaRegistry};
use entity_search_core::nameanalysis::NameAnalysis;
use entity_search_query::{GeoDistanceParams, MatchParams, QueryClass, QueryError, QueryResult};
use serde_json::{json, Value};

/// Minimum phonetic code length kept as a blocking signal, mirroring
/// `entity-search-transform`'s `MIN_PHONETIC_LEN` (spec §4.8 "tokens must
/// clear a minimum length to avoid stopword explosion").
const MIN_PHONETIC_LEN: usize = 3;

/// Identifier-typed property groups treated as "strong ids" for blocking
/// (spec §4.8: `identifier`, `email`, `phone`, `checksum`).
const STRONG_ID_TYPES: &[PropertyType] = &[
    PropertyType::Identifier,
    PropertyType::Email,
    PropertyType::Phone,
    PropertyType::Checksum,
];

/// Name-derived and strong-identifier blocking signals for one entity.
#[derive(Debug, Clone, Default)]
struct BlockingSignals {
    name_keys: Vec<String>,
    name_phonetic: Vec<String>,
    name_symbols: Vec<String>,
    /// group field name (e.g. `"emails"`) -> values.
    strong_ids: BTreeMap<&'static str, Vec<String>>,
}

impl BlockingSignals {
    fn is_empty(&self) -> bool {
        self.name_keys.is_empty()
            && self.name_phonetic.is_empty()
            && self.name_symbols.is_empty()
            && self.strong_ids.values().all(Vec::is_empty)
    }
}

fn blocking_signals(registry: &SchemaRegistry, entity: &Entity, name_analysis: &dyn NameAnalysis) -> BlockingSignals {
    let names = entity.names(registry);
    let mut name_keys: Vec<String> = names.iter().map(|n| name_analysis.name_key(n)).filter(|k| !k.is_empty()).collect();
    name_keys.sort();
    name_keys.dedup();

    let mut name_phonetic: Vec<String> = names
        .iter()
        .flat_map(|n| name_analysis.phonetic(n))
        .filter(|code| code.len() >= MIN_PHONETIC_LEN)
        .collect();
    name_phonetic.sort();
    name_phonetic.dedup();

    let mut name_symbols: Vec<String> = Vec::new();
    for name in &names {
        name_symbols.extend(name_analysis.symbols(name));
    }
    name_symbols.sort();
    name_symbols.dedup();

    let mut strong_ids: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let effective = registry.effective_properties(&entity.schema);
    for (prop_name, values) in &entity.properties {
        let Some(prop) = effective.get(prop_name) else {
            continue;
        };
        if !STRONG_ID_TYPES.contains(&prop.type_) {
            continue;
        }
        let Some(group) = prop.type_.group_field() else {
            continue;
        };
        strong_ids.entry(group).or_default().extend(values.iter().cloned());
    }
    for values in strong_ids.values_mut() {
        values.sort();
        values.dedup();
    }

    BlockingSignals { name_keys, name_phonetic, name_symbols, strong_ids }
}

fn blocking_should(signals: &BlockingSignals) -> Vec<Value> {
    let mut should = Vec::new();
    if !signals.name_keys.is_empty() {
        should.push(json!({"terms": {"name_keys": signals.name_keys}}));
    }
    if !signals.name_phonetic.is_empty() {
        should.push(json!({"terms": {"name_phonetic": signals.name_phonetic}}));
    }
    if !signals.name_symbols.is_empty() {
        should.push(json!({"terms": {"name_symbols": signals.name_symbols}}));
    }
    for (group, values) in &signals.strong_ids {
        if !values.is_empty() {
            should.push(json!({"terms": {*group: values}}));
        }
    }
    should
}

/// Builds a standalone blocking query for `entity` (spec §4.8 "Blocking
/// query"): a constant-score `should` union of high-signal predicates,
/// restricted to the entity's matchable schema family and (if given) a
/// dataset scope, excluding the entity itself. Returns `match_none` when
/// the schema isn't matchable or the entity carries no blocking signals.
#[must_use]
pub fn blocking_query(registry: &SchemaRegistry, entity: &Entity, name_analysis: &dyn NameAnalysis, dataset: Option<&str>) -> Value {
    let matchable_schemata = registry.matchable_schemata(&entity.schema);
    if matchable_schemata.is_empty() {
        return json!({"query": {"match_none": {}}});
    }

    let signals = blocking_signals(registry, entity, name_analysis);
    if signals.is_empty() {
        return json!({"query": {"match_none": {}}});
    }

    let mut filter = vec![
        json!({"bool": {"should": blocking_should(&signals), "minimum_should_match": 1}}),
        json!({"terms": {"schema": matchable_schemata}}),
    ];
    if let Some(dataset) = dataset {
        filter.push(json!({"term": {"dataset": dataset}}));
    }

    json!({
        "query": {
            "bool": {
                "filter": filter,
                "must_not": [{"ids": {"values": [entity.id.clone()]}}],
            }
        }
    })
}

/// Per-field boost applied in the scoring phase (spec §4.8: "names weighted
/// highest, then identifiers, then countries/addresses").
fn scoring_boost(group: &str) -> f64 {
    match group {
        "names" => 3.0,
        "identifiers" | "emails" | "phones" | "checksums" => 2.0,
        "countries" | "addresses" => 1.0,
        _ => 0.5,
    }
}

/// Builds the scoring `should` union for `entity` (spec §4.8 "Scoring
/// query"): `match` clauses against the group field every non-name
/// matchable property value belongs to, plus `match` against `names`, each
/// boosted by field-type significance.
fn scoring_should(registry: &SchemaRegistry, entity: &Entity) -> Vec<Value> {
    let mut should = Vec::new();
    for name in entity.names(registry) {
        should.push(json!({"match": {"names": {"query": name, "boost": scoring_boost("names")}}}));
    }

    let effective = registry.effective_properties(&entity.schema);
    for (prop_name, values) in &entity.properties {
        let Some(prop) = effective.get(prop_name) else {
            continue;
        };
        let Some(group) = prop.type_.group_field() else {
            continue;
        };
        if group == "names" {
            continue;
        }
        for value in values {
            should.push(json!({"match": {group: {"query": value, "boost": scoring_boost(group)}}}));
        }
    }
    should
}

/// Composes the blocking and scoring phases into a single `bool` delta,
/// folded onto the `EntitiesQuery` skeleton by the compiler (DESIGN.md Open
/// Question 2): blocking's `should`-union becomes a `filter`-context
/// constraint, scoring's `should`-union carries the ranking `_score`.
fn composed_query(registry: &SchemaRegistry, entity: &Entity, name_analysis: &dyn NameAnalysis, dataset: Option<&str>) -> Value {
    let matchable_schemata = registry.matchable_schemata(&entity.schema);
    if matchable_schemata.is_empty() {
        return json!({"bool": {"filter": [{"match_none": {}}]}});
    }

    let signals = blocking_signals(registry, entity, name_analysis);
    if signals.is_empty() {
        return json!({"bool": {"filter": [{"match_none": {}}]}});
    }

    let mut filter = vec![
        json!({"bool": {"should": blocking_should(&signals), "minimum_should_match": 1}}),
        json!({"terms": {"schema": matchable_schemata}}),
    ];
    if let Some(dataset) = dataset {
        filter.push(json!({"term": {"dataset": dataset}}));
    }

    json!({
        "bool": {
            "filter": filter,
            "should": scoring_should(registry, entity),
            "must_not": [{"ids": {"values": [entity.id.clone()]}}],
        }
    })
}

/// Builds a [`QueryClass::Match`] for `entity` (spec §4.7 `MatchQuery`): the
/// index scope is restricted to the source entity's matchable schema
/// family, and `excludes` is forwarded to the compiler's `must_not: ids`.
#[must_use]
pub fn build_match_class(registry: &SchemaRegistry, entity: &Entity, name_analysis: &dyn NameAnalysis, dataset: Option<&str>, excludes: Vec<String>) -> QueryClass {
    QueryClass::Match(MatchParams {
        matchable_schemata: registry.matchable_schemata(&entity.schema),
        excludes,
        scoring_query: composed_query(registry, entity, name_analysis, dataset),
    })
}

/// Parses the first value of a multi-valued property as `f64`, skipping
/// values that don't parse (spec §4.2 numeric casting treats malformed
/// values the same way).
fn first_coordinate(entity: &Entity, property: &str) -> Option<f64> {
    entity.get(property).iter().find_map(|v| v.parse::<f64>().ok())
}

/// Builds a [`QueryClass::GeoDistance`] for `entity` (spec §4.7
/// `GeoDistanceQuery`: "requires source entity with latitude+longitude").
/// Fails with [`QueryError::MissingGeoPoint`] when either coordinate is
/// absent or unparsable, so a caller can never construct the class from an
/// entity the compiler would then have to reject. Self-exclusion
/// (`must_not: ids`) is handled by the compiler from `source_id` alone.
pub fn build_geo_distance_class(entity: &Entity) -> QueryResult<QueryClass> {
    let lat = first_coordinate(entity, "latitude").ok_or(QueryError::MissingGeoPoint)?;
    let lon = first_coordinate(entity, "longitude").ok_or(QueryError::MissingGeoPoint)?;
    Ok(QueryClass::GeoDistance(GeoDistanceParams { lat, lon, source_id: entity.id.clone() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_search_core::model::EntityContext;
    use entity_search_core::nameanalysis::DefaultNameAnalysis;
    use std::collections::BTreeMap;

    fn person(id: &str, name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            schema: "Person".to_string(),
            properties: BTreeMap::from([("name".to_string(), vec![name.to_string()])]),
            context: EntityContext::default(),
        }
    }

    #[test]
    fn blocking_query_is_match_none_without_signals() {
        let registry = SchemaRegistry::bundled();
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::new(),
            context: EntityContext::default(),
        };
        let query = blocking_query(&registry, &entity, &DefaultNameAnalysis, None);
        assert_eq!(query["query"], json!({"match_none": {}}));
    }

    #[test]
    fn blocking_query_is_match_none_for_non_matchable_schema() {
        let registry = SchemaRegistry::bundled();
        let entity = person("page1", "Vladimir Putin");
        let mut entity = entity;
        entity.schema = "Page".to_string();
        let query = blocking_query(&registry, &entity, &DefaultNameAnalysis, None);
        assert_eq!(query["query"], json!({"match_none": {}}));
    }

    #[test]
    fn blocking_query_excludes_self_and_restricts_to_matchable_family() {
        let registry = SchemaRegistry::bundled();
        let entity = person("p1", "Vladimir Putin");
        let query = blocking_query(&registry, &entity, &DefaultNameAnalysis, None);
        let filter = query["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filter.iter().any(|f| f["terms"]["schema"].is_array()));
        assert_eq!(query["query"]["bool"]["must_not"][0]["ids"]["values"][0], json!("p1"));
    }

    #[test]
    fn blocking_query_adds_dataset_filter_when_given() {
        let registry = SchemaRegistry::bundled();
        let entity = person("p1", "Vladimir Putin");
        let query = blocking_query(&registry, &entity, &DefaultNameAnalysis, Some("ds1"));
        let filter = query["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filter.contains(&json!({"term": {"dataset": "ds1"}})));
    }

    #[test]
    fn scoring_should_boosts_names_above_strong_ids() {
        let registry = SchemaRegistry::bundled();
        let mut entity = person("p1", "Vladimir Putin");
        entity.properties.insert("idNumber".to_string(), vec!["X123".to_string()]);
        let should = scoring_should(&registry, &entity);
        let name_boost = should.iter().find(|c| c["match"].get("names").is_some()).unwrap()["match"]["names"]["boost"].as_f64().unwrap();
        let id_boost = should.iter().find(|c| c["match"].get("identifiers").is_some()).unwrap()["match"]["identifiers"]["boost"].as_f64().unwrap();
        assert!(name_boost > id_boost);
    }

    #[test]
    fn build_match_class_restricts_to_matchable_family() {
        let registry = SchemaRegistry::bundled();
        let entity = person("p1", "Vladimir Putin");
        let class = build_match_class(&registry, &entity, &DefaultNameAnalysis, None, vec![]);
        let QueryClass::Match(params) = class else { panic!("expected Match class") };
        assert!(params.matchable_schemata.contains(&"Person".to_string()));
        assert!(!params.matchable_schemata.contains(&"Company".to_string()));
    }

    #[test]
    fn build_geo_distance_class_reads_coordinates() {
        let mut entity = person("p1", "Vladimir Putin");
        entity.properties.insert("latitude".to_string(), vec!["55.75".to_string()]);
        entity.properties.insert("longitude".to_string(), vec!["37.62".to_string()]);
        let class = build_geo_distance_class(&entity).unwrap();
        let QueryClass::GeoDistance(params) = class else { panic!("expected GeoDistance class") };
        assert!((params.lat - 55.75).abs() < f64::EPSILON);
        assert!((params.lon - 37.62).abs() < f64::EPSILON);
        assert_eq!(params.source_id, "p1");
    }

    #[test]
    fn build_geo_distance_class_fails_without_longitude() {
        let mut entity = person("p1", "Vladimir Putin");
        entity.properties.insert("latitude".to_string(), vec!["55.75".to_string()]);
        let err = build_geo_distance_class(&entity).unwrap_err();
        assert!(matches!(err, QueryError::MissingGeoPoint));
    }

    #[test]
    fn build_geo_distance_class_fails_without_any_coordinates() {
        let entity = person("p1", "Vladimir Putin");
        let err = build_geo_distance_class(&entity).unwrap_err();
        assert!(matches!(err, QueryError::MissingGeoPoint));
    }
}
