//! Assembles backend JSON query bodies from a [`ParsedQuery`] and a
//! [`QueryClass`] policy (spec §4.7). A single compiler dispatches on the
//! class variant; no per-class struct hierarchy (spec §9 Design Notes).
//! Grounded field-for-field on
//! `examples/original_source/openaleph_search/query/{queries.py,util.py,more_like_this.py}`
//! and the highlight/facet shapes asserted in
//! `examples/original_source/tests/test_search_query.py`.

use std::collections::BTreeSet;

use entity_search_core::model::SchemaRegistry;
use entity_search_mapping::topology::entities_read_indexes;
use serde_json::{json, Map, Value};

use crate::auth::SearchAuth;
use crate::classes::{ClassPolicy, QueryClass};
use crate::error::{QueryError, QueryResult};
use crate::parser::{facet_size_for, ParsedQuery};

/// A compiled request, ready to send to `POST {index}/_search`.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub index: String,
    pub body: Value,
}

/// Mutable builder for the `{bool: {must, should, filter, must_not}}`
/// skeleton (spec §4.7 "Base boolean skeleton"). A typed builder rather
/// than string-concatenated JSON, per spec §9 Design Notes.
#[derive(Debug, Default)]
struct BoolQuery {
    must: Vec<Value>,
    should: Vec<Value>,
    filter: Vec<Value>,
    must_not: Vec<Value>,
}

impl BoolQuery {
    fn into_value(self) -> Value {
        json!({
            "bool": {
                "must": self.must,
                "should": self.should,
                "filter": self.filter,
                "must_not": self.must_not,
            }
        })
    }

    /// Folds another bool query's clauses into this one (used to combine
    /// the Matcher's scoring query with the `EntitiesQuery` skeleton,
    /// DESIGN.md Open Question 2).
    fn fold(&mut self, other: &Value) {
        if let Some(inner) = other.get("bool") {
            for (key, slot) in [
                ("must", &mut self.must),
                ("should", &mut self.should),
                ("filter", &mut self.filter),
                ("must_not", &mut self.must_not),
            ] {
                if let Some(values) = inner.get(key).and_then(Value::as_array) {
                    slot.extend(values.iter().cloned());
                }
            }
        } else if !other.is_null() {
            self.must.push(other.clone());
        }
    }
}

fn field_filter_query(field: &str, values: &BTreeSet<String>) -> Value {
    if field == "_id" || field == "id" {
        return json!({"ids": {"values": values.iter().collect::<Vec<_>>()}});
    }
    if values.len() == 1 {
        json!({"term": {field: values.iter().next()}})
    } else {
        json!({"terms": {field: values.iter().collect::<Vec<_>>()}})
    }
}

fn range_filter_value(op: crate::parser::RangeOp, value: &str) -> Value {
    json!({ op.as_str(): value })
}

/// Resolves the target index list for a class (spec §4.7 "Index resolution").
fn resolve_index(parsed: &ParsedQuery, class: &QueryClass, registry: &SchemaRegistry, prefix: &str, read_versions: &[String]) -> QueryResult<String> {
    match class {
        QueryClass::Xref => Ok(format!("{prefix}-xref-v1")),
        QueryClass::MoreLikeThis(_) => {
            let indexes = entities_read_indexes(registry, prefix, Some("Document"), true, read_versions)
                .map_err(QueryError::Core)?;
            Ok(indexes.join(","))
        }
        QueryClass::Match(params) => {
            let mut indexes = BTreeSet::new();
            for schema in &params.matchable_schemata {
                indexes.extend(entities_read_indexes(registry, prefix, Some(schema), false, read_versions).map_err(QueryError::Core)?);
            }
            Ok(indexes.into_iter().collect::<Vec<_>>().join(","))
        }
        QueryClass::Entities | QueryClass::GeoDistance(_) => {
            if let Some(schemata) = parsed.filters.get("schema") {
                let mut indexes = BTreeSet::new();
                for schema in schemata {
                    indexes.extend(entities_read_indexes(registry, prefix, Some(schema), false, read_versions).map_err(QueryError::Core)?);
                }
                return Ok(indexes.into_iter().collect::<Vec<_>>().join(","));
            }
            if let Some(schemata) = parsed.filters.get("schemata") {
                let mut indexes = BTreeSet::new();
                for schema in schemata {
                    indexes.extend(entities_read_indexes(registry, prefix, Some(schema), true, read_versions).map_err(QueryError::Core)?);
                }
                return Ok(indexes.into_iter().collect::<Vec<_>>().join(","));
            }
            let indexes = entities_read_indexes(registry, prefix, Some("Thing"), true, read_versions).map_err(QueryError::Core)?;
            Ok(indexes.join(","))
        }
    }
}

fn text_query(parsed: &ParsedQuery, policy: &ClassPolicy) -> Vec<Value> {
    let mut must = Vec::new();
    let has_text = parsed.q.as_deref().is_some_and(|q| !q.is_empty());
    if !has_text && parsed.prefix.is_none() {
        must.push(json!({"match_all": {}}));
    } else if has_text {
        must.push(json!({
            "query_string": {
                "query": parsed.q.as_deref().unwrap_or_default(),
                "fields": policy.text_fields,
                "default_operator": "AND",
                "lenient": true,
                "minimum_should_match": "66%",
            }
        }));
    }
    if let Some(prefix) = &parsed.prefix {
        must.push(json!({"prefix": {policy.prefix_field: prefix}}));
    }
    must
}

/// Sliding-window n-gram concatenation of sorted query tokens (spec §4.6
/// `synonyms`), length >= 2 tokens, mirroring how `name_keys` fingerprints
/// are built from names (`name_key = sorted tokens joined by "-"`).
fn name_key_ngrams(q: &str) -> Vec<String> {
    let mut tokens: Vec<String> = q
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    let mut out = Vec::new();
    for window in 2..=tokens.len() {
        for start in 0..=(tokens.len() - window) {
            out.push(tokens[start..start + window].join("-"));
        }
    }
    out
}

fn add_synonyms(bool_query: &mut BoolQuery, parsed: &ParsedQuery) {
    if !parsed.synonyms {
        return;
    }
    let Some(q) = parsed.q.as_deref().filter(|q| !q.is_empty()) else {
        return;
    };
    let tokens: Vec<&str> = q.split_whitespace().collect();
    if !tokens.is_empty() {
        bool_query.should.push(json!({"terms": {"name_symbols": tokens}}));
    }
    let ngrams = name_key_ngrams(q);
    if !ngrams.is_empty() {
        bool_query.should.push(json!({"terms": {"name_keys": ngrams}}));
    }
}

fn add_filters(bool_query: &mut BoolQuery, post_filter: &mut BoolQuery, parsed: &ParsedQuery, policy: &ClassPolicy) {
    for (field, values) in &parsed.filters {
        let is_facet = parsed.facets.contains(field);
        if policy.skip_filters.contains(&field.as_str()) && !is_facet {
            continue;
        }
        let target_field = if field == "names" { policy.names_filter_target } else { field.as_str() };
        let query = field_filter_query(target_field, values);
        if is_facet {
            post_filter.filter.push(query);
        } else {
            bool_query.filter.push(query);
        }
    }
    for range in &parsed.range_filters {
        bool_query.filter.push(json!({"range": {range.field.as_str(): range_filter_value(range.op, &range.value)}}));
    }
    for (field, values) in &parsed.excludes {
        bool_query.must_not.push(field_filter_query(field, values));
    }
}

fn add_authorization(bool_query: &mut BoolQuery, parsed: &ParsedQuery, policy: &ClassPolicy) {
    let Some(auth) = &parsed.auth else {
        return;
    };
    if auth.is_admin {
        return;
    }
    if auth.datasets.is_empty() {
        bool_query.filter.push(json!({"match_none": {}}));
        return;
    }
    bool_query.filter.push(json!({"terms": {policy.authz_field: auth.datasets}}));
}

/// Function-score wrap (entities only, spec §4.7): biases toward
/// information-rich entities via `num_values`.
fn wrap_function_score(query: Value) -> Value {
    json!({
        "function_score": {
            "query": query,
            "functions": [{
                "field_value_factor": {
                    "field": "num_values",
                    "factor": 0.5,
                    "modifier": "sqrt",
                }
            }],
            "boost_mode": "sum",
        }
    })
}

fn sort_value(parsed: &ParsedQuery, policy: &ClassPolicy, class: &QueryClass) -> Vec<Value> {
    if let QueryClass::GeoDistance(params) = class {
        return vec![json!({
            "_geo_distance": {
                "geo_point": {"lat": params.lat, "lon": params.lon},
                "order": "asc",
                "unit": "km",
                "mode": "min",
                "distance_type": "plane",
            }
        })];
    }
    if parsed.sorts.is_empty() {
        let mut sorts = policy.sort_default.clone();
        if matches!(class, QueryClass::Entities | QueryClass::Match(_)) {
            sorts.push(json!({"_score": "desc"}));
        }
        return sorts;
    }
    parsed
        .sorts
        .iter()
        .map(|s| {
            let order = match s.order {
                crate::parser::SortOrder::Asc => "asc",
                crate::parser::SortOrder::Desc => "desc",
            };
            // Heuristic numeric-field routing (spec §4.6): a bare field name
            // that isn't one of the well-known keyword/date top-level
            // fields is assumed numeric and routed through `numeric.<name>`.
            const KNOWN_NON_NUMERIC: &[&str] = &["_score", "dataset", "schema", "caption", "random", "doubt", "score"];
            if KNOWN_NON_NUMERIC.contains(&s.field.as_str()) {
                json!({ s.field.clone(): order })
            } else {
                json!({
                    format!("numeric.{}", s.field): {
                        "order": order,
                        "missing": "_last",
                        "unmapped_type": "keyword",
                        "mode": "min",
                    }
                })
            }
        })
        .chain(std::iter::once(json!({"_score": "desc"})))
        .collect()
}

fn highlight_value(parsed: &ParsedQuery, policy: &ClassPolicy) -> Option<Value> {
    if !parsed.highlight {
        return None;
    }
    let q = parsed.q.clone().unwrap_or_default();
    let mut fields = Map::new();
    fields.insert(
        "text".to_string(),
        json!({
            "type": "plain",
            "fragment_size": 150,
            "number_of_fragments": 1,
            "max_analyzed_offset": 999_999,
            "highlight_query": {
                "query_string": {
                    "query": q,
                    "lenient": true,
                    "fields": ["text"],
                    "default_operator": "AND",
                    "minimum_should_match": "66%",
                }
            },
        }),
    );
    fields.insert(
        "names".to_string(),
        json!({
            "type": "plain",
            "number_of_fragments": 3,
            "max_analyzed_offset": 1000,
            "pre_tags": [""],
            "post_tags": [""],
        }),
    );
    if matches!(policy.text_fields.first(), Some(&"names^3")) {
        fields.insert(
            "content".to_string(),
            json!({
                "type": "plain",
                "fragment_size": 600,
                "number_of_fragments": 3,
                "max_analyzed_offset": 999_999,
            }),
        );
        fields.insert(
            "translation".to_string(),
            json!({
                "type": "plain",
                "fragment_size": 600,
                "number_of_fragments": 3,
                "max_analyzed_offset": 999_999,
            }),
        );
    }
    Some(json!({
        "encoder": "html",
        "require_field_match": false,
        "fields": Value::Object(fields),
    }))
}

/// Aggregation for a single facet field (spec §4.7 "Facets").
fn facet_aggregation(parsed: &ParsedQuery, field: &str, full_query: &Value) -> Value {
    let size = facet_size_for(parsed, field);
    let values_field = format!("{field}.values");

    let mut agg = if parsed.facet_significant.contains(field) {
        json!({
            "significant_terms": {"field": values_field, "size": size},
            "background_filter": full_query,
        })
    } else if let Some(interval) = parsed.facet_interval.get(field) {
        json!({
            "date_histogram": {"field": values_field, "calendar_interval": interval},
        })
    } else {
        json!({"terms": {"field": values_field, "size": size}})
    };

    if parsed.facet_total.contains(field) {
        agg["aggs"] = json!({"total": {"cardinality": {"field": values_field}}});
    }
    agg
}

/// Expands a `group` field name (e.g. `countries`) into the concrete
/// `properties.<name>` fields whose type maps to that group, for
/// `include_fields` restoration under `dehydrate` (spec §4.7 "Source
/// filtering").
fn expand_group_field(registry: &SchemaRegistry, group: &str) -> Vec<String> {
    let mut out = BTreeSet::new();
    for schema_name in registry.names_all() {
        for prop in registry.effective_properties(&schema_name).values() {
            if prop.type_.group_field() == Some(group) {
                out.insert(format!("properties.{}", prop.name));
            }
        }
    }
    out.into_iter().collect()
}

fn source_filter(parsed: &ParsedQuery, class: &QueryClass, registry: &SchemaRegistry) -> Value {
    if matches!(class, QueryClass::Xref) {
        return json!({"excludes": ["text", "countries", "entityset_ids"]});
    }
    let mut excludes: Vec<String> = entity_search_mapping::mapping::source_excludes().into_iter().map(str::to_string).collect();
    if parsed.dehydrate {
        excludes.push("properties".to_string());
        excludes.push("text".to_string());
    }
    let mut includes: Vec<String> = Vec::new();
    for field in &parsed.include_fields {
        if excludes.contains(field) {
            excludes.retain(|e| e != field);
        }
        let expanded = expand_group_field(registry, field);
        if expanded.is_empty() {
            includes.push(field.clone());
        } else {
            includes.extend(expanded);
        }
    }
    json!({"excludes": excludes, "includes": includes})
}

/// Compiles `parsed` against `class` into a ready-to-send request body
/// (spec §4.7).
pub fn compile(
    parsed: &ParsedQuery,
    class: &QueryClass,
    registry: &SchemaRegistry,
    prefix: &str,
    read_versions: &[String],
) -> QueryResult<CompiledQuery> {
    let policy = class.policy();
    let index = resolve_index(parsed, class, registry, prefix, read_versions)?;

    if let QueryClass::MoreLikeThis(mlt) = class {
        let body = json!({
            "query": {
                "bool": {
                    "must": [{
                        "more_like_this": {
                            "fields": policy.text_fields,
                            "like": [{"_id": mlt.entity_id}],
                            "min_doc_freq": parsed.mlt_min_doc_freq,
                            "min_term_freq": parsed.mlt_min_term_freq,
                            "max_query_terms": parsed.mlt_max_query_terms,
                            "minimum_should_match": parsed.mlt_minimum_should_match,
                        }
                    }],
                    "must_not": [
                        {"ids": {"values": [mlt.entity_id.clone()]}},
                        {"term": {"schema": "Page"}},
                    ],
                }
            },
            "from": parsed.offset,
            "size": parsed.limit,
            "_source": source_filter(parsed, class, registry),
        });
        return Ok(CompiledQuery { index, body });
    }

    let mut bool_query = BoolQuery::default();
    bool_query.must.extend(text_query(parsed, &policy));
    add_synonyms(&mut bool_query, parsed);

    let mut post_filter = BoolQuery::default();
    add_filters(&mut bool_query, &mut post_filter, parsed, &policy);
    add_authorization(&mut bool_query, parsed, &policy);

    if let QueryClass::Match(params) = class {
        bool_query.fold(&params.scoring_query);
        if !params.excludes.is_empty() {
            bool_query.must_not.push(json!({"ids": {"values": params.excludes}}));
        }
    }

    if let QueryClass::GeoDistance(params) = class {
        bool_query.must.push(json!({"exists": {"field": "geo_point"}}));
        bool_query.must_not.push(json!({"ids": {"values": [params.source_id.clone()]}}));
    }

    if matches!(class, QueryClass::Xref) {
        let has_random_or_doubt_sort = parsed.sorts.iter().any(|s| s.field == "random" || s.field == "doubt");
        if !has_random_or_doubt_sort {
            bool_query.filter.push(json!({"range": {"score": {"gt": 0.5}}}));
        }
    }

    let unwrapped_query = bool_query.into_value();
    let query = if policy.function_score {
        wrap_function_score(unwrapped_query.clone())
    } else {
        unwrapped_query.clone()
    };

    let mut body = Map::new();
    body.insert("query".to_string(), query.clone());
    body.insert("from".to_string(), json!(parsed.offset));
    body.insert("size".to_string(), json!(parsed.limit));
    body.insert("sort".to_string(), json!(sort_value(parsed, &policy, class)));
    body.insert("_source".to_string(), source_filter(parsed, class, registry));

    if !post_filter.filter.is_empty() {
        body.insert("post_filter".to_string(), post_filter.into_value());
    }

    if let Some(highlight) = highlight_value(parsed, &policy) {
        body.insert("highlight".to_string(), highlight);
    }

    if !parsed.facets.is_empty() {
        let mut aggs = Map::new();
        for field in &parsed.facets {
            aggs.insert(field.clone(), facet_aggregation(parsed, field, &unwrapped_query));
        }
        body.insert("aggs".to_string(), Value::Object(aggs));
    }

    Ok(CompiledQuery { index, body: Value::Object(body) })
}

/// Builds the standalone authorization-only clause, for callers (e.g.
/// xref iteration) that want just the `datasets_query` shape without a
/// full compiled request (spec §4.9 `XrefStore::iter_matches`).
#[must_use]
pub fn authorization_clause(auth: &SearchAuth, field: &str) -> Value {
    if auth.is_admin {
        return json!({"match_all": {}});
    }
    if auth.datasets.is_empty() {
        return json!({"match_none": {}});
    }
    json!({"terms": {field: auth.datasets}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_search_core::model::SchemaRegistry;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::bundled()
    }

    fn versions() -> Vec<String> {
        vec!["v1".to_string()]
    }

    #[test]
    fn empty_query_is_match_all() {
        let parsed = crate::parser::parse(&[], false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let must = &compiled.body["query"]["function_score"]["query"]["bool"]["must"];
        assert_eq!(must[0], json!({"match_all": {}}));
    }

    #[test]
    fn entities_query_is_wrapped_in_function_score() {
        let parsed = crate::parser::parse(&[("q".to_string(), "putin".to_string())], false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        assert!(compiled.body["query"]["function_score"].is_object());
    }

    #[test]
    fn facet_field_filter_moves_to_post_filter() {
        let pairs = vec![
            ("q".to_string(), "x".to_string()),
            ("facet".to_string(), "schema".to_string()),
            ("filter:schema".to_string(), "Company".to_string()),
        ];
        let parsed = crate::parser::parse(&pairs, false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let main_filter = compiled.body["query"]["function_score"]["query"]["bool"]["filter"].as_array().unwrap();
        assert!(main_filter.is_empty());
        assert_eq!(
            compiled.body["post_filter"]["bool"]["filter"][0],
            json!({"term": {"schema": "Company"}})
        );
        assert!(compiled.body["aggs"]["schema"]["terms"].is_object());
    }

    #[test]
    fn admin_auth_adds_no_filter() {
        let parsed = crate::parser::parse(&[], false, Some(SearchAuth::admin())).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let filter = compiled.body["query"]["function_score"]["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn empty_dataset_auth_yields_match_none() {
        let parsed = crate::parser::parse(&[], false, Some(SearchAuth::for_datasets(vec![]))).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let filter = compiled.body["query"]["function_score"]["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter[0], json!({"match_none": {}}));
    }

    #[test]
    fn more_like_this_excludes_self_and_pages() {
        let parsed = crate::parser::parse(&[], false, None).unwrap();
        let class = QueryClass::MoreLikeThis(crate::classes::MoreLikeThisParams { entity_id: "doc1".to_string() });
        let compiled = compile(&parsed, &class, &registry(), "acme", &versions()).unwrap();
        let must_not = compiled.body["query"]["bool"]["must_not"].as_array().unwrap();
        assert!(must_not.contains(&json!({"term": {"schema": "Page"}})));
        assert!(must_not.contains(&json!({"ids": {"values": ["doc1"]}})));
    }

    #[test]
    fn xref_adds_score_cutoff_unless_random_sort() {
        let parsed = crate::parser::parse(&[], false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Xref, &registry(), "acme", &versions()).unwrap();
        let filter = compiled.body["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filter.contains(&json!({"range": {"score": {"gt": 0.5}}})));
    }

    #[test]
    fn xref_index_is_fixed_name() {
        let parsed = crate::parser::parse(&[], false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Xref, &registry(), "acme", &versions()).unwrap();
        assert_eq!(compiled.index, "acme-xref-v1");
    }

    #[test]
    fn dehydrate_excludes_properties_and_text() {
        let parsed = crate::parser::parse(&[("dehydrate".to_string(), "true".to_string())], false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let excludes = compiled.body["_source"]["excludes"].as_array().unwrap();
        assert!(excludes.iter().any(|v| v == "properties"));
    }

    #[test]
    fn include_fields_expands_group_field_to_schema_properties() {
        let pairs = vec![("include_fields".to_string(), "countries".to_string())];
        let parsed = crate::parser::parse(&pairs, false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        let includes = compiled.body["_source"]["includes"].as_array().unwrap();
        assert!(includes.iter().any(|v| v == "properties.citizenship" || v == "properties.country"));
    }

    #[test]
    fn schema_filter_narrows_index() {
        let pairs = vec![("filter:schema".to_string(), "Person".to_string())];
        let parsed = crate::parser::parse(&pairs, false, None).unwrap();
        let compiled = compile(&parsed, &QueryClass::Entities, &registry(), "acme", &versions()).unwrap();
        assert_eq!(compiled.index, "acme-entity-things-v1");
    }
}
