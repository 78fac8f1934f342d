//! Query-class policies (spec §4.7, §9 Design Notes "Polymorphism over
//! query classes"): each class picks `TEXT_FIELDS`, `PREFIX_FIELD`,
//! `SKIP_FILTERS`, `SOURCE`, `AUTHZ_FIELD`, `SORT_DEFAULT`, and target index
//! scope. Modeled as a sum type over query-kind plus a policy record per
//! variant (no inheritance hierarchy), mirroring
//! `examples/original_source/openaleph_search/query/queries.py`'s
//! `EntitiesQuery`/`MatchQuery`/`GeoDistanceQuery`/`XrefQuery` family.

use serde_json::Value;

/// Parameters specific to [`QueryClass::Match`]: the source entity's
/// matchable schema family (for index scope, spec §4.7 "restricted to the
/// source entity's `schema.matchable_schemata`") and the pre-built scoring
/// query from the Matcher (spec §4.8), folded into the compiled body.
/// The scoring query itself is built by `entity-search-match::matcher` —
/// this crate only knows how to fold an already-built `should`-bool into
/// the `EntitiesQuery` skeleton (DESIGN.md Open Question 2).
#[derive(Debug, Clone)]
pub struct MatchParams {
    pub matchable_schemata: Vec<String>,
    pub excludes: Vec<String>,
    pub scoring_query: Value,
}

/// Parameters specific to [`QueryClass::GeoDistance`]: the source point and
/// ids to exclude (spec §4.7 GeoDistanceQuery).
#[derive(Debug, Clone)]
pub struct GeoDistanceParams {
    pub lat: f64,
    pub lon: f64,
    pub source_id: String,
}

/// Parameters specific to [`QueryClass::MoreLikeThis`] (spec §4.7 MLT).
#[derive(Debug, Clone)]
pub struct MoreLikeThisParams {
    pub entity_id: String,
}

/// The query-class sum type (spec §4.7). `Entities` is the default/base
/// case every other variant generalizes from.
#[derive(Debug, Clone)]
pub enum QueryClass {
    Entities,
    Match(MatchParams),
    GeoDistance(GeoDistanceParams),
    Xref,
    MoreLikeThis(MoreLikeThisParams),
}

/// Per-class policy knobs, computed from the variant rather than stored on
/// it (keeps `QueryClass` a plain data enum).
pub struct ClassPolicy {
    /// Fields (with optional `^boost` suffix) searched by a non-empty `q`.
    pub text_fields: Vec<&'static str>,
    /// Field a `prefix` query targets.
    pub prefix_field: &'static str,
    /// Filter fields dropped entirely for this class (spec §4.6 `SKIP_FILTERS`).
    pub skip_filters: &'static [&'static str],
    /// `filter:names` rewrites to this field (spec §4.6, `util.py::field_filter_query`
    /// rewrites `names` -> `fingerprints`; this system's equivalent fingerprint
    /// field is `name_keys`).
    pub names_filter_target: &'static str,
    /// Field the authorization `terms` filter is applied against.
    pub authz_field: &'static str,
    /// Default sort when the caller supplies none.
    pub sort_default: Vec<Value>,
    /// `true` for classes wrapped in the `num_values` function_score boost.
    pub function_score: bool,
}

impl QueryClass {
    #[must_use]
    pub fn policy(&self) -> ClassPolicy {
        match self {
            Self::Entities | Self::Match(_) | Self::GeoDistance(_) => ClassPolicy {
                text_fields: vec!["names^3", "name_parts^2", "text"],
                prefix_field: "name_parts",
                skip_filters: &["schema", "schemata"],
                names_filter_target: "name_keys",
                authz_field: "dataset",
                sort_default: vec![],
                function_score: matches!(self, Self::Entities | Self::Match(_)),
            },
            Self::Xref => ClassPolicy {
                text_fields: vec!["text"],
                prefix_field: "text",
                skip_filters: &[],
                names_filter_target: "names",
                authz_field: "match_dataset",
                sort_default: vec![serde_json::json!({"score": "desc"})],
                function_score: false,
            },
            Self::MoreLikeThis(_) => ClassPolicy {
                text_fields: vec!["content", "name^2"],
                prefix_field: "name_parts",
                skip_filters: &["schema", "schemata"],
                names_filter_target: "name_keys",
                authz_field: "dataset",
                sort_default: vec![],
                function_score: false,
            },
        }
    }
}
