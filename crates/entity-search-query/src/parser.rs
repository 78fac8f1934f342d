//! Parses an ordered sequence of `(key, value)` pairs into a typed request
//! (spec §4.6), grounded on `original_source/query/util.py` (filter/range
//! query shapes) — `query/parser.py` itself is not present in the retrieved
//! corpus, so the parsing rules below follow spec §4.6's table directly.

use std::collections::{BTreeMap, BTreeSet};

use crate::auth::SearchAuth;
use crate::error::{QueryError, QueryResult};

/// Maximum `offset + limit`, mirroring `index/util.py::MAX_PAGE`.
pub const MAX_PAGE: u64 = 9999;
const DEFAULT_LIMIT: u64 = 20;
const DEFAULT_FACET_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeFilter {
    pub field: String,
    pub op: RangeOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

/// A parsed request, ready for compilation by a query class (spec §4.7).
#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub q: Option<String>,
    pub prefix: Option<String>,
    /// `filter:<field>` — equality, multiple values per field OR'd.
    pub filters: BTreeMap<String, BTreeSet<String>>,
    pub range_filters: Vec<RangeFilter>,
    /// `exclude:<field>` — negation filter.
    pub excludes: BTreeMap<String, BTreeSet<String>>,
    pub facets: BTreeSet<String>,
    pub facet_size: BTreeMap<String, u32>,
    pub facet_total: BTreeSet<String>,
    pub facet_type: BTreeMap<String, String>,
    pub facet_interval: BTreeMap<String, String>,
    pub facet_significant: BTreeSet<String>,
    pub sorts: Vec<SortSpec>,
    pub offset: u64,
    pub limit: u64,
    pub highlight: bool,
    pub dehydrate: bool,
    pub include_fields: BTreeSet<String>,
    pub synonyms: bool,
    pub mlt_min_doc_freq: u32,
    pub mlt_minimum_should_match: String,
    pub mlt_min_term_freq: u32,
    pub mlt_max_query_terms: u32,
    pub auth: Option<SearchAuth>,
}

impl ParsedQuery {
    /// `routing_key` — the unique dataset when exactly one `filter:dataset`
    /// value is present, else `None` (spec §4.6 parser invariant).
    #[must_use]
    pub fn routing_key(&self) -> Option<&str> {
        let values = self.filters.get("dataset")?;
        if values.len() == 1 {
            values.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value, "true" | "1" | "yes" | "on")
}

/// Parses `pairs` into a [`ParsedQuery`]. `auth_mode` mirrors the spec's
/// global auth-mode flag: when set, `auth` being `None` is a fatal error.
pub fn parse(pairs: &[(String, String)], auth_mode: bool, auth: Option<SearchAuth>) -> QueryResult<ParsedQuery> {
    if auth_mode && auth.is_none() {
        return Err(QueryError::AuthRequired);
    }

    let mut parsed = ParsedQuery {
        limit: DEFAULT_LIMIT,
        mlt_min_doc_freq: 1,
        mlt_minimum_should_match: "10%".to_string(),
        mlt_min_term_freq: 1,
        mlt_max_query_terms: 200,
        auth,
        ..ParsedQuery::default()
    };

    for (key, value) in pairs {
        match key.as_str() {
            "q" => parsed.q = Some(value.clone()),
            "prefix" => parsed.prefix = Some(value.clone()),
            "facet" => {
                parsed.facets.insert(value.clone());
            }
            "sort" => {
                let (field, order) = value
                    .split_once(':')
                    .map_or((value.as_str(), SortOrder::Asc), |(f, dir)| {
                        (f, if dir.eq_ignore_ascii_case("desc") { SortOrder::Desc } else { SortOrder::Asc })
                    });
                parsed.sorts.push(SortSpec { field: field.to_string(), order });
            }
            "offset" => {
                parsed.offset = value
                    .parse()
                    .map_err(|_| QueryError::InvalidNumber(value.clone(), "offset"))?;
            }
            "limit" => {
                parsed.limit = value
                    .parse()
                    .map_err(|_| QueryError::InvalidNumber(value.clone(), "limit"))?;
            }
            "highlight" => parsed.highlight = truthy(value),
            "dehydrate" => parsed.dehydrate = truthy(value),
            "synonyms" => parsed.synonyms = truthy(value),
            "include_fields" => {
                parsed.include_fields.extend(value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string));
            }
            "mlt_min_doc_freq" => {
                parsed.mlt_min_doc_freq = value.parse().map_err(|_| QueryError::InvalidNumber(value.clone(), "mlt_min_doc_freq"))?;
            }
            "mlt_minimum_should_match" => parsed.mlt_minimum_should_match = value.clone(),
            "mlt_min_term_freq" => {
                parsed.mlt_min_term_freq = value.parse().map_err(|_| QueryError::InvalidNumber(value.clone(), "mlt_min_term_freq"))?;
            }
            "mlt_max_query_terms" => {
                parsed.mlt_max_query_terms = value.parse().map_err(|_| QueryError::InvalidNumber(value.clone(), "mlt_max_query_terms"))?;
            }
            _ if key.starts_with("filter:") => {
                let rest = &key["filter:".len()..];
                if let Some((op_raw, field)) = rest.split_once(':') {
                    let op = RangeOp::parse(op_raw).ok_or_else(|| QueryError::InvalidRangeOperator(op_raw.to_string(), field.to_string()))?;
                    parsed.range_filters.push(RangeFilter { field: field.to_string(), op, value: value.clone() });
                } else {
                    parsed.filters.entry(rest.to_string()).or_default().insert(value.clone());
                }
            }
            _ if key.starts_with("exclude:") => {
                let field = &key["exclude:".len()..];
                parsed.excludes.entry(field.to_string()).or_default().insert(value.clone());
            }
            _ if key.starts_with("facet_size:") => {
                let field = &key["facet_size:".len()..];
                let size: u32 = value.parse().map_err(|_| QueryError::InvalidNumber(value.clone(), "facet_size"))?;
                parsed.facet_size.insert(field.to_string(), size);
            }
            _ if key.starts_with("facet_total:") => {
                let field = &key["facet_total:".len()..];
                if truthy(value) {
                    parsed.facet_total.insert(field.to_string());
                }
            }
            _ if key.starts_with("facet_type:") => {
                let field = &key["facet_type:".len()..];
                parsed.facet_type.insert(field.to_string(), value.clone());
            }
            _ if key.starts_with("facet_interval:") => {
                let field = &key["facet_interval:".len()..];
                parsed.facet_interval.insert(field.to_string(), value.clone());
            }
            _ if key.starts_with("facet_significant:") => {
                let field = &key["facet_significant:".len()..];
                if truthy(value) {
                    parsed.facet_significant.insert(field.to_string());
                }
            }
            // Unrecognized keys are ignored rather than rejected, so callers
            // can pass through unrelated query-string parameters.
            _ => {}
        }
    }

    if parsed.offset + parsed.limit > MAX_PAGE {
        return Err(QueryError::PageTooDeep(parsed.offset + parsed.limit, MAX_PAGE));
    }

    Ok(parsed)
}

#[must_use]
pub fn facet_size_for(parsed: &ParsedQuery, field: &str) -> u32 {
    parsed.facet_size.get(field).copied().unwrap_or(DEFAULT_FACET_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn repeated_filter_keys_accumulate_into_a_set() {
        let parsed = parse(&pairs(&[("filter:schema", "Person"), ("filter:schema", "Company")]), false, None).unwrap();
        assert_eq!(parsed.filters["schema"].len(), 2);
    }

    #[test]
    fn range_filter_parses_operator_and_field() {
        let parsed = parse(&pairs(&[("filter:gte:amount", "100")]), false, None).unwrap();
        assert_eq!(parsed.range_filters.len(), 1);
        assert_eq!(parsed.range_filters[0].op, RangeOp::Gte);
        assert_eq!(parsed.range_filters[0].field, "amount");
    }

    #[test]
    fn routing_key_is_some_only_for_a_single_dataset_filter() {
        let single = parse(&pairs(&[("filter:dataset", "ds1")]), false, None).unwrap();
        assert_eq!(single.routing_key(), Some("ds1"));

        let multi = parse(&pairs(&[("filter:dataset", "ds1"), ("filter:dataset", "ds2")]), false, None).unwrap();
        assert_eq!(multi.routing_key(), None);
    }

    #[test]
    fn page_too_deep_is_rejected() {
        let result = parse(&pairs(&[("offset", "9990"), ("limit", "20")]), false, None);
        assert!(matches!(result, Err(QueryError::PageTooDeep(..))));
    }

    #[test]
    fn auth_mode_without_auth_object_is_an_error() {
        let result = parse(&[], true, None);
        assert!(matches!(result, Err(QueryError::AuthRequired)));
    }

    #[test]
    fn sort_defaults_to_ascending_without_explicit_direction() {
        let parsed = parse(&pairs(&[("sort", "createdAt")]), false, None).unwrap();
        assert_eq!(parsed.sorts[0].order, SortOrder::Asc);
    }

    #[test]
    fn sort_desc_suffix_is_recognized() {
        let parsed = parse(&pairs(&[("sort", "createdAt:desc")]), false, None).unwrap();
        assert_eq!(parsed.sorts[0].order, SortOrder::Desc);
    }
}
