//! Cross-reference match storage (spec §4.9 `XrefStore`), grounded on
//! `original_source/index/xref.py` (`xref_id`, `iter_matches`,
//! `delete_xref`/`delete_dataset_xref`) and the teacher's idempotent-id
//! convention (`mcp-agent-mail-db/src/search_candidates.rs` hashes
//! candidate pairs the same way this hashes entity pairs). Writes route
//! through `entity_search_ingest::ingest_stream`; deletes use
//! `delete_by_query` with `conflicts=proceed`, mirroring
//! `entity_search_ingest::reaper`.

use elasticsearch::{DeleteByQueryParts, Elasticsearch};
use entity_search_ingest::{ingest_stream, IngestOp, IngesterConfig, IngestReport};
use entity_search_query::SearchAuth;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{MatchError, MatchResult};

/// A persisted scored match pair (spec §3 "Xref record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XrefRecord {
    pub entity_id: String,
    pub dataset: String,
    pub schema: String,
    pub match_id: String,
    pub match_dataset: String,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub text: Vec<String>,
    pub score: f64,
    pub doubt: f64,
    pub method: String,
    pub random: u32,
    #[serde(default)]
    pub entityset_ids: Vec<String>,
    pub created_at: String,
}

/// Uniformly random tiebreaker (SPEC_FULL §2, `index/xref.py`'s `random`
/// field, predating `doubt`): callers stamp this onto a new [`XrefRecord`]
/// before writing; `sort=random` in `XrefQuery` orders on it directly.
#[must_use]
pub fn random_tiebreaker() -> u32 {
    rand::random()
}

/// Stable hash of `(entity_id, dataset, match_id)` (spec §3: "keyed ... so
/// that re-emitting an identical pair is idempotent").
#[must_use]
pub fn xref_id(entity_id: &str, dataset: &str, match_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(dataset.as_bytes());
    hasher.update(b"\0");
    hasher.update(match_id.as_bytes());
    hex::encode(hasher.finalize())
}

impl XrefRecord {
    #[must_use]
    pub fn id(&self) -> String {
        xref_id(&self.entity_id, &self.dataset, &self.match_id)
    }

    fn source(&self) -> Value {
        json!({
            "entity_id": self.entity_id,
            "dataset": self.dataset,
            "schema": self.schema,
            "match_id": self.match_id,
            "match_dataset": self.match_dataset,
            "countries": self.countries,
            "text": self.text,
            "score": self.score,
            "doubt": self.doubt,
            "method": self.method,
            "random": self.random,
            "entityset_ids": self.entityset_ids,
            "created_at": self.created_at,
        })
    }
}

/// Writes `records` to the xref index through the Ingester, routing on
/// `entity_id` (one side of each pair collocates its own shard). Re-writing
/// an identical `(entity_id, dataset, match_id)` triple is a no-op replace,
/// per the content-addressed id (spec §3).
pub async fn write_matches(client: &Elasticsearch, xref_index: &str, records: Vec<XrefRecord>, sync: bool) -> MatchResult<IngestReport> {
    let ops: Vec<IngestOp> = records
        .into_iter()
        .map(|record| {
            IngestOp::Index(entity_search_transform::IndexAction {
                id: record.id(),
                index: xref_index.to_string(),
                routing: record.entity_id.clone(),
                source: record.source(),
            })
        })
        .collect();
    let config = IngesterConfig { sync, ..IngesterConfig::default() };
    Ok(ingest_stream(client, ops, config).await?)
}

/// Authorized scan over the xref index (spec §4.9 `iter_matches`):
/// `dataset == dataset AND match_dataset ∈ auth.datasets` (or `match_all`
/// for an admin).
pub fn iter_matches_query(dataset: &str, auth: &SearchAuth) -> Value {
    let authz = entity_search_query::compiler::authorization_clause(auth, "match_dataset");
    json!({
        "bool": {
            "must": [
                {"term": {"dataset": dataset}},
                authz,
            ]
        }
    })
}

/// Scrolls every xref record visible to `auth` for `dataset`, yielding raw
/// `_source` + id pairs (spec §4.9 `iter_matches`).
pub fn iter_matches<'a>(
    client: &'a Elasticsearch,
    xref_index: &'a str,
    dataset: &'a str,
    auth: &'a SearchAuth,
    scroll: &'a str,
    scroll_size: u32,
) -> impl futures::Stream<Item = entity_search_ingest::IngestResult<entity_search_ingest::ScannedHit>> + 'a {
    entity_search_ingest::scan_index_with_query(client, xref_index, iter_matches_query(dataset, auth), scroll, scroll_size)
}

/// Deletes every xref record naming `dataset` on either side (spec §4.9
/// "Deletion accepts either a whole dataset ... matching either side").
pub async fn delete_dataset(client: &Elasticsearch, xref_index: &str, dataset: &str) -> MatchResult<u64> {
    let query = json!({
        "bool": {
            "should": [
                {"term": {"dataset": dataset}},
                {"term": {"match_dataset": dataset}},
            ],
            "minimum_should_match": 1,
        }
    });
    delete_by_query(client, xref_index, query).await
}

/// Deletes every xref record naming `entity_id` on either side (spec §4.9
/// "or by a single entity id").
pub async fn delete_entity(client: &Elasticsearch, xref_index: &str, entity_id: &str) -> MatchResult<u64> {
    let query = json!({
        "bool": {
            "should": [
                {"term": {"entity_id": entity_id}},
                {"term": {"match_id": entity_id}},
            ],
            "minimum_should_match": 1,
        }
    });
    delete_by_query(client, xref_index, query).await
}

async fn delete_by_query(client: &Elasticsearch, xref_index: &str, query: Value) -> MatchResult<u64> {
    let response = client
        .delete_by_query(DeleteByQueryParts::Index(&[xref_index]))
        .conflicts(&["proceed"])
        .wait_for_completion(true)
        .body(json!({"query": query}))
        .send()
        .await
        .map_err(|e| MatchError::Backend(e.to_string()))?;
    let payload: Value = response.json().await.map_err(|e| MatchError::Backend(e.to_string()))?;
    Ok(payload.get("deleted").and_then(Value::as_u64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entity_id: &str, match_id: &str) -> XrefRecord {
        XrefRecord {
            entity_id: entity_id.to_string(),
            dataset: "ds1".to_string(),
            schema: "Person".to_string(),
            match_id: match_id.to_string(),
            match_dataset: "ds2".to_string(),
            countries: vec!["ru".to_string()],
            text: vec![],
            score: 0.9,
            doubt: 0.1,
            method: "name-matcher".to_string(),
            random: 0,
            entityset_ids: vec![],
            created_at: "2026-01-01T00:00:00".to_string(),
        }
    }

    #[test]
    fn random_tiebreaker_is_not_always_the_same_value() {
        let samples: std::collections::BTreeSet<u32> = (0..16).map(|_| random_tiebreaker()).collect();
        assert!(samples.len() > 1, "expected variation across 16 draws");
    }

    #[test]
    fn xref_id_is_deterministic_and_order_sensitive() {
        let a = xref_id("e1", "ds1", "e2");
        let b = xref_id("e1", "ds1", "e2");
        let c = xref_id("e2", "ds1", "e1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn record_id_matches_free_function() {
        let rec = record("e1", "e2");
        assert_eq!(rec.id(), xref_id("e1", "ds1", "e2"));
    }

    #[test]
    fn iter_matches_query_scopes_to_dataset_and_auth() {
        let auth = SearchAuth::for_datasets(vec!["ds2".to_string()]);
        let query = iter_matches_query("ds1", &auth);
        let must = query["bool"]["must"].as_array().unwrap();
        assert!(must.contains(&json!({"term": {"dataset": "ds1"}})));
        assert!(must.iter().any(|c| c["terms"]["match_dataset"] == json!(["ds2"])));
    }

    #[test]
    fn iter_matches_query_is_match_none_for_empty_auth() {
        let auth = SearchAuth::for_datasets(vec![]);
        let query = iter_matches_query("ds1", &auth);
        let must = query["bool"]["must"].as_array().unwrap();
        assert!(must.contains(&json!({"match_none": {}})));
    }

    #[test]
    fn admin_auth_bypasses_dataset_restriction() {
        let auth = SearchAuth::admin();
        let query = iter_matches_query("ds1", &auth);
        let must = query["bool"]["must"].as_array().unwrap();
        assert!(must.contains(&json!({"match_all": {}})));
    }
}
