//! Lazy scroll/scan iteration over document ids (spec §4.5 step 1, §5 "Scan/
//! scroll iteration is lazy"), grounded on
//! `examples/original_source/contrib/cleanup_cross_bucket_duplicates.py`'s
//! `iter_index_ids` (built on `elasticsearch.helpers.scan`) and the
//! supplemented `scan_dataset` export iterator (SPEC_FULL.md §2).

use elasticsearch::{ClearScrollParts, Elasticsearch, ScrollParts, SearchParts};
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{IngestError, IngestResult};

/// One page of scanned hits, each kept as its raw `_source` plus id.
pub struct ScannedHit {
    pub id: String,
    pub source: Value,
}

struct ScanState {
    client: Elasticsearch,
    scroll: String,
    scroll_id: Option<String>,
    buffer: std::vec::IntoIter<ScannedHit>,
    exhausted: bool,
}

async fn fetch_page(state: &mut ScanState) -> IngestResult<Vec<ScannedHit>> {
    let Some(scroll_id) = state.scroll_id.take() else {
        state.exhausted = true;
        return Ok(Vec::new());
    };
    let response = state
        .client
        .scroll(ScrollParts::None)
        .body(json!({ "scroll": state.scroll, "scroll_id": scroll_id }))
        .send()
        .await
        .map_err(|e| IngestError::Bulk(e.to_string()))?;
    let payload: Value = response.json().await.map_err(|e| IngestError::Bulk(e.to_string()))?;
    state.scroll_id = payload.get("_scroll_id").and_then(Value::as_str).map(str::to_string);
    let hits = payload
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if hits.is_empty() {
        state.exhausted = true;
    }
    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let id = hit.get("_id").and_then(Value::as_str)?.to_string();
            let source = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
            Some(ScannedHit { id, source })
        })
        .collect())
}

/// Opens a lazy scroll over `index`, optionally restricted to `dataset`,
/// yielding [`ScannedHit`]s page by page. The scroll context is released
/// (`clear_scroll`) once the stream is fully drained; a consumer that stops
/// polling early (spec §5 cancellation) leaves the context to expire
/// server-side at the `scroll` keep-alive instead — the official client has
/// no synchronous drop hook for an in-flight scroll, so this is a
/// documented simplification rather than an active clear on cancellation.
pub fn scan_index<'a>(
    client: &'a Elasticsearch,
    index: &'a str,
    dataset: Option<&'a str>,
    scroll: &'a str,
    scroll_size: u32,
) -> impl Stream<Item = IngestResult<ScannedHit>> + 'a {
    let query = dataset.map_or_else(|| json!({"match_all": {}}), |d| json!({"term": {"dataset": d}}));
    scan_index_with_query(client, index, query, scroll, scroll_size)
}

/// As [`scan_index`], but takes an arbitrary pre-built query instead of a
/// bare dataset term — used by callers (xref iteration) that need to fold
/// an authorization clause or other filters into the scan (spec §4.9
/// `XrefStore::iter_matches`).
pub fn scan_index_with_query<'a>(
    client: &'a Elasticsearch,
    index: &'a str,
    query: Value,
    scroll: &'a str,
    scroll_size: u32,
) -> impl Stream<Item = IngestResult<ScannedHit>> + 'a {
    stream::unfold(None::<ScanState>, move |state| {
        let query = query.clone();
        async move {
            let mut state = match state {
                Some(state) => state,
                None => {
                    let response = match client
                        .search(SearchParts::Index(&[index]))
                        .scroll(scroll)
                        .size(i64::from(scroll_size))
                        .body(json!({ "query": query, "_source": true }))
                        .send()
                        .await
                    {
                        Ok(response) => response,
                        Err(err) => return Some((Err(IngestError::Bulk(err.to_string())), None)),
                    };
                    let payload: Value = match response.json().await {
                        Ok(payload) => payload,
                        Err(err) => return Some((Err(IngestError::Bulk(err.to_string())), None)),
                    };
                    let scroll_id = payload.get("_scroll_id").and_then(Value::as_str).map(str::to_string);
                    let hits = payload
                        .get("hits")
                        .and_then(|h| h.get("hits"))
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    let exhausted = hits.is_empty();
                    let scanned: Vec<ScannedHit> = hits
                        .into_iter()
                        .filter_map(|hit| {
                            let id = hit.get("_id").and_then(Value::as_str)?.to_string();
                            let source = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
                            Some(ScannedHit { id, source })
                        })
                        .collect();
                    ScanState {
                        client: client.clone(),
                        scroll: scroll.to_string(),
                        scroll_id,
                        buffer: scanned.into_iter(),
                        exhausted,
                    }
                }
            };

            if let Some(hit) = state.buffer.next() {
                return Some((Ok(hit), Some(state)));
            }
            if state.exhausted {
                if let Some(scroll_id) = state.scroll_id.clone() {
                    if let Err(err) = state
                        .client
                        .clear_scroll(ClearScrollParts::None)
                        .body(json!({ "scroll_id": [scroll_id] }))
                        .send()
                        .await
                    {
                        warn!(error = %err, "failed to clear scroll context");
                    }
                }
                return None;
            }
            match fetch_page(&mut state).await {
                Ok(page) => {
                    state.buffer = page.into_iter();
                    match state.buffer.next() {
                        Some(hit) => Some((Ok(hit), Some(state))),
                        None => None,
                    }
                }
                Err(err) => Some((Err(err), None)),
            }
        }
    })
}
