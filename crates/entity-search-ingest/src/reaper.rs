//! Cross-bucket duplicate reaper (spec §4.5), grounded on
//! `examples/original_source/contrib/cleanup_cross_bucket_duplicates.py`
//! (`BUCKET_CLEANUP_PAIRS`, `find_cross_bucket_duplicates`,
//! `cleanup_cross_bucket_duplicates`).

use elasticsearch::{DeleteByQueryParts, Elasticsearch, SearchParts};
use entity_search_mapping::topology::Bucket;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};
use crate::scan::scan_index;

/// Ordered `(keep, delete)` bucket pairs, most specific first, mirroring
/// `BUCKET_CLEANUP_PAIRS`. Only the `pages`/`documents` pair is enabled by
/// default; the Python original documents `documents`/`things` and
/// `pages`/`things` as commented-out candidates, so they are omitted here
/// too.
pub const DEFAULT_CLEANUP_PAIRS: &[(Bucket, Bucket)] = &[(Bucket::Pages, Bucket::Documents)];

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaperReport {
    pub found: u64,
    pub deleted: u64,
    pub errors: u64,
}

impl ReaperReport {
    fn merge(&mut self, other: Self) {
        self.found += other.found;
        self.deleted += other.deleted;
        self.errors += other.errors;
    }
}

async fn find_ids_in_index(client: &Elasticsearch, index: &str, ids: &[String], dataset: Option<&str>) -> IngestResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let query = dataset.map_or_else(
        || json!({"ids": {"values": ids}}),
        |d| json!({"bool": {"must": [{"ids": {"values": ids}}, {"term": {"dataset": d}}]}}),
    );
    let response = client
        .search(SearchParts::Index(&[index]))
        .body(json!({"query": query, "_source": false, "size": ids.len()}))
        .send()
        .await
        .map_err(|e| IngestError::Bulk(e.to_string()))?;
    let payload: Value = response.json().await.map_err(|e| IngestError::Bulk(e.to_string()))?;
    Ok(payload
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|hit| hit.get("_id").and_then(Value::as_str).map(str::to_string))
        .collect())
}

async fn delete_ids(client: &Elasticsearch, index: &str, ids: &[String], dataset: Option<&str>) -> IngestResult<u64> {
    let query = dataset.map_or_else(
        || json!({"ids": {"values": ids}}),
        |d| json!({"bool": {"must": [{"ids": {"values": ids}}, {"term": {"dataset": d}}]}}),
    );
    let response = client
        .delete_by_query(DeleteByQueryParts::Index(&[index]))
        .conflicts(&["proceed"])
        .wait_for_completion(true)
        .body(json!({"query": query}))
        .send()
        .await
        .map_err(|e| IngestError::Bulk(e.to_string()))?;
    let payload: Value = response.json().await.map_err(|e| IngestError::Bulk(e.to_string()))?;
    Ok(payload.get("deleted").and_then(Value::as_u64).unwrap_or(0))
}

/// Scans `keep_index` in `batch_size` batches and probes `delete_index` for
/// intersecting ids (spec §4.5 steps 1–2).
async fn find_cross_bucket_duplicates(
    client: &Elasticsearch,
    keep_index: &str,
    delete_index: &str,
    dataset: Option<&str>,
    batch_size: usize,
) -> IngestResult<Vec<Vec<String>>> {
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size);
    let scroll = "5m";
    let mut stream = Box::pin(scan_index(client, keep_index, dataset, scroll, batch_size as u32));
    while let Some(hit) = stream.next().await {
        let hit = hit?;
        current.push(hit.id);
        if current.len() >= batch_size {
            let dup = find_ids_in_index(client, delete_index, &current, dataset).await?;
            if !dup.is_empty() {
                batches.push(dup);
            }
            current = Vec::with_capacity(batch_size);
        }
    }
    if !current.is_empty() {
        let dup = find_ids_in_index(client, delete_index, &current, dataset).await?;
        if !dup.is_empty() {
            batches.push(dup);
        }
    }
    Ok(batches)
}

/// Runs the configured cleanup pairs (spec §4.5 step 3–4). `dry_run=true`
/// only reports what would be deleted; `dry_run=false` issues
/// `delete_by_query` batches.
pub async fn run_reaper(
    client: &Elasticsearch,
    prefix: &str,
    write_version: &str,
    pairs: &[(Bucket, Bucket)],
    dataset: Option<&str>,
    dry_run: bool,
    batch_size: usize,
) -> IngestResult<ReaperReport> {
    let mut report = ReaperReport::default();
    for &(keep_bucket, delete_bucket) in pairs {
        let keep_index = entity_search_mapping::topology::bucket_index(prefix, keep_bucket, write_version);
        let delete_index = entity_search_mapping::topology::bucket_index(prefix, delete_bucket, write_version);
        info!(keep = %keep_index, delete = %delete_index, dataset = ?dataset, "scanning for cross-bucket duplicates");

        let batches = find_cross_bucket_duplicates(client, &keep_index, &delete_index, dataset, batch_size).await?;
        for batch in batches {
            let mut batch_report = ReaperReport { found: batch.len() as u64, ..ReaperReport::default() };
            if dry_run {
                info!(count = batch.len(), index = %delete_index, "would delete duplicates (dry run)");
            } else {
                match delete_ids(client, &delete_index, &batch, dataset).await {
                    Ok(deleted) => {
                        info!(deleted, index = %delete_index, "deleted cross-bucket duplicates");
                        batch_report.deleted = deleted;
                    }
                    Err(err) => {
                        warn!(error = %err, batch_size = batch.len(), index = %delete_index, "duplicate batch deletion failed");
                        batch_report.errors = batch.len() as u64;
                    }
                }
            }
            report.merge(batch_report);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pairs_keep_pages_over_documents() {
        assert_eq!(DEFAULT_CLEANUP_PAIRS, &[(Bucket::Pages, Bucket::Documents)]);
    }

    #[test]
    fn report_merge_accumulates_all_fields() {
        let mut a = ReaperReport { found: 1, deleted: 1, errors: 0 };
        let b = ReaperReport { found: 2, deleted: 1, errors: 1 };
        a.merge(b);
        assert_eq!(a.found, 3);
        assert_eq!(a.deleted, 2);
        assert_eq!(a.errors, 1);
    }
}
