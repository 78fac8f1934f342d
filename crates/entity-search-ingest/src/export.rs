//! Full scan/export of a dataset's documents (SPEC_FULL.md §2, grounded on
//! `examples/original_source/openaleph_search/index/export.py`):
//! independent of search, used by the reaper's sibling tooling and by xref
//! cleanup, and surfaced as the CLI's `export-entities` subcommand.

use elasticsearch::Elasticsearch;
use futures::{Stream, StreamExt};

use crate::error::IngestResult;
use crate::scan::{scan_index, ScannedHit};

/// Scrolls every document in `index` belonging to `dataset`, yielding each
/// document's raw `_source` alongside its id.
pub fn scan_dataset<'a>(
    client: &'a Elasticsearch,
    index: &'a str,
    dataset: &'a str,
    scroll: &'a str,
    scroll_size: u32,
) -> impl Stream<Item = IngestResult<ScannedHit>> + 'a {
    scan_index(client, index, Some(dataset), scroll, scroll_size)
}

/// Convenience wrapper collecting the full scan into memory. Intended for
/// CLI export and test fixtures, not for production-size datasets — callers
/// processing large datasets should consume [`scan_dataset`] directly.
pub async fn collect_dataset(
    client: &Elasticsearch,
    index: &str,
    dataset: &str,
    scroll: &str,
    scroll_size: u32,
) -> IngestResult<Vec<ScannedHit>> {
    let mut out = Vec::new();
    let mut stream = Box::pin(scan_dataset(client, index, dataset, scroll, scroll_size));
    while let Some(hit) = stream.next().await {
        out.push(hit?);
    }
    Ok(out)
}
