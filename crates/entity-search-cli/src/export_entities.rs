//! `export-entities -d <dataset> [-o <path>]` (SPEC_FULL.md §2, grounded on
//! `original_source/openaleph_search/index/export.py`): a read-only scan of
//! every bucket index, filtered to one dataset, emitted as newline-delimited
//! JSON documents. Independent of search, and the natural counterpart to
//! `index-entities`.

use std::io::Write;

use elasticsearch::Elasticsearch;
use entity_search_core::config::Settings;
use entity_search_core::model::SchemaRegistry;
use entity_search_ingest::scan_dataset;
use entity_search_mapping::topology::entities_read_indexes;
use futures::StreamExt;
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

fn open_output(path: Option<&str>) -> CliResult<Box<dyn Write>> {
    match path {
        None | Some("-") => Ok(Box::new(std::io::stdout())),
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| CliError::Input(path.to_string(), e.to_string()))?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
    }
}

/// Drives `export-entities`: scrolls every configured write-version bucket
/// index for `dataset`, writing one JSON document per line to `output` (a
/// file path, or stdout for `None`/`"-"`). Returns the count exported.
pub async fn run_export_entities(
    client: &Elasticsearch,
    settings: &Settings,
    registry: &SchemaRegistry,
    dataset: &str,
    output: Option<&str>,
) -> CliResult<u64> {
    let indexes = entities_read_indexes(registry, &settings.index_prefix, None, false, std::slice::from_ref(&settings.index_write))?;
    let mut writer = open_output(output)?;
    let mut count: u64 = 0;

    for index in indexes {
        let mut stream = Box::pin(scan_dataset(client, &index, dataset, &settings.xref_scroll, settings.xref_scroll_size));
        while let Some(hit) = stream.next().await {
            match hit {
                Ok(hit) => {
                    let line = serde_json::to_string(&hit.source).map_err(|e| CliError::Backend(e.to_string()))?;
                    writeln!(writer, "{line}").map_err(|e| CliError::Backend(e.to_string()))?;
                    count += 1;
                }
                Err(err) => {
                    warn!(index, error = %err, "scan error, skipping remainder of this index");
                    break;
                }
            }
        }
    }

    info!(dataset, exported = count, "export-entities complete");
    Ok(count)
}
