//! `index-entities -d <dataset> [-i <uri>]` (spec §6 CLI surface, §2
//! "entities -> EntityTransformer -> Ingester -> backend"). Grounded on
//! `original_source/openaleph_search/index/indexer.py`'s
//! `index_entities`/`index_bulk` entry point, adapted to a newline-delimited
//! JSON entity stream read from a file or stdin rather than a remote
//! `FtMStore` iterator (spec §6 "Input entity stream ... core only requires
//! an iterator").

use std::io::BufRead;

use elasticsearch::Elasticsearch;
use entity_search_core::config::Settings;
use entity_search_core::model::{Entity, SchemaRegistry};
use entity_search_core::nameanalysis::NameAnalysis;
use entity_search_ingest::{ingest_stream, BulkIndexingGuard, IngestOp, IngesterConfig, IngestReport};
use entity_search_mapping::topology::{bucket_index, Bucket};
use entity_search_transform::{transform_entity, TransformerConfig};
use tracing::warn;

use crate::error::{CliError, CliResult};

fn read_lines(input: Option<&str>) -> CliResult<Box<dyn BufRead>> {
    match input {
        None | Some("-") => Ok(Box::new(std::io::BufReader::new(std::io::stdin()))),
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| CliError::Input(path.to_string(), e.to_string()))?;
            Ok(Box::new(std::io::BufReader::new(file)))
        }
    }
}

/// Parses one newline-delimited JSON entity stream into [`Entity`] values,
/// skipping and logging malformed lines rather than aborting the whole run
/// (mirrors the Transformer boundary's "skip with a warning" policy, spec §7
/// Validation, applied here one layer up at the parse boundary).
fn parse_entities(input: Option<&str>) -> CliResult<Vec<Entity>> {
    let reader = read_lines(input)?;
    let mut entities = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CliError::Input(input.unwrap_or("-").to_string(), e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Entity>(trimmed) {
            Ok(entity) => entities.push(entity),
            Err(err) => {
                warn!(line = idx + 1, error = %err, "skipping malformed entity line");
            }
        }
    }
    Ok(entities)
}

/// Streams every parsed entity through [`transform_entity`], skipping (and
/// logging) entities whose schema is abstract or whose dataset fails
/// validation — the stream continues (spec §7 "the stream continues").
fn transform_all(registry: &SchemaRegistry, name_analysis: &dyn NameAnalysis, config: &TransformerConfig, dataset: &str, entities: &[Entity], indexed_at: &str) -> Vec<IngestOp> {
    let mut ops = Vec::with_capacity(entities.len());
    for entity in entities {
        match transform_entity(registry, name_analysis, config, dataset, entity, indexed_at) {
            Ok(action) => ops.push(IngestOp::Index(action)),
            Err(err) => warn!(entity = %entity.id, error = %err, "skipping entity"),
        }
    }
    ops
}

/// Drives `index-entities`: parses, transforms, and bulk-ingests every
/// entity read from `input` (file path, or stdin when `None`/`"-"`) into
/// `dataset`. When `bulk_mode` is set, wraps the ingest in a
/// [`BulkIndexingGuard`] across every bucket's write index (spec §4.4
/// "refresh-interval control"), restoring prior settings once ingest
/// finishes — on the error path too, since `?` only returns after the
/// guard has already been asked to restore.
pub async fn run_index_entities(
    client: &Elasticsearch,
    settings: &Settings,
    registry: &SchemaRegistry,
    name_analysis: &dyn NameAnalysis,
    dataset: &str,
    input: Option<&str>,
    bulk_mode: bool,
) -> CliResult<IngestReport> {
    let entities = parse_entities(input)?;
    let indexed_at = chrono::Utc::now().to_rfc3339();
    let transformer_config = TransformerConfig {
        index_prefix: settings.index_prefix.clone(),
        index_write_version: settings.index_write.clone(),
        namespace_ids: settings.namespace_ids,
        namespace_key: settings.index_prefix.clone(),
    };
    let ops = transform_all(registry, name_analysis, &transformer_config, dataset, &entities, &indexed_at);

    let ingester_config = IngesterConfig {
        chunk_size: settings.bulk_chunk_size,
        max_concurrency: settings.bulk_concurrency,
        sync: settings.testing,
        max_retries: settings.max_retries,
    };

    let guard = if bulk_mode {
        let indexes: Vec<String> = Bucket::ALL.iter().map(|&b| bucket_index(&settings.index_prefix, b, &settings.index_write)).collect();
        Some(BulkIndexingGuard::enter(client, &indexes).await?)
    } else {
        None
    };

    let result = ingest_stream(client, ops, ingester_config).await;

    if let Some(guard) = guard {
        guard.restore(client).await;
    }

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_entities_skips_malformed_lines_and_keeps_valid_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"e1","schema":"Person","properties":{{"name":["A"]}}}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"id":"e2","schema":"Person","properties":{{"name":["B"]}}}}"#).unwrap();
        let entities = parse_entities(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id, "e1");
        assert_eq!(entities[1].id, "e2");
    }

    #[test]
    fn parse_entities_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"e1","schema":"Person","properties":{{}}}}"#).unwrap();
        writeln!(file).unwrap();
        let entities = parse_entities(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn transform_all_skips_abstract_schema_entities() {
        let registry = SchemaRegistry::bundled();
        let analysis = entity_search_core::nameanalysis::DefaultNameAnalysis;
        let config = TransformerConfig::default();
        let entities = vec![Entity {
            id: "e1".into(),
            schema: "Thing".into(),
            properties: Default::default(),
            context: Default::default(),
        }];
        let ops = transform_all(&registry, &analysis, &config, "ds1", &entities, "2026-01-01T00:00:00Z");
        assert!(ops.is_empty());
    }
}
