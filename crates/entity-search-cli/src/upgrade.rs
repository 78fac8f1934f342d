//! `upgrade`/`reset` command bodies (spec §6 CLI surface, §4.1 "Applying
//! mappings uses merge-safe rewriting"). Grounded on
//! `original_source/openaleph_search/index/util.py` (`configure_index`,
//! `upgrade_search`) and
//! `examples/other_examples/10370d50_i-dream-of-ai-elasticsearch__...base_tools.rs.rs`
//! for the `elasticsearch::indices()` call shape.

use elasticsearch::http::response::Response;
use elasticsearch::indices::{
    IndicesCloseParts, IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetMappingParts,
    IndicesGetSettingsParts, IndicesOpenParts, IndicesPutMappingParts, IndicesPutSettingsParts,
};
use elasticsearch::Elasticsearch;
use entity_search_core::config::Settings;
use entity_search_core::model::SchemaRegistry;
use entity_search_mapping::mapping::{all_buckets_mappings, index_settings, rewrite_mapping_safe, settings_changed, xref_mapping};
use entity_search_mapping::topology::{bucket_index, xref_index, Bucket};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

async fn backend_json(response: Response) -> CliResult<Value> {
    response.json().await.map_err(|e| CliError::Backend(e.to_string()))
}

async fn index_exists(client: &Elasticsearch, index: &str) -> CliResult<bool> {
    let response = client
        .indices()
        .exists(IndicesExistsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| CliError::Backend(e.to_string()))?;
    Ok(response.status_code().is_success())
}

async fn create_index(client: &Elasticsearch, index: &str, mapping: &Value, settings: &Value) -> CliResult<()> {
    let body = json!({"settings": settings, "mappings": mapping});
    client
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(body)
        .send()
        .await
        .map_err(|e| CliError::Backend(e.to_string()))?;
    info!(index, "created index");
    Ok(())
}

async fn existing_mapping(client: &Elasticsearch, index: &str) -> CliResult<Value> {
    let response = client
        .indices()
        .get_mapping(IndicesGetMappingParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| CliError::Backend(e.to_string()))?;
    let payload = backend_json(response).await?;
    Ok(payload.get(index).and_then(|v| v.get("mappings")).cloned().unwrap_or_else(|| json!({})))
}

async fn existing_analysis_settings(client: &Elasticsearch, index: &str) -> CliResult<Value> {
    let response = client
        .indices()
        .get_settings(IndicesGetSettingsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| CliError::Backend(e.to_string()))?;
    let payload = backend_json(response).await?;
    Ok(payload
        .get(index)
        .and_then(|v| v.get("settings"))
        .and_then(|v| v.get("index"))
        .and_then(|v| v.get("analysis"))
        .cloned()
        .unwrap_or_else(|| json!({})))
}

/// Reconciles one already-existing index's mapping and analysis settings
/// (spec §4.1 "Applying mappings uses merge-safe rewriting"): mapping
/// updates are pushed in place; a settings change closes, pushes, and
/// reopens the index only if [`settings_changed`] detects a real diff.
async fn reconcile_index(client: &Elasticsearch, index: &str, pending_mapping: &Value, pending_analysis: &Value) -> CliResult<()> {
    let existing_mapping_doc = existing_mapping(client, index).await?;
    let merged_mapping = rewrite_mapping_safe(pending_mapping, &existing_mapping_doc);
    if merged_mapping != existing_mapping_doc {
        client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(&merged_mapping)
            .send()
            .await
            .map_err(|e| CliError::Backend(e.to_string()))?;
        info!(index, "mapping updated");
    } else {
        info!(index, "mapping unchanged");
    }

    let existing_analysis = existing_analysis_settings(client, index).await?;
    if settings_changed(pending_analysis, &existing_analysis) {
        client
            .indices()
            .close(IndicesCloseParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| CliError::Backend(e.to_string()))?;
        let result = client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index]))
            .body(json!({"analysis": pending_analysis}))
            .send()
            .await
            .map_err(|e| CliError::Backend(e.to_string()));
        client
            .indices()
            .open(IndicesOpenParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| CliError::Backend(e.to_string()))?;
        result?;
        info!(index, "settings updated (closed/reopened)");
    } else {
        info!(index, "settings unchanged, no close/open cycle");
    }
    Ok(())
}

/// Names every index this deployment's prefix currently owns or could own:
/// the write-version bucket indexes, every configured read-version bucket
/// index, and the xref index (spec §6 "reset ... drop all known indexes").
#[must_use]
pub fn known_indexes(settings: &Settings) -> Vec<String> {
    let mut names = Vec::new();
    for &bucket in &Bucket::ALL {
        names.push(bucket_index(&settings.index_prefix, bucket, &settings.index_write));
        for version in &settings.index_read {
            names.push(bucket_index(&settings.index_prefix, bucket, version));
        }
    }
    names.sort();
    names.dedup();
    names.push(xref_index(&settings.index_prefix));
    names
}

/// `upgrade` (spec §6): creates each bucket's write index plus the xref
/// index if missing, otherwise reconciles mapping/settings in place.
pub async fn run_upgrade(client: &Elasticsearch, settings: &Settings, registry: &SchemaRegistry) -> CliResult<()> {
    let analysis = entity_search_mapping::mapping::analysis_settings();
    let idx_settings = index_settings(settings.index_shards, settings.index_replicas);

    for (bucket, mapping) in all_buckets_mappings(registry) {
        let index = bucket_index(&settings.index_prefix, bucket, &settings.index_write);
        if index_exists(client, &index).await? {
            reconcile_index(client, &index, &mapping, &analysis).await?;
        } else {
            create_index(client, &index, &mapping, &idx_settings).await?;
        }
    }

    let xref = xref_index(&settings.index_prefix);
    let xref_mapping_doc = xref_mapping();
    if index_exists(client, &xref).await? {
        reconcile_index(client, &xref, &xref_mapping_doc, &analysis).await?;
    } else {
        create_index(client, &xref, &xref_mapping_doc, &idx_settings).await?;
    }
    Ok(())
}

/// `reset` (spec §6): deletes every known index for this prefix, ignoring
/// 404s (already gone), then re-runs `upgrade` to recreate them.
pub async fn run_reset(client: &Elasticsearch, settings: &Settings, registry: &SchemaRegistry) -> CliResult<()> {
    for index in known_indexes(settings) {
        match client.indices().delete(IndicesDeleteParts::Index(&[&index])).send().await {
            Ok(response) if response.status_code().is_success() || response.status_code().as_u16() == 404 => {
                info!(index, "dropped index");
            }
            Ok(response) => {
                warn!(index, status = %response.status_code(), "unexpected status dropping index");
            }
            Err(err) => {
                warn!(index, error = %err, "failed to drop index");
            }
        }
    }
    run_upgrade(client, settings, registry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_indexes_includes_every_bucket_and_xref() {
        let settings = Settings { index_prefix: "acme".to_string(), index_write: "v1".to_string(), index_read: vec!["v1".to_string()], ..Settings::default() };
        let names = known_indexes(&settings);
        assert!(names.contains(&"acme-entity-things-v1".to_string()));
        assert!(names.contains(&"acme-entity-pages-v1".to_string()));
        assert!(names.contains(&"acme-xref-v1".to_string()));
    }

    #[test]
    fn known_indexes_unions_read_and_write_versions() {
        let settings = Settings {
            index_prefix: "acme".to_string(),
            index_write: "v2".to_string(),
            index_read: vec!["v1".to_string(), "v2".to_string()],
            ..Settings::default()
        };
        let names = known_indexes(&settings);
        assert!(names.contains(&"acme-entity-things-v1".to_string()));
        assert!(names.contains(&"acme-entity-things-v2".to_string()));
    }
}
