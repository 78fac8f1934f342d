//! Scoped "bulk-indexing mode" (spec §4.4): temporarily relaxes
//! `refresh_interval`, translog durability and replica count across a set
//! of indexes for the duration of a large load, restoring the prior
//! settings on every exit path. Grounded on
//! `examples/original_source/openaleph_search/index/util.py`'s
//! `configure_index`/`check_settings_changed` pair, generalized from a
//! mapping-install helper into a guard object.

use elasticsearch::indices::IndicesPutSettingsParts;
use elasticsearch::Elasticsearch;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{IngestError, IngestResult};

const BULK_REFRESH_INTERVAL: &str = "300s";
const BULK_TRANSLOG_DURABILITY: &str = "async";
const BULK_TRANSLOG_SYNC_INTERVAL: &str = "30s";
const BULK_REPLICAS: &str = "0";

fn bulk_settings_body() -> Value {
    json!({
        "index": {
            "refresh_interval": BULK_REFRESH_INTERVAL,
            "number_of_replicas": BULK_REPLICAS,
            "translog": {
                "durability": BULK_TRANSLOG_DURABILITY,
                "sync_interval": BULK_TRANSLOG_SYNC_INTERVAL,
            },
        }
    })
}

async fn current_settings(client: &Elasticsearch, index: &str) -> IngestResult<Value> {
    let response = client
        .indices()
        .get_settings(elasticsearch::indices::IndicesGetSettingsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| IngestError::SettingsToggle { index: index.to_string(), message: e.to_string() })?;
    let payload: Value = response
        .json()
        .await
        .map_err(|e| IngestError::SettingsToggle { index: index.to_string(), message: e.to_string() })?;
    let settings = payload
        .get(index)
        .and_then(|v| v.get("settings"))
        .and_then(|v| v.get("index"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    Ok(json!({
        "index": {
            "refresh_interval": settings.get("refresh_interval").cloned().unwrap_or_else(|| json!("1s")),
            "number_of_replicas": settings.get("number_of_replicas").cloned().unwrap_or_else(|| json!("0")),
            "translog": {
                "durability": settings.get("translog").and_then(|t| t.get("durability")).cloned().unwrap_or_else(|| json!("request")),
                "sync_interval": settings.get("translog").and_then(|t| t.get("sync_interval")).cloned().unwrap_or_else(|| json!("5s")),
            },
        }
    }))
}

async fn put_settings(client: &Elasticsearch, index: &str, body: Value) -> IngestResult<()> {
    let response = client
        .indices()
        .put_settings(IndicesPutSettingsParts::Index(&[index]))
        .body(body)
        .send()
        .await
        .map_err(|e| IngestError::SettingsToggle { index: index.to_string(), message: e.to_string() })?;
    if !response.status_code().is_success() {
        return Err(IngestError::SettingsToggle {
            index: index.to_string(),
            message: format!("put_settings returned {}", response.status_code()),
        });
    }
    Ok(())
}

/// Holds the pre-bulk settings for a set of indexes so they can be restored
/// on drop-equivalent cleanup. Callers MUST call [`BulkIndexingGuard::restore`]
/// on every exit path (including error and cancellation paths) — this type
/// does not implement `Drop` because restoration is an async operation.
pub struct BulkIndexingGuard {
    saved: Vec<(String, Value)>,
}

impl BulkIndexingGuard {
    /// Enters bulk-indexing mode across `indexes`, recording prior settings.
    pub async fn enter(client: &Elasticsearch, indexes: &[String]) -> IngestResult<Self> {
        let mut saved = Vec::with_capacity(indexes.len());
        for index in indexes {
            let prior = current_settings(client, index).await?;
            put_settings(client, index, bulk_settings_body()).await?;
            info!(index = %index, "entered bulk-indexing mode");
            saved.push((index.clone(), prior));
        }
        Ok(Self { saved })
    }

    /// Restores the settings captured at [`Self::enter`]. Idempotent: safe
    /// to call after a partial failure, since each index's settings are
    /// restored independently and failures are logged rather than
    /// propagated (restoring observability is better-effort than the
    /// initial write).
    pub async fn restore(self, client: &Elasticsearch) {
        for (index, prior) in self.saved {
            if let Err(err) = put_settings(client, &index, prior).await {
                warn!(index = %index, error = %err, "failed to restore settings after bulk-indexing mode");
            } else {
                info!(index = %index, "restored settings after bulk-indexing mode");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_settings_body_disables_refresh_and_replicas() {
        let body = bulk_settings_body();
        assert_eq!(body["index"]["refresh_interval"], BULK_REFRESH_INTERVAL);
        assert_eq!(body["index"]["number_of_replicas"], BULK_REPLICAS);
        assert_eq!(body["index"]["translog"]["durability"], BULK_TRANSLOG_DURABILITY);
    }
}
