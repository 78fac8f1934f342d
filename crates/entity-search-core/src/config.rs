//! Environment-sourced configuration, mirroring the teacher's
//! `DbPoolConfig::from_env` convention (`mcp-agent-mail-db/src/pool.rs`):
//! every field has a sane default, and `ENTITY_SEARCH_*` environment
//! variables override it. Defaults are taken from
//! `original_source/openaleph_search/settings.py` where the spec itself is
//! silent on a concrete number.

use std::env;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

const ENV_PREFIX: &str = "ENTITY_SEARCH_";

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn parse_env<T>(suffix: &str, default: T) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(suffix) {
        Some(raw) => raw.parse().map_err(|e| {
            CoreError::Config(format!("ENTITY_SEARCH_{suffix}: invalid value {raw:?}: {e}"))
        }),
        None => Ok(default),
    }
}

/// Backend connection and indexing defaults, read once at process startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Comma-separated backend node URLs (`http://localhost:9200` if unset).
    pub hosts: Vec<String>,
    /// Distinct ingest-role hosts, if configured; falls back to `hosts`
    /// when empty (spec §6 "backend URL(s) for search and ingest").
    pub ingest_hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Number of primary shards for newly created indexes.
    pub index_shards: u32,
    /// Number of replicas for newly created indexes.
    pub index_replicas: u32,
    /// `refresh_interval` applied to newly created entity indexes (spec §6).
    pub index_refresh_interval: String,
    /// Index name prefix (spec §6 `index_prefix`).
    pub index_prefix: String,
    /// The single write version (spec §6 `index_write`).
    pub index_write: String,
    /// One or more read versions, unioned for read queries (spec §6 `index_read[]`).
    pub index_read: Vec<String>,
    /// Soft cap on the number of schemata/indexes a single expanded query
    /// scope may touch before the caller should narrow it (spec §6
    /// `index_expand_clause_limit`); advisory, enforced by callers of
    /// `entity-search-mapping::topology::schema_scope`.
    pub index_expand_clause_limit: u32,
    /// Batch size passed to `delete_by_query`'s `scroll_size` (spec §6
    /// `index_delete_by_query_batchsize`), used by the reaper and xref deletion.
    pub index_delete_by_query_batchsize: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Number of automatic retries on a retryable transport error.
    pub max_retries: u32,
    /// Whether the client should retry automatically on a request timeout.
    pub retry_on_timeout: bool,
    /// Scroll keep-alive used by xref scan/export operations (e.g. `"5m"`).
    pub xref_scroll: String,
    /// Page size used by xref scan/export operations.
    pub xref_scroll_size: u32,
    /// Maximum in-flight bulk requests during ingest.
    pub bulk_concurrency: usize,
    /// Number of actions per bulk chunk.
    pub bulk_chunk_size: usize,
    /// Soft cap on a single bulk chunk's serialized byte size (spec §6
    /// `indexer_max_chunk_bytes`); the ingester itself chunks by document
    /// count, this is advisory for producers that pre-batch by size.
    pub bulk_max_chunk_bytes: u64,
    /// Whether to namespace entity ids on write (spec Open Question 3,
    /// see DESIGN.md). Defaults off.
    pub namespace_ids: bool,
    /// `testing`/`debug` (spec §6): forces `refresh=true` globally so
    /// writes are immediately visible, mirroring `refresh_sync()`'s
    /// `settings.testing` short-circuit.
    pub testing: bool,
    /// Global auth-mode flag (spec §4.6/§4.7/§7): when set, a query parsed
    /// without a `SearchAuth` is a fatal error rather than an open query.
    pub search_auth_required: bool,
}

impl Settings {
    /// Reads configuration from `ENTITY_SEARCH_*` environment variables,
    /// falling back to defaults drawn from the original Python
    /// implementation's `Settings` model.
    pub fn from_env() -> CoreResult<Self> {
        let hosts = env_var("HOSTS")
            .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(|| vec!["http://localhost:9200".to_string()]);

        let timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", 60)?;
        let ingest_hosts = env_var("INGEST_HOSTS")
            .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_default();
        let index_read = env_var("INDEX_READ")
            .map(|raw| raw.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(|| vec!["v1".to_string()]);
        // `testing`/`debug` are accepted as aliases, mirroring the original's
        // `validation_alias=AliasChoices("testing", "debug")`.
        let testing = match env_var("TESTING") {
            Some(raw) => raw.parse().map_err(|e| CoreError::Config(format!("ENTITY_SEARCH_TESTING: invalid value {raw:?}: {e}")))?,
            None => parse_env("DEBUG", false)?,
        };

        Ok(Self {
            hosts,
            ingest_hosts,
            username: env_var("USERNAME"),
            password: env_var("PASSWORD"),
            index_shards: parse_env("INDEX_SHARDS", 5)?,
            index_replicas: parse_env("INDEX_REPLICAS", 0)?,
            index_refresh_interval: env_var("INDEX_REFRESH_INTERVAL").unwrap_or_else(|| "1s".to_string()),
            index_prefix: env_var("INDEX_PREFIX").unwrap_or_else(|| "entity-search".to_string()),
            index_write: env_var("INDEX_WRITE").unwrap_or_else(|| "v1".to_string()),
            index_read,
            index_expand_clause_limit: parse_env("INDEX_EXPAND_CLAUSE_LIMIT", 10)?,
            index_delete_by_query_batchsize: parse_env("INDEX_DELETE_BY_QUERY_BATCHSIZE", 100)?,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_env("MAX_RETRIES", 3)?,
            retry_on_timeout: parse_env("RETRY_ON_TIMEOUT", true)?,
            xref_scroll: env_var("XREF_SCROLL").unwrap_or_else(|| "5m".to_string()),
            xref_scroll_size: parse_env("XREF_SCROLL_SIZE", 1000)?,
            bulk_concurrency: parse_env("BULK_CONCURRENCY", 25)?,
            bulk_chunk_size: parse_env("BULK_CHUNK_SIZE", 500)?,
            bulk_max_chunk_bytes: parse_env("BULK_MAX_CHUNK_BYTES", 10 * 1024 * 1024)?,
            namespace_ids: parse_env("NAMESPACE_IDS", false)?,
            testing,
            search_auth_required: parse_env("SEARCH_AUTH_REQUIRED", false)?,
        })
    }

    /// Hosts to use for the ingest role: `ingest_hosts` if configured,
    /// otherwise the search `hosts` (mirrors `core.py::_ingest_nodes()`).
    #[must_use]
    pub fn ingest_hosts(&self) -> &[String] {
        if self.ingest_hosts.is_empty() {
            &self.hosts
        } else {
            &self.ingest_hosts
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".to_string()],
            ingest_hosts: Vec::new(),
            username: None,
            password: None,
            index_shards: 5,
            index_replicas: 0,
            index_refresh_interval: "1s".to_string(),
            index_prefix: "entity-search".to_string(),
            index_write: "v1".to_string(),
            index_read: vec!["v1".to_string()],
            index_expand_clause_limit: 10,
            index_delete_by_query_batchsize: 100,
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_on_timeout: true,
            xref_scroll: "5m".to_string(),
            xref_scroll_size: 1000,
            bulk_concurrency: 25,
            bulk_chunk_size: 500,
            bulk_max_chunk_bytes: 10 * 1024 * 1024,
            namespace_ids: false,
            testing: false,
            search_auth_required: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_source_settings() {
        let s = Settings::default();
        assert_eq!(s.index_shards, 5);
        assert_eq!(s.index_replicas, 0);
        assert_eq!(s.request_timeout, Duration::from_secs(60));
        assert_eq!(s.max_retries, 3);
        assert!(s.retry_on_timeout);
        assert_eq!(s.xref_scroll, "5m");
        assert_eq!(s.xref_scroll_size, 1000);
        assert!(!s.namespace_ids);
    }

    #[test]
    fn invalid_numeric_override_is_a_config_error() {
        env::set_var("ENTITY_SEARCH_INDEX_SHARDS", "not-a-number");
        let result = Settings::from_env();
        env::remove_var("ENTITY_SEARCH_INDEX_SHARDS");
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
