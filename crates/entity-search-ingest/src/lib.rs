//! Bulk ingest pipeline, bulk-indexing-mode settings toggle, cross-bucket
//! duplicate reaper, and dataset scan/export (spec §4.4/§4.5, SPEC_FULL.md
//! §2). Grounded throughout on
//! `examples/original_source/openaleph_search/index/{util,indexer,export}.py`
//! and `examples/original_source/contrib/cleanup_cross_bucket_duplicates.py`.

pub mod bulk_mode;
pub mod error;
pub mod export;
pub mod ingester;
pub mod reaper;
pub mod scan;

pub use bulk_mode::BulkIndexingGuard;
pub use error::{IngestError, IngestResult};
pub use export::{collect_dataset, scan_dataset};
pub use ingester::{ingest_stream, IngestOp, IngesterConfig, IngestReport};
pub use reaper::{run_reaper, ReaperReport, DEFAULT_CLEANUP_PAIRS};
pub use scan::{scan_index, scan_index_with_query, ScannedHit};
