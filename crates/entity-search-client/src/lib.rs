//! Backend connectivity (spec §4.10 `ConnectionPool`).
//!
//! Wraps the official `elasticsearch` crate's async client in a lazy,
//! retrying, role-keyed pool with both async and sync facades, grounded on
//! `examples/original_source/openaleph_search/core.py`.

pub mod error;
pub mod pool;

pub use error::{ClientError, ClientResult};
pub use pool::{mask_uri, ConnectionPool, Role, RoleClients, SyncConnectionPool, MAX_RETRIES, RETRY_DELAY};
