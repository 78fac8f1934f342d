//! Query parsing and compilation (spec §4.6/§4.7): turns a flat list of
//! `(key, value)` pairs into a [`parser::ParsedQuery`], then compiles it
//! against a [`classes::QueryClass`] policy into a backend-shaped request
//! body. Grounded throughout on
//! `examples/original_source/openaleph_search/query/{queries.py,util.py,more_like_this.py}`
//! and `mcp-agent-mail-db/src/search_filter_compiler.rs` (typed JSON-object
//! builder shape, no string concatenation of query JSON).

pub mod auth;
pub mod classes;
pub mod compiler;
pub mod error;
pub mod parser;

pub use auth::SearchAuth;
pub use classes::{GeoDistanceParams, MatchParams, MoreLikeThisParams, QueryClass};
pub use compiler::{compile, CompiledQuery};
pub use error::{QueryError, QueryResult};
pub use parser::{parse, ParsedQuery, RangeFilter, RangeOp, SortOrder, SortSpec, MAX_PAGE};
