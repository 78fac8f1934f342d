//! Schema/entity model, configuration, error types, and name analysis shared
//! by every other `entity-search-*` crate.
//!
//! This crate has no network or backend-specific dependencies: it is the
//! vocabulary the rest of the workspace is built on.

pub mod config;
pub mod error;
pub mod model;
pub mod nameanalysis;

pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use model::{Entity, EntityContext, Property, PropertyType, Schema, SchemaRegistry};
pub use nameanalysis::{DefaultNameAnalysis, NameAnalysis};
