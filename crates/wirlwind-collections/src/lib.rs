//! Collection definitions and their on-disk layout.
//!
//! A collection is one unit of telemetry: a CLI command, a poll interval, an
//! ordered parser stack, an optional normalize map and an optional field
//! schema. Definitions live under `collections/<name>/<vendor>.yaml` with an
//! optional `_schema.yaml` sibling shared by all vendors of a collection.

pub mod config;
pub mod error;
pub mod registry;
pub mod shape;

pub use config::{CollectionConfig, CollectionFile, HistorySettings};
pub use error::{ConfigError, Result};
pub use registry::CollectionRegistry;
pub use shape::Shape;
