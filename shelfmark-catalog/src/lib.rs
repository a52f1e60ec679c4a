//! Book catalog data model, import/export column layout, and YAML seed data.
//!
//! This crate defines the persistent data model for the catalog without any
//! database dependencies. Consumers can use these types directly for
//! serialization, display, or passing to `shelfmark-db` for persistence.

pub mod columns;
pub mod options;
pub mod types;
pub mod yaml;

pub use columns::{COLUMNS, Column, Field, LIST_SEPARATOR, find_column, join_list, split_list};
pub use options::*;
pub use types::*;
pub use yaml::{CatalogSeed, YamlError, load_classification_types, load_languages, load_seed};
