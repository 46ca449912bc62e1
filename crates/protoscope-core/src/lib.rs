//! Protoscope Core Library
//!
//! This crate provides the core functionality for Protoscope, including:
//! - Registry (modules, versions, schema files)
//! - Schema AST and parsing
//! - Indexing (entity extraction, atomic per-version index replacement)
//! - Search (query language, full-text compilation, ranking, suggestions)
//! - Storage (SQLite + FTS5)

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;


pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::indexing::Indexer;
    pub use crate::domain::registry::RegistryRepository;
    pub use crate::domain::schema::JsonSchemaParser;
    pub use crate::domain::search::{SearchRequest, SearchService};
    pub use crate::error::{Error, Result};
    pub use crate::storage::Database;
}
