//! Indexing domain module
//!
//! # Architecture
//!
//! - **Extractor**: flattens a parsed schema file into `SearchEntity` rows
//! - **Indexer**: reads a version from the registry, extracts, and replaces
//!   the version's index entries atomically
//! - **Locks**: per-version mutual exclusion with a bounded wait
//!
//! # Example
//!
//! ```ignore
//! use protoscope_core::domain::indexing::Indexer;
//! use tokio_util::sync::CancellationToken;
//!
//! let stats = indexer.index_version("acme/users", "1.2.0").await?;
//! println!("{} entities", stats.entities);
//!
//! let summary = indexer.reindex_all(&CancellationToken::new()).await?;
//! ```

pub mod extractor;
pub mod indexer;
pub mod lock;

pub use extractor::{clean_comments, extract_entities, import_edges};
pub use indexer::{
    DiagnosticKind, FileDiagnostic, IndexStats, Indexer, ReindexFailure, ReindexSummary,
};
pub use lock::{VersionLockGuard, VersionLocks};
